//! Client/format negotiator seam.
//!
//! The backend turns a resolved endpoint (or a target process id) into a
//! running, event-bound capture interface. Acquisition is all-or-nothing:
//! on error every partially acquired handle is released before the call
//! returns, and dropping the returned client releases the whole pair.

use crate::models::error::CaptureError;
use crate::models::format::StreamFormat;
use crate::sync::signal::SignalSetter;

/// Buffer-flag bit set by the platform when the packet contains silence.
pub const PACKET_FLAG_SILENT: u32 = 0x2;

/// One packet pulled from a capture interface. Borrows the interface's
/// buffer; `release_packet` must be called before the next read.
#[derive(Debug)]
pub struct Packet<'a> {
    pub samples: &'a [f32],
    pub frames: u32,
    pub flags: u32,
    /// Device position in frames since the stream started.
    pub device_position: u64,
    /// Device timestamp in 100 ns ticks.
    pub device_time: u64,
}

/// A running capture interface, drained packet by packet.
pub trait CaptureClient: Send {
    /// Frames in the next packet; 0 means caught up.
    fn next_packet_size(&mut self) -> Result<u32, CaptureError>;

    fn read_packet(&mut self) -> Result<Packet<'_>, CaptureError>;

    fn release_packet(&mut self, frames: u32) -> Result<(), CaptureError>;
}

/// A freshly negotiated client plus its wire format.
pub struct OpenClient {
    pub client: Box<dyn CaptureClient>,
    pub format: StreamFormat,
}

/// Platform negotiator. `data_ready` is set whenever the interface has
/// packets to drain.
pub trait AudioBackend: Send {
    /// Activate and start a shared-mode event-driven client on a device
    /// endpoint. `loopback` captures the endpoint's render mix instead of
    /// its input; loopback clients are pre-rolled with one silent render
    /// buffer so the shared clock keeps running through true silence.
    fn open_device_client(
        &mut self,
        endpoint_id: &str,
        loopback: bool,
        data_ready: &SignalSetter,
    ) -> Result<OpenClient, CaptureError>;

    /// Activate and start a client scoped to a process tree's output.
    fn open_process_client(
        &mut self,
        process_id: u32,
        data_ready: &SignalSetter,
    ) -> Result<OpenClient, CaptureError>;
}
