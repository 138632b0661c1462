//! # endpoint-capture-core
//!
//! Platform-agnostic audio endpoint capture core.
//!
//! Captures live audio from a platform endpoint (a physical input, a
//! physical output in loopback, or the mixed output of a single process
//! tree) and delivers a continuous, timestamped stream of interleaved float
//! samples to a [`FrameSink`], surviving device loss, default-device changes
//! and target-process exit. Platform backends (Windows WASAPI) implement the
//! traits in [`traits`] and plug into the generic [`CaptureSource`].
//!
//! ## Architecture
//!
//! ```text
//! endpoint-capture-core (this crate)
//! ├── traits/       ← EndpointEnumerator, AudioBackend, ProcessLocator, WorkQueue
//! ├── models/       ← CaptureError, StreamFormat, SourceSettings, CaptureFrame
//! ├── sync/         ← SignalHub (manual/auto-reset signals), Clock
//! ├── session/      ← lifecycle state machine, dispatcher, resolver,
//! │                   default-device tracker, process registry
//! └── queue         ← portable shared work queue (queued execution strategy)
//! ```

pub mod models;
pub mod queue;
pub mod session;
pub mod sync;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export key types at crate root for convenience.
pub use models::error::CaptureError;
pub use models::format::{HostMixProfile, SampleFormat, SpeakerLayout, StreamFormat};
pub use models::frame::{CaptureFrame, FrameSink};
pub use models::settings::{
    MatchDescriptor, MatchPriority, SourceSettings, SourceType, WindowSpec, DEFAULT_DEVICE_ID,
    NO_DEVICE_ID,
};
pub use queue::ThreadedWorkQueue;
pub use session::endpoint::resolve_endpoint;
pub use session::registry::{ProcessRegistry, RegistryHandle};
pub use session::source::{
    CaptureSource, SessionIo, SessionOptions, DEFAULT_CAPTURE_POLL, RECONNECT_INTERVAL,
};
pub use sync::clock::{Clock, MonotonicClock};
pub use sync::signal::{SessionSignal, SignalHub, SignalSetter};
pub use traits::backend::{AudioBackend, CaptureClient, OpenClient, Packet, PACKET_FLAG_SILENT};
pub use traits::enumerator::{
    EndpointDirection, EndpointEnumerator, EndpointInfo, EndpointNotificationSink, EndpointRole,
    NotificationRegistration,
};
pub use traits::locator::{ProcessLocator, ProcessTarget};
pub use traits::work_queue::{WorkItem, WorkQueue};
