use crate::models::format::{SampleFormat, SpeakerLayout};

/// One captured packet, handed to the sink as-is.
///
/// `samples` is interleaved float data borrowed from the capture interface;
/// it is only valid for the duration of the `push` call. Timestamps are
/// nanoseconds per the session's timestamp policy.
#[derive(Debug, Clone, Copy)]
pub struct CaptureFrame<'a> {
    pub samples: &'a [f32],
    pub frames: u32,
    pub layout: SpeakerLayout,
    pub channels: u16,
    pub sample_rate: u32,
    pub format: SampleFormat,
    pub timestamp_ns: u64,
}

/// Downstream consumer of captured frames.
///
/// `push` fires on the capture execution context (worker thread or work-queue
/// item): keep processing minimal and do not call back into the session.
pub trait FrameSink: Send + Sync {
    fn push(&self, frame: &CaptureFrame<'_>);
}
