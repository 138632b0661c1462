//! Capture dispatcher: drain the capture interface and emit frames.
//!
//! One drain routine shared by both execution strategies, so delivery
//! behavior never depends on how the work is scheduled.

use crate::models::error::CaptureError;
use crate::models::frame::{CaptureFrame, FrameSink};
use crate::models::settings::SourceType;
use crate::sync::clock::Clock;
use crate::traits::backend::{CaptureClient, OpenClient};
use crate::traits::locator::{ProcessLocator, ProcessTarget};

const NS_PER_SEC: u64 = 1_000_000_000;

/// `(value * numerator) / denominator` without intermediate overflow.
pub(crate) fn mul_div_u64(value: u64, numerator: u64, denominator: u64) -> u64 {
    (value as u128 * numerator as u128 / denominator as u128) as u64
}

/// The live client/capture pair plus the per-acquisition dispatch state.
/// Exactly one of these exists per session at any time; dropping it releases
/// the whole pair.
pub(crate) struct ActiveCapture {
    pub client: Box<dyn CaptureClient>,
    pub format: crate::models::format::StreamFormat,
    pub target: Option<ProcessTarget>,
    /// Frames delivered since this pair was acquired. Single writer: the
    /// dispatcher. Drives the synthetic timestamp for process sources.
    pub frames_processed: u64,
}

impl ActiveCapture {
    pub fn new(open: OpenClient, target: Option<ProcessTarget>) -> Self {
        Self {
            client: open.client,
            format: open.format,
            target,
            frames_processed: 0,
        }
    }
}

fn frame_timestamp(
    source_type: SourceType,
    use_device_timing: bool,
    frames_processed: u64,
    packet_frames: u32,
    device_time: u64,
    sample_rate: u32,
    clock: &dyn Clock,
) -> u64 {
    match source_type {
        // The device timestamp of a process-scoped virtual endpoint is not
        // meaningful; synthesize a self-consistent clock from the frame
        // count instead.
        SourceType::ProcessOutput => {
            mul_div_u64(frames_processed, NS_PER_SEC, sample_rate as u64)
        }
        _ if use_device_timing => device_time * 100,
        // Host time minus the buffer's own duration approximates the
        // buffer's start rather than its delivery time.
        _ => clock
            .now_ns()
            .saturating_sub(mul_div_u64(packet_frames as u64, NS_PER_SEC, sample_rate as u64)),
    }
}

/// Drain every available packet, pushing one frame per packet to the sink.
///
/// Returns `Ok(())` once caught up. Any failure stops draining and reports
/// it; failures other than device invalidation are logged here.
pub(crate) fn drain(
    active: &mut ActiveCapture,
    source_type: SourceType,
    use_device_timing: bool,
    locator: &dyn ProcessLocator,
    clock: &dyn Clock,
    sink: &dyn FrameSink,
) -> Result<(), CaptureError> {
    loop {
        if source_type == SourceType::ProcessOutput {
            if let Some(target) = &active.target {
                if !locator.target_alive(target) {
                    log::warn!("capture target (pid {}) disappeared", target.process_id);
                    return Err(CaptureError::TargetWindowGone);
                }
            }
        }

        let size = match active.client.next_packet_size() {
            Ok(size) => size,
            Err(err) => {
                if !err.is_device_invalidated() {
                    log::warn!("next_packet_size failed: {err}");
                }
                return Err(err);
            }
        };
        if size == 0 {
            return Ok(());
        }

        let frames = {
            let packet = match active.client.read_packet() {
                Ok(packet) => packet,
                Err(err) => {
                    if !err.is_device_invalidated() {
                        log::warn!("read_packet failed: {err}");
                    }
                    return Err(err);
                }
            };

            let timestamp_ns = frame_timestamp(
                source_type,
                use_device_timing,
                active.frames_processed,
                packet.frames,
                packet.device_time,
                active.format.sample_rate,
                clock,
            );

            sink.push(&CaptureFrame {
                samples: packet.samples,
                frames: packet.frames,
                layout: active.format.layout,
                channels: active.format.channels,
                sample_rate: active.format.sample_rate,
                format: active.format.format,
                timestamp_ns,
            });

            packet.frames
        };

        if source_type == SourceType::ProcessOutput {
            active.frames_processed += frames as u64;
        }

        // Release failures surface on the next query.
        let _ = active.client.release_packet(frames);
    }
}
