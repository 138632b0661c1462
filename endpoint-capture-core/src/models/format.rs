//! Negotiated stream format and the channel-mask → speaker-layout mapping.
//!
//! Channel masks are kept as plain bit constants (the KSAUDIO values) so the
//! mapping stays portable and unit-testable; the Windows backend passes the
//! wire format's `dwChannelMask` straight through.

use serde::{Deserialize, Serialize};

pub const SPEAKER_FRONT_LEFT: u32 = 0x1;
pub const SPEAKER_FRONT_RIGHT: u32 = 0x2;
pub const SPEAKER_FRONT_CENTER: u32 = 0x4;
pub const SPEAKER_LOW_FREQUENCY: u32 = 0x8;
pub const SPEAKER_BACK_LEFT: u32 = 0x10;
pub const SPEAKER_BACK_RIGHT: u32 = 0x20;
pub const SPEAKER_BACK_CENTER: u32 = 0x100;
pub const SPEAKER_SIDE_LEFT: u32 = 0x200;
pub const SPEAKER_SIDE_RIGHT: u32 = 0x400;

pub const MASK_STEREO: u32 = SPEAKER_FRONT_LEFT | SPEAKER_FRONT_RIGHT;
pub const MASK_2POINT1: u32 = MASK_STEREO | SPEAKER_LOW_FREQUENCY;
pub const MASK_QUAD: u32 = MASK_STEREO | SPEAKER_FRONT_CENTER | SPEAKER_BACK_CENTER;
pub const MASK_4POINT1: u32 = MASK_QUAD | SPEAKER_LOW_FREQUENCY;
pub const MASK_5POINT1: u32 = MASK_STEREO
    | SPEAKER_FRONT_CENTER
    | SPEAKER_LOW_FREQUENCY
    | SPEAKER_SIDE_LEFT
    | SPEAKER_SIDE_RIGHT;
pub const MASK_7POINT1: u32 = MASK_5POINT1 | SPEAKER_BACK_LEFT | SPEAKER_BACK_RIGHT;

/// Speaker layout of a negotiated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerLayout {
    Unknown,
    Mono,
    Stereo,
    TwoPointOne,
    Quad,
    FourPointOne,
    FivePointOne,
    SevenPointOne,
}

impl SpeakerLayout {
    /// Fallback mapping when the channel mask is unrecognized.
    pub fn from_channel_count(channels: u16) -> Self {
        match channels {
            1 => Self::Mono,
            2 => Self::Stereo,
            3 => Self::TwoPointOne,
            4 => Self::Quad,
            5 => Self::FourPointOne,
            6 => Self::FivePointOne,
            8 => Self::SevenPointOne,
            _ => Self::Unknown,
        }
    }

    fn from_channel_mask(mask: u32, channels: u16) -> Self {
        match mask {
            MASK_2POINT1 => Self::TwoPointOne,
            MASK_QUAD => Self::Quad,
            MASK_4POINT1 => Self::FourPointOne,
            MASK_5POINT1 => Self::FivePointOne,
            MASK_7POINT1 => Self::SevenPointOne,
            _ => Self::from_channel_count(channels),
        }
    }
}

/// Sample encoding on the wire. Shared-mode endpoints always deliver
/// `Float32`; the other encodings exist for sinks that re-tag the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    Pcm16,
    Pcm32,
    Float32,
}

/// Format negotiated with an audio client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub layout: SpeakerLayout,
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    /// Derive the stream format from a wire format's channel mask, channel
    /// count and sample rate. Shared-mode capture is float by contract.
    pub fn from_wire(channel_mask: u32, channels: u16, sample_rate: u32) -> Self {
        Self {
            layout: SpeakerLayout::from_channel_mask(channel_mask, channels),
            format: SampleFormat::Float32,
            sample_rate,
            channels,
        }
    }
}

/// The host's mix configuration, used to synthesize the wire format for
/// process-loopback clients (which have no device to interrogate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostMixProfile {
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_mask: u32,
}
