//! # endpoint-capture-windows
//!
//! Windows WASAPI backend for endpoint-capture.
//!
//! Provides:
//! - `MmEndpointEnumerator` — endpoint resolution and default-endpoint
//!   change notifications via the MMDevice API
//! - `WasapiBackend` — audio client negotiation for device capture, device
//!   loopback (with silent-render pre-roll) and process loopback
//! - `Win32Locator` — window-validity / session-token liveness probe over a
//!   host-supplied window matcher
//!
//! ## Platform Requirements
//! - Windows 10 2004+ (build 19041) for process loopback
//! - Visual Studio Build Tools + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use endpoint_capture_core::{CaptureSource, HostMixProfile, SessionIo, SessionOptions};
//! use endpoint_capture_windows::{MmEndpointEnumerator, WasapiBackend};
//!
//! let enumerator = MmEndpointEnumerator::new()?;
//! let backend = WasapiBackend::new(HostMixProfile {
//!     sample_rate: 48000,
//!     channels: 2,
//!     channel_mask: endpoint_capture_core::models::format::MASK_STEREO,
//! })?;
//! ```

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
mod event_relay;

#[cfg(target_os = "windows")]
pub mod client;
#[cfg(target_os = "windows")]
pub mod enumerator;
#[cfg(target_os = "windows")]
pub mod locator;

#[cfg(target_os = "windows")]
pub use client::WasapiBackend;
#[cfg(target_os = "windows")]
pub use enumerator::MmEndpointEnumerator;
#[cfg(target_os = "windows")]
pub use locator::{window_is_alive, window_process_id, Win32Locator};
