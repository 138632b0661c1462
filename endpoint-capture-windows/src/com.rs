//! Process-wide COM apartment management.
//!
//! The core drives backend calls from its own worker/queue threads, so a
//! per-thread `CoInitializeEx` would have to leak into platform-agnostic
//! code. Incrementing the MTA usage count instead makes every thread
//! without an explicit apartment an implicit MTA member for the guard's
//! lifetime.

use windows::Win32::System::Com::{CoDecrementMTAUsage, CoIncrementMTAUsage, CO_MTA_USAGE_COOKIE};

use endpoint_capture_core::CaptureError;

pub(crate) struct MtaGuard {
    cookie: CO_MTA_USAGE_COOKIE,
}

impl MtaGuard {
    pub fn new() -> Result<Self, CaptureError> {
        let cookie = unsafe { CoIncrementMTAUsage() }.map_err(|e| {
            CaptureError::ResourceCreationFailed(format!("CoIncrementMTAUsage failed: {e}"))
        })?;
        Ok(Self { cookie })
    }
}

impl Drop for MtaGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = CoDecrementMTAUsage(self.cookie);
        }
    }
}
