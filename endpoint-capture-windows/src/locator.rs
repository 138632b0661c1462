//! Window-validity probe and session-token liveness.
//!
//! Window discovery and matching stay with the host; this module supplies
//! the native pieces a host locator needs: `IsWindow` liveness, the
//! window → process-id lookup, and registry-backed liveness for
//! session-token targets.

use windows::Win32::Foundation::HWND;
use windows::Win32::UI::WindowsAndMessaging::{GetWindowThreadProcessId, IsWindow};

use endpoint_capture_core::{
    CaptureError, MatchPriority, ProcessLocator, ProcessTarget, RegistryHandle, WindowSpec,
};

pub fn window_is_alive(window: isize) -> bool {
    window != 0 && unsafe { IsWindow(Some(HWND(window as *mut core::ffi::c_void))) }.as_bool()
}

pub fn window_process_id(window: isize) -> Option<u32> {
    let mut process_id = 0u32;
    let thread_id = unsafe {
        GetWindowThreadProcessId(
            HWND(window as *mut core::ffi::c_void),
            Some(&mut process_id),
        )
    };
    (thread_id != 0 && process_id != 0).then_some(process_id)
}

/// Process locator over a host-supplied window matcher.
///
/// `find` resolves the configured criteria to a window handle (the host owns
/// window enumeration and the priority ordering). Liveness uses `IsWindow`
/// for window targets; session-token targets are alive while the process
/// registry still resolves the token.
pub struct Win32Locator<F> {
    find: F,
    registry: RegistryHandle,
}

impl<F> Win32Locator<F>
where
    F: Fn(&WindowSpec, MatchPriority) -> Option<isize> + Send + Sync,
{
    pub fn new(find: F, registry: RegistryHandle) -> Self {
        Self { find, registry }
    }
}

impl<F> ProcessLocator for Win32Locator<F>
where
    F: Fn(&WindowSpec, MatchPriority) -> Option<isize> + Send + Sync,
{
    fn locate(
        &self,
        spec: &WindowSpec,
        priority: MatchPriority,
    ) -> Result<ProcessTarget, CaptureError> {
        let window = (self.find)(spec, priority)
            .ok_or_else(|| CaptureError::DeviceNotFound("no window matches".into()))?;
        let process_id = window_process_id(window).ok_or_else(|| {
            CaptureError::ActivationFailed("failed to read the window's process id".into())
        })?;
        Ok(ProcessTarget::from_window(process_id, window))
    }

    fn target_alive(&self, target: &ProcessTarget) -> bool {
        if let Some(token) = &target.session_token {
            return self.registry.resolve(token).is_some();
        }
        match target.window {
            Some(window) => window_is_alive(window),
            None => true,
        }
    }
}
