//! Win32 event → core signal bridge.
//!
//! WASAPI signals buffer availability through a kernel event
//! (`SetEventHandle`); the core waits on its portable signal hub. A relay
//! thread per client forwards the kernel event into the hub's data-ready
//! signal and exits when the client is dropped.

use std::thread;

use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_EVENT, WAIT_OBJECT_0};
use windows::Win32::System::Threading::{CreateEventW, SetEvent, WaitForMultipleObjects, INFINITE};

use endpoint_capture_core::{CaptureError, SignalSetter};

pub(crate) struct EventRelay {
    event: HANDLE,
    shutdown: HANDLE,
    thread: Option<thread::JoinHandle<()>>,
}

// SAFETY: the handles are only waited on by the relay thread and signaled /
// closed from the owner.
unsafe impl Send for EventRelay {}

impl EventRelay {
    pub fn new(data_ready: SignalSetter) -> Result<Self, CaptureError> {
        unsafe {
            // Auto-reset, like the original receive event.
            let event = CreateEventW(None, false, false, None).map_err(|e| {
                CaptureError::CaptureStartFailed(format!("failed to create receive event: {e}"))
            })?;
            let shutdown = match CreateEventW(None, true, false, None) {
                Ok(handle) => handle,
                Err(e) => {
                    let _ = CloseHandle(event);
                    return Err(CaptureError::CaptureStartFailed(format!(
                        "failed to create relay shutdown event: {e}"
                    )));
                }
            };

            let raw = (shutdown.0 as isize, event.0 as isize);
            let thread = thread::Builder::new()
                .name("endpoint-capture: event relay".into())
                .spawn(move || relay_loop(raw.0, raw.1, data_ready));
            match thread {
                Ok(thread) => Ok(Self {
                    event,
                    shutdown,
                    thread: Some(thread),
                }),
                Err(e) => {
                    let _ = CloseHandle(event);
                    let _ = CloseHandle(shutdown);
                    Err(CaptureError::CaptureStartFailed(format!(
                        "failed to spawn event relay: {e}"
                    )))
                }
            }
        }
    }

    pub fn handle(&self) -> HANDLE {
        self.event
    }
}

fn relay_loop(shutdown: isize, event: isize, data_ready: SignalSetter) {
    let handles = [
        HANDLE(shutdown as *mut core::ffi::c_void),
        HANDLE(event as *mut core::ffi::c_void),
    ];
    loop {
        let waited = unsafe { WaitForMultipleObjects(&handles, false, INFINITE) };
        if waited == WAIT_EVENT(WAIT_OBJECT_0.0 + 1) {
            data_ready.set();
        } else {
            break;
        }
    }
}

impl Drop for EventRelay {
    fn drop(&mut self) {
        unsafe {
            let _ = SetEvent(self.shutdown);
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        unsafe {
            let _ = CloseHandle(self.event);
            let _ = CloseHandle(self.shutdown);
        }
    }
}
