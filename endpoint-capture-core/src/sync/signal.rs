//! Session coordination signals.
//!
//! A [`SignalHub`] holds the small set of manual/auto-reset signals a capture
//! session multiplexes on: stop, restart, exit, start, data-ready, reconnect
//! and idle. `wait_any` mirrors a multi-object wait: the first signal in the
//! given slice that is set wins, and auto-reset signals are consumed by the
//! winning waiter.
//!
//! Besides blocking waiters, a signal can carry one-shot hooks
//! ([`SignalHub::on_set_once`]) which fire when the signal becomes set. The
//! queued-work-item execution strategy uses these to re-arm its waiting work
//! items; a hook on an auto-reset signal consumes the signal exactly like a
//! blocking waiter would.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Reset behavior of a signal, matching kernel event semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reset {
    /// Stays set until explicitly reset.
    Manual,
    /// Cleared by the waiter (or hook) that consumes it.
    Auto,
}

/// The signals driving a session's lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionSignal {
    Exit,
    Stop,
    Start,
    DataReady,
    Restart,
    Reconnect,
    Idle,
}

impl SessionSignal {
    fn bit(self) -> u32 {
        match self {
            Self::Exit => 1 << 0,
            Self::Stop => 1 << 1,
            Self::Start => 1 << 2,
            Self::DataReady => 1 << 3,
            Self::Restart => 1 << 4,
            Self::Reconnect => 1 << 5,
            Self::Idle => 1 << 6,
        }
    }

    pub fn reset_kind(self) -> Reset {
        match self {
            Self::Exit | Self::Stop | Self::Restart | Self::Idle => Reset::Manual,
            Self::Start | Self::DataReady | Self::Reconnect => Reset::Auto,
        }
    }
}

type Hook = Box<dyn FnOnce() + Send>;

struct HubState {
    bits: u32,
    hooks: Vec<(SessionSignal, Hook)>,
}

pub struct SignalHub {
    state: Mutex<HubState>,
    cond: Condvar,
}

impl SignalHub {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState {
                bits: 0,
                hooks: Vec::new(),
            }),
            cond: Condvar::new(),
        }
    }

    /// Set a signal, waking blocked waiters and firing any armed hooks.
    /// Hooks run on the caller's thread, outside the hub lock.
    pub fn set(&self, signal: SessionSignal) {
        let fired = {
            let mut state = self.state.lock();
            state.bits |= signal.bit();

            let mut fired = Vec::new();
            let mut i = 0;
            while i < state.hooks.len() {
                if state.hooks[i].0 == signal {
                    fired.push(state.hooks.remove(i).1);
                    // An auto-reset signal dispatches exactly one hook.
                    if signal.reset_kind() == Reset::Auto {
                        state.bits &= !signal.bit();
                        break;
                    }
                } else {
                    i += 1;
                }
            }
            self.cond.notify_all();
            fired
        };
        for hook in fired {
            hook();
        }
    }

    pub fn reset(&self, signal: SessionSignal) {
        self.state.lock().bits &= !signal.bit();
    }

    /// Non-consuming peek. Only meaningful for manual-reset signals.
    pub fn is_set(&self, signal: SessionSignal) -> bool {
        self.state.lock().bits & signal.bit() != 0
    }

    /// Wait until any of `signals` is set, in slice-order priority.
    /// Returns `None` on timeout. Consumes the winning signal when it is
    /// auto-reset.
    pub fn wait_any(
        &self,
        signals: &[SessionSignal],
        timeout: Option<Duration>,
    ) -> Option<SessionSignal> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            for &signal in signals {
                if state.bits & signal.bit() != 0 {
                    if signal.reset_kind() == Reset::Auto {
                        state.bits &= !signal.bit();
                    }
                    return Some(signal);
                }
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        // Final scan so a set-right-at-deadline is not lost.
                        for &signal in signals {
                            if state.bits & signal.bit() != 0 {
                                if signal.reset_kind() == Reset::Auto {
                                    state.bits &= !signal.bit();
                                }
                                return Some(signal);
                            }
                        }
                        return None;
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
    }

    /// Convenience single-signal wait.
    pub fn wait(&self, signal: SessionSignal, timeout: Option<Duration>) -> bool {
        self.wait_any(&[signal], timeout).is_some()
    }

    /// Arm a one-shot hook. If the signal is already set the hook fires
    /// immediately on the calling thread (consuming an auto-reset signal).
    pub fn on_set_once(&self, signal: SessionSignal, hook: Hook) {
        let run_now = {
            let mut state = self.state.lock();
            if state.bits & signal.bit() != 0 {
                if signal.reset_kind() == Reset::Auto {
                    state.bits &= !signal.bit();
                }
                true
            } else {
                state.hooks.push((signal, hook));
                return;
            }
        };
        if run_now {
            hook();
        }
    }

    /// Drop all armed hooks without firing them. Called on shutdown so no
    /// hook keeps the session state alive.
    pub fn clear_hooks(&self) {
        self.state.lock().hooks.clear();
    }

    pub fn setter(self: &Arc<Self>, signal: SessionSignal) -> SignalSetter {
        SignalSetter {
            hub: Arc::clone(self),
            signal,
        }
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A clonable handle that sets one specific signal. Handed to backends so the
/// platform's data-ready event can be forwarded into the hub.
#[derive(Clone)]
pub struct SignalSetter {
    hub: Arc<SignalHub>,
    signal: SessionSignal,
}

impl SignalSetter {
    pub fn set(&self) {
        self.hub.set(self.signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn manual_reset_stays_set() {
        let hub = SignalHub::new();
        hub.set(SessionSignal::Stop);
        assert_eq!(hub.wait_any(&[SessionSignal::Stop], None), Some(SessionSignal::Stop));
        assert!(hub.is_set(SessionSignal::Stop));
        hub.reset(SessionSignal::Stop);
        assert!(!hub.is_set(SessionSignal::Stop));
    }

    #[test]
    fn auto_reset_is_consumed_by_the_waiter() {
        let hub = SignalHub::new();
        hub.set(SessionSignal::DataReady);
        assert_eq!(
            hub.wait_any(&[SessionSignal::DataReady], None),
            Some(SessionSignal::DataReady)
        );
        assert_eq!(
            hub.wait_any(&[SessionSignal::DataReady], Some(Duration::from_millis(10))),
            None
        );
    }

    #[test]
    fn wait_priority_follows_slice_order() {
        let hub = SignalHub::new();
        hub.set(SessionSignal::Start);
        hub.set(SessionSignal::Stop);
        // Stop listed first wins even though Start is also set.
        assert_eq!(
            hub.wait_any(&[SessionSignal::Stop, SessionSignal::Start], None),
            Some(SessionSignal::Stop)
        );
    }

    #[test]
    fn timeout_returns_none() {
        let hub = SignalHub::new();
        assert_eq!(
            hub.wait_any(&[SessionSignal::Restart], Some(Duration::from_millis(20))),
            None
        );
    }

    #[test]
    fn cross_thread_wakeup() {
        let hub = Arc::new(SignalHub::new());
        let waiter = {
            let hub = Arc::clone(&hub);
            thread::spawn(move || hub.wait_any(&[SessionSignal::Exit], Some(Duration::from_secs(5))))
        };
        thread::sleep(Duration::from_millis(20));
        hub.set(SessionSignal::Exit);
        assert_eq!(waiter.join().unwrap(), Some(SessionSignal::Exit));
    }

    #[test]
    fn hook_fires_on_set_and_consumes_auto_signal() {
        let hub = SignalHub::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        hub.on_set_once(SessionSignal::DataReady, Box::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        hub.set(SessionSignal::DataReady);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // Consumed while dispatching the hook.
        assert!(!hub.is_set(SessionSignal::DataReady));
        // One-shot: a second set does not re-fire.
        hub.set(SessionSignal::DataReady);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hook_on_already_set_signal_fires_immediately() {
        let hub = SignalHub::new();
        hub.set(SessionSignal::Restart);
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        hub.on_set_once(SessionSignal::Restart, Box::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // Manual-reset: the signal itself stays set.
        assert!(hub.is_set(SessionSignal::Restart));
    }

    #[test]
    fn cleared_hooks_never_fire() {
        let hub = SignalHub::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        hub.on_set_once(SessionSignal::DataReady, Box::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        hub.clear_hooks();
        hub.set(SessionSignal::DataReady);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
