//! Process-wide session-token → process-id registry.
//!
//! Hosts register the mapping for opaque session tokens; process-loopback
//! sessions resolve through it at initialization and use it as the liveness
//! probe for token-bound targets. The registry is reference-counted with
//! explicit acquire/release: each capture session acquires a handle at
//! construction and releases it at destruction, and the backing map is
//! dropped when the last handle goes away.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

pub struct ProcessRegistry {
    sessions: Mutex<HashMap<String, u32>>,
}

/// A refcounted handle to the process-wide registry.
#[derive(Clone)]
pub struct RegistryHandle {
    registry: Arc<ProcessRegistry>,
}

type Slot = Mutex<Weak<ProcessRegistry>>;

fn process_slot() -> &'static Slot {
    static SLOT: OnceLock<Slot> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(Weak::new()))
}

impl ProcessRegistry {
    /// Acquire a handle, creating the registry if no handle is currently
    /// live.
    pub fn acquire() -> RegistryHandle {
        Self::acquire_in(process_slot())
    }

    fn acquire_in(slot: &Slot) -> RegistryHandle {
        let mut slot = slot.lock();
        let registry = match slot.upgrade() {
            Some(existing) => existing,
            None => {
                let fresh = Arc::new(ProcessRegistry {
                    sessions: Mutex::new(HashMap::new()),
                });
                *slot = Arc::downgrade(&fresh);
                fresh
            }
        };
        RegistryHandle { registry }
    }

    pub fn register(&self, token: &str, process_id: u32) {
        self.sessions.lock().insert(token.to_string(), process_id);
    }

    pub fn remove(&self, token: &str) {
        self.sessions.lock().remove(token);
    }

    pub fn resolve(&self, token: &str) -> Option<u32> {
        self.sessions.lock().get(token).copied()
    }
}

impl std::ops::Deref for RegistryHandle {
    type Target = ProcessRegistry;

    fn deref(&self) -> &ProcessRegistry {
        &self.registry
    }
}
