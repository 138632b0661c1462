//! Portable shared work queue.
//!
//! One dispatcher thread draining a FIFO. Hosts that have a real platform
//! queue implement [`WorkQueue`] over it instead; this implementation makes
//! the queued execution strategy available everywhere and is what the tests
//! drive.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};

use crate::models::error::CaptureError;
use crate::traits::work_queue::{WorkItem, WorkQueue};

struct QueueState {
    items: VecDeque<WorkItem>,
    running: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    cond: Condvar,
}

pub struct ThreadedWorkQueue {
    inner: Arc<QueueInner>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ThreadedWorkQueue {
    /// Spawn the dispatcher thread. Sessions block on this queue during
    /// shutdown, so keep it alive until every session using it is dropped.
    pub fn new() -> Result<Arc<Self>, CaptureError> {
        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                running: true,
            }),
            cond: Condvar::new(),
        });

        let worker_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("endpoint-capture: work queue".into())
            .spawn(move || Self::dispatch_loop(worker_inner))
            .map_err(|e| {
                CaptureError::ResourceCreationFailed(format!("failed to spawn queue thread: {e}"))
            })?;

        Ok(Arc::new(Self {
            inner,
            worker: Mutex::new(Some(handle)),
        }))
    }

    fn dispatch_loop(inner: Arc<QueueInner>) {
        loop {
            let item = {
                let mut state = inner.state.lock();
                while state.items.is_empty() && state.running {
                    inner.cond.wait(&mut state);
                }
                match state.items.pop_front() {
                    Some(item) => item,
                    // Empty and no longer running: drained, done.
                    None => return,
                }
            };
            item();
        }
    }

    /// Stop accepting work and drain what is already queued, then join the
    /// dispatcher.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            state.running = false;
            self.inner.cond.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl WorkQueue for ThreadedWorkQueue {
    fn put(&self, item: WorkItem) {
        let mut state = self.inner.state.lock();
        if !state.running {
            log::warn!("work item submitted to a stopped queue, dropping");
            return;
        }
        state.items.push_back(item);
        self.inner.cond.notify_all();
    }
}

impl Drop for ThreadedWorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
