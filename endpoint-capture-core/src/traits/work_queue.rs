//! Shared work queue seam.
//!
//! The queued execution strategy runs the capture loop as a chain of
//! self-requeuing work items instead of owning a thread. Whether a queue is
//! available (and trustworthy: some platform/version combinations silently
//! fail for render-loopback capture) is the host's call; handing one to
//! `SessionOptions` selects the strategy.
//!
//! Signal-waiting items are composed from [`SignalHub::on_set_once`] plus
//! `put`, so the trait itself stays minimal.
//!
//! [`SignalHub::on_set_once`]: crate::sync::signal::SignalHub::on_set_once

pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

pub trait WorkQueue: Send + Sync {
    /// Submit a one-shot item. Items submitted from one thread run in
    /// submission order.
    fn put(&self, item: WorkItem);
}
