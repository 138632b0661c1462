use std::sync::OnceLock;
use std::time::Instant;

/// Monotonic host clock in nanoseconds.
///
/// A trait seam so the timestamp policy is testable with an injected clock.
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> u64;
}

/// Process-anchored monotonic clock. All sessions share the same anchor so
/// their host-time timestamps are mutually comparable.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

static ANCHOR: OnceLock<Instant> = OnceLock::new();

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        let anchor = *ANCHOR.get_or_init(Instant::now);
        anchor.elapsed().as_nanos() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock;
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }
}
