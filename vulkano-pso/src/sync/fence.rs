use parking_lot::Mutex;
use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicU64, Ordering},
};

/// Hands out fence values and tracks which of them have completed.
///
/// Values start at 1 and increase by one per reservation. A value stays pending from the moment
/// it is reserved until it is signaled. The completed value is the highest value `N` such that
/// every value up to and including `N` has been signaled, so it never skips over a command
/// buffer that is still executing or still being recorded.
#[derive(Debug, Default)]
pub struct FenceTracker {
    state: Mutex<TrackerState>,
    completed: AtomicU64,
}

#[derive(Debug, Default)]
struct TrackerState {
    last_reserved: u64,
    pending: BTreeSet<u64>,
}

impl FenceTracker {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next fence value. It is pending until [`signal`](Self::signal) is called with
    /// it.
    pub fn reserve(&self) -> u64 {
        let mut state = self.state.lock();
        state.last_reserved += 1;
        let value = state.last_reserved;
        state.pending.insert(value);

        value
    }

    /// Marks `value` as complete. Signaling a value that is not pending does nothing.
    pub fn signal(&self, value: u64) {
        let mut state = self.state.lock();

        if !state.pending.remove(&value) {
            return;
        }

        let completed = match state.pending.first() {
            Some(&oldest) => oldest - 1,
            None => state.last_reserved,
        };
        self.completed.store(completed, Ordering::Release);
    }

    /// Returns the highest value up to which everything has completed.
    #[inline]
    pub fn completed_value(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Returns whether `value` has completed.
    #[inline]
    pub fn is_complete(&self, value: u64) -> bool {
        value <= self.completed_value()
    }

    /// Returns the most recently reserved value, or 0 if none was reserved yet.
    ///
    /// An object whose destruction waits for this value cannot be in use by any command buffer
    /// that exists at the time of the call.
    #[inline]
    pub fn last_reserved(&self) -> u64 {
        self.state.lock().last_reserved
    }

    /// Returns the number of values that are reserved but not yet signaled.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::FenceTracker;
    use rand::seq::SliceRandom;

    #[test]
    fn completed_value_waits_for_oldest() {
        let tracker = FenceTracker::new();
        let a = tracker.reserve();
        let b = tracker.reserve();
        let c = tracker.reserve();
        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(tracker.completed_value(), 0);

        tracker.signal(b);
        tracker.signal(c);
        assert_eq!(tracker.completed_value(), 0);
        assert!(!tracker.is_complete(b));

        tracker.signal(a);
        assert_eq!(tracker.completed_value(), 3);
        assert!(tracker.is_complete(c));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn signaling_twice_is_harmless() {
        let tracker = FenceTracker::new();
        let a = tracker.reserve();
        tracker.signal(a);
        tracker.signal(a);
        tracker.signal(42);

        assert_eq!(tracker.completed_value(), 1);
        assert_eq!(tracker.last_reserved(), 1);
    }

    #[test]
    fn completion_is_monotonic_under_any_signal_order() {
        let mut rng = rand::thread_rng();

        for _ in 0..32 {
            let tracker = FenceTracker::new();
            let mut values: Vec<u64> = (0..20).map(|_| tracker.reserve()).collect();
            values.shuffle(&mut rng);

            let mut previous = 0;
            for (index, &value) in values.iter().enumerate() {
                tracker.signal(value);
                let completed = tracker.completed_value();

                assert!(completed >= previous);
                // Every value up to `completed` must have been signaled already.
                assert!((1..=completed).all(|v| values[..=index].contains(&v)));
                previous = completed;
            }

            assert_eq!(previous, 20);
        }
    }
}
