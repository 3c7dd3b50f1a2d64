//! Tick counting for scheduling decisions.

use super::Ticks;
use portable_atomic::{AtomicU64, Ordering};

/// Tick counter for system uptime and scheduling.
///
/// This counter is incremented on every timer interrupt and provides
/// a monotonic time source for tick accounting in the dispatch loop.
pub struct TickCounter {
    /// Number of ticks since system start
    ticks: AtomicU64,
    /// Tick frequency in Hz
    frequency: u32,
}

impl TickCounter {
    /// Create a new tick counter with the given frequency.
    ///
    /// # Arguments
    ///
    /// * `frequency` - Timer frequency in Hz
    pub const fn new(frequency: u32) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            frequency,
        }
    }

    /// Increment the tick counter (called from the timer interrupt).
    pub fn increment(&self) -> Ticks {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Advance the counter by several ticks at once.
    pub fn advance(&self, delta: Ticks) -> Ticks {
        self.ticks.fetch_add(delta, Ordering::AcqRel) + delta
    }

    /// Get the current tick count.
    pub fn ticks(&self) -> Ticks {
        self.ticks.load(Ordering::Acquire)
    }

    /// Get the tick frequency in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Ticks elapsed since `start`.
    pub fn since(&self, start: Ticks) -> Ticks {
        self.ticks().saturating_sub(start)
    }

    /// Convert ticks to milliseconds.
    pub fn ticks_to_millis(&self, ticks: Ticks) -> u64 {
        ticks * 1000 / self.frequency as u64
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new(super::TIMER_FREQUENCY_HZ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counter() {
        let counter = TickCounter::new(100);
        assert_eq!(counter.ticks(), 0);
        assert_eq!(counter.frequency(), 100);

        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.advance(9), 10);
        assert_eq!(counter.since(4), 6);
        assert_eq!(counter.since(20), 0);

        assert_eq!(counter.ticks_to_millis(100), 1000);
    }
}
