//! Kernel Event Counters
//!
//! Kernel-wide counters for the synchronization paths. They are updated with
//! relaxed atomics and are meant for debugging and profiling, never for
//! correctness decisions.
//!
//! ## Counter Categories
//!
//! - **Alarm**: timer interrupts, waits registered, waiters woken, deepest
//!   wait set seen
//! - **Communicator**: words spoken and heard
//! - **Lock/Condition**: contended acquires, condition sleeps

use core::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Counter Type
// ============================================================================

/// Named kernel counter (atomically updated)
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
    name: &'static str,
}

impl Counter {
    /// Create a new counter
    pub const fn new(name: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name,
        }
    }

    /// Increment counter by 1
    #[inline]
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment counter by n
    #[inline]
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get current value
    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset to zero
    #[inline]
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }

    /// Get counter name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Update max if current value is higher
    pub fn update_max(&self, current: u64) {
        self.value.fetch_max(current, Ordering::Relaxed);
    }
}

// ============================================================================
// Alarm Counters
// ============================================================================

/// Timer interrupts handled by an alarm
pub static C_TIMER_INTERRUPTS: Counter = Counter::new("timer_interrupts");
/// Calls to wait_until
pub static C_ALARM_WAITS: Counter = Counter::new("alarm_waits");
/// Waiters woken by the timer interrupt
pub static C_ALARM_WAKEUPS: Counter = Counter::new("alarm_wakeups");
/// Largest wait set observed
pub static C_ALARM_WAITERS_MAX: Counter = Counter::new("alarm_waiters_max");

// ============================================================================
// Communicator Counters
// ============================================================================

/// Words deposited by speakers
pub static C_WORDS_SPOKEN: Counter = Counter::new("words_spoken");
/// Words withdrawn by listeners
pub static C_WORDS_HEARD: Counter = Counter::new("words_heard");

// ============================================================================
// Lock Counters
// ============================================================================

/// Lock acquires that had to sleep
pub static C_LOCK_CONTENDED: Counter = Counter::new("lock_contended");
/// Condition variable sleeps
pub static C_CONDITION_SLEEPS: Counter = Counter::new("condition_sleeps");

/// All counters, for iteration
pub static ALL_COUNTERS: [&Counter; 8] = [
    &C_TIMER_INTERRUPTS,
    &C_ALARM_WAITS,
    &C_ALARM_WAKEUPS,
    &C_ALARM_WAITERS_MAX,
    &C_WORDS_SPOKEN,
    &C_WORDS_HEARD,
    &C_LOCK_CONTENDED,
    &C_CONDITION_SLEEPS,
];

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub timer_interrupts: u64,
    pub alarm_waits: u64,
    pub alarm_wakeups: u64,
    pub alarm_waiters_max: u64,
    pub words_spoken: u64,
    pub words_heard: u64,
    pub lock_contended: u64,
    pub condition_sleeps: u64,
}

impl CounterSnapshot {
    /// Take a snapshot of all counters
    pub fn capture() -> Self {
        Self {
            timer_interrupts: C_TIMER_INTERRUPTS.get(),
            alarm_waits: C_ALARM_WAITS.get(),
            alarm_wakeups: C_ALARM_WAKEUPS.get(),
            alarm_waiters_max: C_ALARM_WAITERS_MAX.get(),
            words_spoken: C_WORDS_SPOKEN.get(),
            words_heard: C_WORDS_HEARD.get(),
            lock_contended: C_LOCK_CONTENDED.get(),
            condition_sleeps: C_CONDITION_SLEEPS.get(),
        }
    }
}

/// Take a snapshot of all counters
pub fn snapshot() -> CounterSnapshot {
    CounterSnapshot::capture()
}

/// Reset every counter to zero
pub fn reset_all() {
    for counter in ALL_COUNTERS.iter() {
        counter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_basic() {
        let counter = Counter::new("test");
        assert_eq!(counter.get(), 0);
        assert_eq!(counter.name(), "test");

        counter.inc();
        counter.add(4);
        assert_eq!(counter.get(), 5);

        counter.reset();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_counter_max() {
        let counter = Counter::new("max");
        counter.update_max(10);
        counter.update_max(5);
        assert_eq!(counter.get(), 10);
        counter.update_max(15);
        assert_eq!(counter.get(), 15);
    }

    #[test]
    fn test_snapshot_is_monotonic() {
        let before = snapshot();
        C_WORDS_SPOKEN.inc();
        C_WORDS_HEARD.inc();
        let after = snapshot();
        assert!(after.words_spoken > before.words_spoken);
        assert!(after.words_heard > before.words_heard);
    }

    #[test]
    fn test_counter_names_unique() {
        for (i, a) in ALL_COUNTERS.iter().enumerate() {
            for b in ALL_COUNTERS.iter().skip(i + 1) {
                assert_ne!(a.name(), b.name());
            }
        }
    }
}
