//! Condition Variables
//!
//! A [`Condition`] is bound to exactly one [`Lock`] when it is created.
//! Sleeping on it atomically releases that lock and suspends the caller; the
//! lock is reacquired before `sleep` returns. Waking readies exactly one
//! sleeper, oldest first, or does nothing when nobody sleeps.
//!
//! Wakeups are Mesa-style: a woken thread only learns that the condition may
//! have changed and must recheck its predicate in a loop.

use alloc::collections::VecDeque;
use core::fmt;
use spin::Mutex;

use super::counters::C_CONDITION_SLEEPS;
use super::lock::{Lock, LockGuard};
use super::machine::{InterruptGuard, Machine};
use crate::types::LockId;

/// A condition variable bound to one lock
pub struct Condition<M: Machine> {
    lock: LockId,
    sleepers: Mutex<VecDeque<M::Thread>>,
}

impl<M: Machine> Condition<M> {
    /// Create a condition bound to `lock`
    pub fn new<T: ?Sized>(lock: &Lock<M, T>) -> Self {
        Self {
            lock: lock.id(),
            sleepers: Mutex::new(VecDeque::new()),
        }
    }

    /// Release the lock, sleep until woken, reacquire the lock
    pub fn sleep<'a, T: ?Sized>(&self, guard: LockGuard<'a, M, T>) -> LockGuard<'a, M, T> {
        assert_eq!(guard.lock().id(), self.lock, "condition used with a foreign lock");
        let lock = guard.into_lock();
        let machine = lock.machine();

        let _intr = InterruptGuard::new(&**machine);
        self.sleepers.lock().push_back(machine.current_thread());
        C_CONDITION_SLEEPS.inc();

        lock.raw_release();
        machine.sleep();
        lock.raw_acquire();

        LockGuard::reclaim(lock)
    }

    /// Ready one sleeping thread, if any
    pub fn wake<T: ?Sized>(&self, guard: &LockGuard<'_, M, T>) {
        let lock = guard.lock();
        assert_eq!(lock.id(), self.lock, "condition used with a foreign lock");
        let machine = lock.machine();

        let _intr = InterruptGuard::new(&**machine);
        if let Some(thread) = self.sleepers.lock().pop_front() {
            machine.ready(&thread);
        }
    }

    /// Number of threads sleeping on this condition
    pub fn sleepers(&self) -> usize {
        self.sleepers.lock().len()
    }

    /// Lock this condition is bound to
    pub fn lock_id(&self) -> LockId {
        self.lock
    }
}

impl<M: Machine> fmt::Debug for Condition<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("lock", &self.lock.0)
            .field("sleepers", &self.sleepers())
            .finish()
    }
}
