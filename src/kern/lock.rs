//! Sleeping Locks
//!
//! A [`Lock`] provides strict, non-reentrant mutual exclusion between kernel
//! threads. A thread that finds the lock held goes to sleep instead of
//! spinning; on release the lock is handed directly to the longest waiting
//! thread, which wakes up already holding it.
//!
//! The lock owns the data it protects, in the manner of a spin lock with
//! data: the only way to reach the data is through a [`LockGuard`], and
//! dropping the guard releases the lock.
//!
//! The holder and the queue of sleepers are only touched with interrupts
//! disabled. They still sit behind a `spin::Mutex` so the lock stays sound
//! on machines where disabling interrupts does not exclude other processors;
//! that mutex is never held across a sleep.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use spin::Mutex;

use super::counters::C_LOCK_CONTENDED;
use super::machine::{InterruptGuard, Machine};
use crate::types::LockId;

/// Holder and sleepers of one lock
struct LockState<T> {
    holder: Option<T>,
    waiters: VecDeque<T>,
}

/// A sleeping lock protecting a `T`
pub struct Lock<M: Machine, T: ?Sized> {
    id: LockId,
    machine: Arc<M>,
    state: Mutex<LockState<M::Thread>>,
    data: UnsafeCell<T>,
}

// The data is only reachable through a guard, and only the holder has one.
unsafe impl<M: Machine, T: ?Sized + Send> Sync for Lock<M, T> {}

impl<M: Machine, T> Lock<M, T> {
    /// Create a new unlocked lock around `data`
    pub fn new(machine: Arc<M>, data: T) -> Self {
        Self {
            id: LockId::new(),
            machine,
            state: Mutex::new(LockState {
                holder: None,
                waiters: VecDeque::new(),
            }),
            data: UnsafeCell::new(data),
        }
    }

    /// Consume the lock, returning the data
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<M: Machine, T: ?Sized> Lock<M, T> {
    /// Acquire the lock, sleeping until it is available
    pub fn acquire(&self) -> LockGuard<'_, M, T> {
        self.raw_acquire();
        LockGuard { lock: self }
    }

    /// Identity used to bind condition variables
    pub fn id(&self) -> LockId {
        self.id
    }

    /// The machine this lock sleeps on
    pub fn machine(&self) -> &Arc<M> {
        &self.machine
    }

    /// Does the calling thread hold this lock?
    pub fn is_held_by_current_thread(&self) -> bool {
        let _intr = InterruptGuard::new(&*self.machine);
        let me = self.machine.current_thread();
        self.state.lock().holder.as_ref() == Some(&me)
    }

    /// Number of threads sleeping on the lock
    pub fn waiters(&self) -> usize {
        let _intr = InterruptGuard::new(&*self.machine);
        self.state.lock().waiters.len()
    }

    pub(crate) fn raw_acquire(&self) {
        let _intr = InterruptGuard::new(&*self.machine);
        let me = self.machine.current_thread();

        let mut state = self.state.lock();
        assert!(
            state.holder.as_ref() != Some(&me),
            "{:?} acquired {:?} twice",
            me,
            self.id
        );
        if state.holder.is_none() {
            state.holder = Some(me);
            return;
        }

        C_LOCK_CONTENDED.inc();
        state.waiters.push_back(me.clone());
        drop(state);

        self.machine.sleep();

        // Release handed the lock straight to us.
        debug_assert!(self.state.lock().holder.as_ref() == Some(&me));
    }

    pub(crate) fn raw_release(&self) {
        let _intr = InterruptGuard::new(&*self.machine);
        let me = self.machine.current_thread();

        let mut state = self.state.lock();
        assert!(
            state.holder.as_ref() == Some(&me),
            "{:?} released {:?} without holding it",
            me,
            self.id
        );
        state.holder = state.waiters.pop_front();
        if let Some(next) = &state.holder {
            self.machine.ready(next);
        }
    }
}

impl<M: Machine, T: ?Sized> fmt::Debug for Lock<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("id", &self.id.0)
            .field("waiters", &self.waiters())
            .finish()
    }
}

// ============================================================================
// Lock Guard
// ============================================================================

/// RAII guard for a held [`Lock`]
pub struct LockGuard<'a, M: Machine, T: ?Sized> {
    lock: &'a Lock<M, T>,
}

impl<'a, M: Machine, T: ?Sized> LockGuard<'a, M, T> {
    /// The lock this guard holds
    pub fn lock(&self) -> &'a Lock<M, T> {
        self.lock
    }

    /// Give up the guard without releasing the lock
    pub(crate) fn into_lock(self) -> &'a Lock<M, T> {
        let lock = self.lock;
        core::mem::forget(self);
        lock
    }

    /// Wrap a lock the calling thread already holds
    pub(crate) fn reclaim(lock: &'a Lock<M, T>) -> Self {
        Self { lock }
    }
}

impl<M: Machine, T: ?Sized> Deref for LockGuard<'_, M, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<M: Machine, T: ?Sized> DerefMut for LockGuard<'_, M, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<M: Machine, T: ?Sized> Drop for LockGuard<'_, M, T> {
    fn drop(&mut self) {
        self.lock.raw_release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::host::{wait_for, HostMachine};
    use std::thread;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn test_lock_guard() {
        let machine = Arc::new(HostMachine::new());
        let lock = Lock::new(machine, 42);

        {
            let mut guard = lock.acquire();
            assert_eq!(*guard, 42);
            assert!(lock.is_held_by_current_thread());
            *guard = 100;
        }
        assert!(!lock.is_held_by_current_thread());

        let guard = lock.acquire();
        assert_eq!(*guard, 100);
        drop(guard);
        assert_eq!(lock.into_inner(), 100);
    }

    #[test]
    fn test_lock_mutual_exclusion() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 500;

        let machine = Arc::new(HostMachine::new());
        let lock = Arc::new(Lock::new(machine, (0usize, false)));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        let mut guard = lock.acquire();
                        assert!(!guard.1, "two holders inside the lock");
                        guard.1 = true;
                        let seen = guard.0;
                        thread::yield_now();
                        guard.0 = seen + 1;
                        guard.1 = false;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(lock.acquire().0, THREADS * ROUNDS);
    }

    #[test]
    fn test_release_hands_off_to_waiter() {
        let machine = Arc::new(HostMachine::new());
        let lock = Arc::new(Lock::new(machine, 0u32));

        let guard = lock.acquire();
        let handle = {
            let lock = lock.clone();
            thread::spawn(move || {
                let mut guard = lock.acquire();
                *guard += 1;
            })
        };

        wait_for(TIMEOUT, || lock.waiters() == 1);
        drop(guard);
        handle.join().unwrap();

        assert_eq!(lock.waiters(), 0);
        assert_eq!(*lock.acquire(), 1);
    }

    #[test]
    fn test_distinct_ids() {
        let machine = Arc::new(HostMachine::new());
        let a = Lock::new(machine.clone(), ());
        let b = Lock::new(machine, ());
        assert_ne!(a.id(), b.id());
    }
}
