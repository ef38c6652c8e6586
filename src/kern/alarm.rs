//! Alarm - Timed Thread Wakeup
//!
//! The alarm lets a thread sleep for at least a given number of ticks. It
//! installs itself as the machine's timer interrupt handler; every interrupt
//! wakes each waiter whose deadline has passed, then yields the interrupted
//! thread so the woken ones get a chance to run.
//!
//! Waiters sit in a min-heap keyed by deadline, so an interrupt only looks
//! at the due prefix of the set. The set is only touched with interrupts
//! disabled: the enqueue in [`Alarm::wait_until`] and the thread's sleep
//! happen inside one critical section, so the handler can never observe a
//! waiter whose thread is not yet asleep.
//!
//! A machine has one timer, so it can carry at most one alarm. Installing a
//! second one fails; dropping the installed alarm frees the timer again.

use alloc::collections::BinaryHeap;
use alloc::sync::{Arc, Weak};
use core::cmp::Ordering as CmpOrdering;
use core::sync::atomic::{AtomicBool, Ordering};
use log::{debug, trace};
use spin::Mutex;
use thiserror::Error;

use super::counters::{C_ALARM_WAITERS_MAX, C_ALARM_WAITS, C_ALARM_WAKEUPS, C_TIMER_INTERRUPTS};
use super::machine::{InterruptGuard, Machine, TimerHandler};
use crate::types::Ticks;

/// Errors from alarm installation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmError {
    /// The machine's timer already has an interrupt handler
    #[error("timer interrupt handler already installed")]
    HandlerInstalled,
}

// ============================================================================
// Waiters
// ============================================================================

/// A sleeping thread and the tick at which it may run again
#[derive(Debug, Clone)]
pub struct Waiter<T> {
    /// The sleeping thread
    pub thread: T,
    /// Absolute wake tick
    pub deadline: Ticks,
    /// Insertion order, breaks deadline ties
    seq: u64,
}

impl<T> PartialEq for Waiter<T> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<T> Eq for Waiter<T> {}

impl<T> PartialOrd for Waiter<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Waiter<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse order for min-heap (earliest deadline first)
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Deadline-ordered set of waiters
#[derive(Debug)]
pub struct WaitQueue<T> {
    waiters: BinaryHeap<Waiter<T>>,
    next_seq: u64,
}

impl<T> WaitQueue<T> {
    /// Create an empty wait queue
    pub fn new() -> Self {
        Self {
            waiters: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Add `thread` to wake at `deadline`
    pub fn push(&mut self, thread: T, deadline: Ticks) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.waiters.push(Waiter {
            thread,
            deadline,
            seq,
        });
    }

    /// Remove and return the earliest waiter if it is due at `now`
    pub fn pop_due(&mut self, now: Ticks) -> Option<Waiter<T>> {
        if self.waiters.peek()?.deadline <= now {
            self.waiters.pop()
        } else {
            None
        }
    }

    /// Earliest deadline in the queue
    pub fn next_deadline(&self) -> Option<Ticks> {
        self.waiters.peek().map(|w| w.deadline)
    }

    /// Number of waiters
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Is the queue empty?
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Alarm
// ============================================================================

/// Timer-driven sleep for kernel threads
pub struct Alarm<M: Machine> {
    machine: Arc<M>,
    waiters: Mutex<WaitQueue<M::Thread>>,
    /// Whether this alarm owns the machine's timer handler
    installed: AtomicBool,
}

impl<M: Machine + 'static> Alarm<M> {
    /// Create an alarm and make it the machine's timer interrupt handler
    pub fn install(machine: Arc<M>) -> Result<Arc<Self>, AlarmError> {
        let alarm = Arc::new(Self {
            machine,
            waiters: Mutex::new(WaitQueue::new()),
            installed: AtomicBool::new(false),
        });

        let weak: Weak<Self> = Arc::downgrade(&alarm);
        let handler: TimerHandler = Arc::new(move || {
            if let Some(alarm) = weak.upgrade() {
                alarm.timer_interrupt();
            }
        });
        if !alarm.machine.set_interrupt_handler(handler) {
            return Err(AlarmError::HandlerInstalled);
        }
        alarm.installed.store(true, Ordering::Release);

        debug!("alarm installed at tick {}", alarm.machine.ticks());
        Ok(alarm)
    }
}

impl<M: Machine> Alarm<M> {
    /// Put the calling thread to sleep for at least `ticks` ticks
    ///
    /// The thread is readied by the first timer interrupt at which the clock
    /// reads at least the tick of this call plus `ticks`. A zero wait still
    /// sleeps until the next interrupt.
    pub fn wait_until(&self, ticks: Ticks) {
        let _intr = InterruptGuard::new(&*self.machine);

        let deadline = self.machine.ticks().saturating_add(ticks);
        let thread = self.machine.current_thread();
        trace!("{:?} sleeps until tick {}", thread, deadline);
        {
            let mut waiters = self.waiters.lock();
            waiters.push(thread, deadline);
            C_ALARM_WAITERS_MAX.update_max(waiters.len() as u64);
        }
        C_ALARM_WAITS.inc();

        self.machine.sleep();
    }

    /// Timer interrupt handler
    fn timer_interrupt(&self) {
        C_TIMER_INTERRUPTS.inc();
        {
            let _intr = InterruptGuard::new(&*self.machine);
            let now = self.machine.ticks();

            let mut waiters = self.waiters.lock();
            let mut woken = 0u64;
            while let Some(waiter) = waiters.pop_due(now) {
                trace!("tick {}: waking {:?} (deadline {})", now, waiter.thread, waiter.deadline);
                self.machine.ready(&waiter.thread);
                woken += 1;
            }
            C_ALARM_WAKEUPS.add(woken);
        }

        self.machine.yield_now();
    }

    /// Number of sleeping threads
    pub fn pending(&self) -> usize {
        let _intr = InterruptGuard::new(&*self.machine);
        self.waiters.lock().len()
    }

    /// Earliest wake deadline among sleeping threads
    pub fn next_deadline(&self) -> Option<Ticks> {
        let _intr = InterruptGuard::new(&*self.machine);
        self.waiters.lock().next_deadline()
    }

    /// The machine this alarm runs on
    pub fn machine(&self) -> &Arc<M> {
        &self.machine
    }
}

impl<M: Machine> Drop for Alarm<M> {
    fn drop(&mut self) {
        if self.installed.load(Ordering::Acquire) {
            self.machine.clear_interrupt_handler();
            debug!("alarm removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::host::{wait_for, HostMachine};
    use crate::kern::machine::{Clock, Timer};
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};
    use std::thread;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);
    const NOT_WOKEN: u64 = u64::MAX;

    #[test]
    fn test_wait_queue_order() {
        let mut wq = WaitQueue::new();

        wq.push("a", 100);
        wq.push("b", 50);
        wq.push("c", 200);
        wq.push("d", 50);
        assert_eq!(wq.len(), 4);
        assert_eq!(wq.next_deadline(), Some(50));

        // Nothing due before the earliest deadline
        assert!(wq.pop_due(49).is_none());

        // Ties come out in insertion order
        assert_eq!(wq.pop_due(75).unwrap().thread, "b");
        assert_eq!(wq.pop_due(75).unwrap().thread, "d");
        assert!(wq.pop_due(75).is_none());

        assert_eq!(wq.pop_due(150).unwrap().thread, "a");
        assert_eq!(wq.next_deadline(), Some(200));
        assert_eq!(wq.pop_due(u64::MAX).unwrap().thread, "c");
        assert!(wq.is_empty());
        assert!(wq.pop_due(u64::MAX).is_none());
    }

    #[test]
    fn test_single_alarm_per_machine() {
        let machine = Arc::new(HostMachine::new());
        let first = Alarm::install(machine.clone()).unwrap();
        assert_eq!(
            Alarm::install(machine.clone()).err(),
            Some(AlarmError::HandlerInstalled)
        );

        // The failed install must not have unregistered the first alarm.
        assert!(!machine.set_interrupt_handler(Arc::new(|| {})));

        drop(first);
        assert!(Alarm::install(machine).is_ok());
    }

    /// Spawn a thread that waits `ticks` and records the clock when it resumes
    fn sleeper(alarm: &Arc<Alarm<HostMachine>>, ticks: Ticks) -> (Arc<AtomicU64>, thread::JoinHandle<()>) {
        let woke_at = Arc::new(AtomicU64::new(NOT_WOKEN));
        let handle = {
            let alarm = alarm.clone();
            let woke_at = woke_at.clone();
            thread::spawn(move || {
                alarm.wait_until(ticks);
                woke_at.store(alarm.machine().ticks(), Ordering::SeqCst);
            })
        };
        (woke_at, handle)
    }

    #[test]
    fn test_wakes_on_first_interrupt_past_deadline() {
        let machine = Arc::new(HostMachine::with_period(500));
        let alarm = Alarm::install(machine.clone()).unwrap();

        let (woke_at, handle) = sleeper(&alarm, 1200);
        wait_for(TIMEOUT, || alarm.pending() == 1);
        assert_eq!(alarm.next_deadline(), Some(1200));

        machine.tick(); // 500
        assert_eq!(alarm.pending(), 1);
        machine.tick(); // 1000
        assert_eq!(alarm.pending(), 1);
        assert_eq!(woke_at.load(Ordering::SeqCst), NOT_WOKEN);

        machine.tick(); // 1500
        assert_eq!(alarm.pending(), 0);
        handle.join().unwrap();
        assert_eq!(woke_at.load(Ordering::SeqCst), 1500);
    }

    #[test]
    fn test_zero_wait_sleeps_until_next_interrupt() {
        let machine = Arc::new(HostMachine::with_period(10));
        let alarm = Alarm::install(machine.clone()).unwrap();

        let (woke_at, handle) = sleeper(&alarm, 0);
        wait_for(TIMEOUT, || alarm.pending() == 1);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(woke_at.load(Ordering::SeqCst), NOT_WOKEN);

        machine.tick();
        handle.join().unwrap();
        assert_eq!(woke_at.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_all_due_waiters_woken_once() {
        let machine = Arc::new(HostMachine::with_period(100));
        let alarm = Alarm::install(machine.clone()).unwrap();
        let deadlines = [100, 150, 150, 320, 400, 401];

        let sleepers: Vec<_> = deadlines
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                let sleeper = sleeper(&alarm, d);
                wait_for(TIMEOUT, || alarm.pending() == i + 1);
                sleeper
            })
            .collect();

        let before = crate::kern::counters::snapshot();
        while machine.ticks() < 500 {
            machine.tick();
            // Let every thread woken by this interrupt record the tick before the next one.
            let now = machine.ticks();
            wait_for(TIMEOUT, || {
                sleepers
                    .iter()
                    .zip(deadlines.iter())
                    .filter(|(_, deadline)| **deadline <= now)
                    .all(|((woke_at, _), _)| woke_at.load(Ordering::SeqCst) != NOT_WOKEN)
            });
        }
        assert_eq!(alarm.pending(), 0);

        for ((woke_at, handle), &deadline) in sleepers.into_iter().zip(deadlines.iter()) {
            handle.join().unwrap();
            let woke = woke_at.load(Ordering::SeqCst);
            assert!(woke >= deadline, "woke at {} before deadline {}", woke, deadline);
            // First interrupt at or after the deadline
            assert_eq!(woke, deadline.div_ceil(100) * 100);
        }

        let after = crate::kern::counters::snapshot();
        assert!(after.alarm_wakeups - before.alarm_wakeups >= deadlines.len() as u64);
        assert!(after.timer_interrupts - before.timer_interrupts >= 5);
    }

    #[test]
    fn test_removed_waiter_never_matched_again() {
        let machine = Arc::new(HostMachine::with_period(100));
        let alarm = Alarm::install(machine.clone()).unwrap();
        let wakes = Arc::new(AtomicUsize::new(0));

        let handle = {
            let alarm = alarm.clone();
            let wakes = wakes.clone();
            thread::spawn(move || {
                alarm.wait_until(50);
                wakes.fetch_add(1, Ordering::SeqCst);
            })
        };
        wait_for(TIMEOUT, || alarm.pending() == 1);

        machine.tick();
        handle.join().unwrap();
        for _ in 0..5 {
            machine.tick();
        }
        assert_eq!(alarm.pending(), 0);
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_thread_waits_repeatedly() {
        let machine = Arc::new(HostMachine::with_period(100));
        let alarm = Alarm::install(machine.clone()).unwrap();
        let rounds = Arc::new(AtomicUsize::new(0));

        let handle = {
            let alarm = alarm.clone();
            let rounds = rounds.clone();
            thread::spawn(move || {
                for _ in 0..3 {
                    let start = alarm.machine().ticks();
                    alarm.wait_until(150);
                    assert!(alarm.machine().ticks() >= start + 150);
                    rounds.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        for round in 0..3 {
            wait_for(TIMEOUT, || alarm.pending() == 1);
            while rounds.load(Ordering::SeqCst) == round {
                machine.tick();
                thread::sleep(Duration::from_millis(1));
            }
        }
        handle.join().unwrap();
        assert_eq!(rounds.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_deadline_saturates_at_clock_limit() {
        let machine = Arc::new(HostMachine::with_period(100));
        let alarm = Alarm::install(machine.clone()).unwrap();
        machine.tick();
        assert_eq!(machine.ticks(), 100);

        let woke = Arc::new(AtomicBool::new(false));
        let handle = {
            let alarm = alarm.clone();
            let woke = woke.clone();
            thread::spawn(move || {
                alarm.wait_until(u64::MAX);
                woke.store(true, Ordering::SeqCst);
            })
        };
        wait_for(TIMEOUT, || alarm.pending() == 1);
        assert_eq!(alarm.next_deadline(), Some(u64::MAX));

        for _ in 0..3 {
            machine.tick();
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(alarm.pending(), 1);
        assert!(!woke.load(Ordering::SeqCst));

        // Only the last representable tick releases it.
        machine.advance(u64::MAX - machine.ticks());
        assert_eq!(machine.ticks(), u64::MAX);
        handle.join().unwrap();
        assert!(woke.load(Ordering::SeqCst));
        assert_eq!(alarm.pending(), 0);
    }
}
