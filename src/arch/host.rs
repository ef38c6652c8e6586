//! Host machine - kernel threads on OS threads
//!
//! Implements the [`Machine`](crate::kern::machine::Machine) contracts on a
//! hosted target so the primitives run, and are tested, against real
//! concurrency:
//!
//! - "Interrupts disabled" means the calling thread owns the virtual CPU.
//!   Only one thread can own it at a time; nested disables by the owner are
//!   no-ops.
//! - Every OS thread lazily gets a [`HostThread`] with a wake permit.
//!   Sleeping hands the CPU back, waits for the permit, then retakes the CPU,
//!   so a thread that sleeps with interrupts disabled wakes with them
//!   disabled again.
//! - The clock only moves when [`HostMachine::advance`] or
//!   [`HostMachine::tick`] is called, which then runs the timer handler the
//!   way a timer interrupt would.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::{Config, TIMER_PERIOD};
use crate::kern::machine::{Clock, IntStatus, Interrupts, Threads, Timer, TimerHandler};
use crate::types::{ThreadId, Ticks};

/// Lock a std mutex, ignoring poisoning from a panicked test thread
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Host Threads
// ============================================================================

struct ThreadControl {
    id: ThreadId,
    /// Set by `ready`, consumed by `sleep`
    permit: Mutex<bool>,
    wakeup: Condvar,
}

/// Kernel thread handle for an OS thread
#[derive(Clone)]
pub struct HostThread(Arc<ThreadControl>);

thread_local! {
    static CURRENT: HostThread = HostThread::new();
}

impl HostThread {
    fn new() -> Self {
        HostThread(Arc::new(ThreadControl {
            id: ThreadId::new(),
            permit: Mutex::new(false),
            wakeup: Condvar::new(),
        }))
    }

    /// Handle of the calling OS thread
    pub fn current() -> Self {
        CURRENT.with(HostThread::clone)
    }

    /// Kernel thread ID
    pub fn id(&self) -> ThreadId {
        self.0.id
    }

    /// Block until a permit is granted, then consume it
    fn park(&self) {
        let mut permit = lock(&self.0.permit);
        while !*permit {
            permit = self
                .0
                .wakeup
                .wait(permit)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permit = false;
    }

    /// Grant the permit
    fn unpark(&self) {
        *lock(&self.0.permit) = true;
        self.0.wakeup.notify_one();
    }
}

impl PartialEq for HostThread {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for HostThread {}

impl fmt::Debug for HostThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostThread").field(&self.0.id.0).finish()
    }
}

// ============================================================================
// Host Machine
// ============================================================================

/// Simulated uniprocessor: tick clock, interrupt state, timer, threads
pub struct HostMachine {
    ticks: AtomicU64,
    period: Ticks,
    /// Thread that currently has interrupts disabled
    cpu: Mutex<Option<ThreadId>>,
    cpu_free: Condvar,
    handler: Mutex<Option<TimerHandler>>,
}

impl HostMachine {
    /// Machine with the default timer period
    pub fn new() -> Self {
        Self::with_period(TIMER_PERIOD)
    }

    /// Machine whose [`tick`](Self::tick) advances the clock by `period`
    pub fn with_period(period: Ticks) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            period,
            cpu: Mutex::new(None),
            cpu_free: Condvar::new(),
            handler: Mutex::new(None),
        }
    }

    /// Machine configured from `config`
    pub fn from_config(config: &Config) -> Self {
        Self::with_period(config.timer_period)
    }

    /// Ticks added per timer interrupt
    pub fn period(&self) -> Ticks {
        self.period
    }

    /// Advance the clock by `ticks`, then deliver a timer interrupt
    pub fn advance(&self, ticks: Ticks) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
        // Clone out so the handler runs without the registration lock held.
        let handler = lock(&self.handler).clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    /// Deliver one periodic timer interrupt
    pub fn tick(&self) {
        self.advance(self.period);
    }

    fn take_cpu(&self, me: ThreadId) {
        let mut owner = lock(&self.cpu);
        while owner.is_some() {
            owner = self
                .cpu_free
                .wait(owner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *owner = Some(me);
    }

    fn give_cpu(&self, me: ThreadId) {
        let mut owner = lock(&self.cpu);
        assert_eq!(*owner, Some(me), "interrupts restored by a thread that did not disable them");
        *owner = None;
        drop(owner);
        self.cpu_free.notify_one();
    }
}

impl Default for HostMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HostMachine {
    fn ticks(&self) -> Ticks {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl Interrupts for HostMachine {
    fn disable(&self) -> IntStatus {
        let me = HostThread::current().id();
        let mut owner = lock(&self.cpu);
        if *owner == Some(me) {
            return IntStatus::Disabled;
        }
        while owner.is_some() {
            owner = self
                .cpu_free
                .wait(owner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *owner = Some(me);
        IntStatus::Enabled
    }

    fn restore(&self, status: IntStatus) {
        if status == IntStatus::Enabled {
            self.give_cpu(HostThread::current().id());
        }
    }

    fn enabled(&self) -> bool {
        *lock(&self.cpu) != Some(HostThread::current().id())
    }
}

impl Timer for HostMachine {
    fn set_interrupt_handler(&self, handler: TimerHandler) -> bool {
        let mut slot = lock(&self.handler);
        if slot.is_some() {
            return false;
        }
        *slot = Some(handler);
        true
    }

    fn clear_interrupt_handler(&self) {
        lock(&self.handler).take();
    }
}

impl Threads for HostMachine {
    type Thread = HostThread;

    fn current_thread(&self) -> HostThread {
        HostThread::current()
    }

    fn sleep(&self) {
        let me = HostThread::current();
        assert!(!self.enabled(), "{:?} slept with interrupts enabled", me);
        self.give_cpu(me.id());
        me.park();
        self.take_cpu(me.id());
    }

    fn ready(&self, thread: &HostThread) {
        debug_assert!(!self.enabled(), "ready called with interrupts enabled");
        thread.unpark();
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

/// Poll `cond` until it holds, panicking once `timeout` has elapsed
///
/// Lets tests wait for another thread to reach a blocking point without
/// hanging forever on a lost wakeup.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(
            start.elapsed() < timeout,
            "condition not reached within {:?}",
            timeout
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}
