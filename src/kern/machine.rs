//! Machine Interface - the contracts the primitives are built on
//!
//! The alarm, lock, condition and communicator never touch hardware or the
//! scheduler directly. They are generic over a [`Machine`], which bundles:
//!
//! - a monotonic tick [`Clock`]
//! - an [`Interrupts`] controller with nestable disable/restore
//! - a [`Timer`] that calls one registered handler periodically
//! - a [`Threads`] abstraction with sleep/ready/yield
//!
//! A real kernel implements these over its interrupt controller and run
//! queue; [`crate::arch::host`] implements them over OS threads.

use alloc::sync::Arc;
use core::fmt;

use crate::types::Ticks;

// ============================================================================
// Clock
// ============================================================================

/// Monotonic tick source, advanced externally
pub trait Clock {
    /// Current tick count; never decreases
    fn ticks(&self) -> Ticks;
}

// ============================================================================
// Interrupts
// ============================================================================

/// Interrupt state before a [`Interrupts::disable`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntStatus {
    /// Interrupts were enabled; restoring re-enables them
    Enabled,
    /// Interrupts were already disabled; restoring is a no-op
    Disabled,
}

/// Interrupt controller
pub trait Interrupts {
    /// Disable interrupts, returning the previous state
    fn disable(&self) -> IntStatus;

    /// Put interrupts back into `status`
    fn restore(&self, status: IntStatus);

    /// Are interrupts enabled for the calling thread?
    fn enabled(&self) -> bool;
}

/// RAII guard that keeps interrupts disabled while alive
pub struct InterruptGuard<'a, I: Interrupts + ?Sized> {
    interrupts: &'a I,
    status: IntStatus,
}

impl<'a, I: Interrupts + ?Sized> InterruptGuard<'a, I> {
    pub fn new(interrupts: &'a I) -> Self {
        let status = interrupts.disable();
        Self { interrupts, status }
    }

    /// State that will be restored on drop
    pub fn status(&self) -> IntStatus {
        self.status
    }
}

impl<'a, I: Interrupts + ?Sized> Drop for InterruptGuard<'a, I> {
    fn drop(&mut self) {
        self.interrupts.restore(self.status);
    }
}

// ============================================================================
// Timer
// ============================================================================

/// Periodic timer interrupt callback
pub type TimerHandler = Arc<dyn Fn() + Send + Sync>;

/// Hardware timer that invokes one handler roughly every period
pub trait Timer {
    /// Register `handler`; returns false if one is already registered
    fn set_interrupt_handler(&self, handler: TimerHandler) -> bool;

    /// Remove the registered handler, if any
    fn clear_interrupt_handler(&self);
}

// ============================================================================
// Threads
// ============================================================================

/// Thread abstraction
pub trait Threads {
    /// Handle naming one kernel thread
    type Thread: Clone + Eq + Send + Sync + fmt::Debug + 'static;

    /// Handle of the calling thread
    fn current_thread(&self) -> Self::Thread;

    /// Suspend the calling thread until some other thread readies it
    ///
    /// Must be called with interrupts disabled. The caller gives up the
    /// processor while suspended and returns with interrupts still disabled.
    fn sleep(&self);

    /// Make a sleeping thread eligible to run again
    ///
    /// Must be called with interrupts disabled.
    fn ready(&self, thread: &Self::Thread);

    /// Voluntarily give the processor to another ready thread
    fn yield_now(&self);
}

/// Everything the primitives need from the machine
pub trait Machine: Clock + Interrupts + Timer + Threads + Send + Sync {}

impl<M> Machine for M where M: Clock + Interrupts + Timer + Threads + Send + Sync {}
