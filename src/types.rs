//! Common types used across ksync
//!
//! This module defines shared types to avoid circular dependencies.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Clock ticks, the only unit of time the kernel knows about
pub type Ticks = u64;

/// Thread identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ThreadId(pub u64);

impl ThreadId {
    /// Create a new thread ID with a unique auto-incremented value
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ThreadId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// Lock identifier, used to bind a condition variable to its lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LockId(pub u64);

impl LockId {
    /// Create a new lock ID with a unique auto-incremented value
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        LockId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
