//! Kern subsystem - Thread synchronization primitives
//!
//! Contains the machine interface the primitives run against, the sleeping
//! lock and condition variables they are built from, and the two services
//! exposed to kernel threads: timed sleep and synchronous word exchange.

pub mod alarm;
pub mod communicator;
pub mod condition;
pub mod counters;
pub mod lock;
pub mod machine;

pub use alarm::{Alarm, AlarmError, WaitQueue, Waiter};
pub use communicator::Communicator;
pub use condition::Condition;
pub use counters::{CounterSnapshot, ALL_COUNTERS};
pub use lock::{Lock, LockGuard};
pub use machine::{Clock, IntStatus, InterruptGuard, Interrupts, Machine, Threads, Timer, TimerHandler};
