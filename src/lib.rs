//! ksync - Kernel thread synchronization
//!
//! This crate provides the sleep and rendezvous services of a small
//! teaching kernel: an alarm that puts threads to sleep until a clock
//! deadline, and a communicator that hands single words from speaking
//! threads to listening threads. Both are built from a sleeping lock and
//! condition variables, which in turn only need the narrow machine
//! interface in [`kern::machine`].
//!
//! The library is `no_std` with `alloc`. The `std` feature adds a hosted
//! machine in [`arch::host`] that runs kernel threads on OS threads.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
// Kernel types have specialized initialization that doesn't fit Default
#![allow(clippy::new_without_default)]

extern crate alloc;

// Core types
pub mod types;

pub mod arch;
pub mod config;
pub mod console;
pub mod kern;

#[cfg(test)]
mod tests;

pub use config::{Config, HandoffMode};
pub use kern::{Alarm, AlarmError, Communicator, Condition, Lock, LockGuard, Machine};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Library name
pub const NAME: &str = "ksync";

/// Initialize the library
///
/// Installs the console logger at the configured level. Fails if another
/// logger is already installed.
pub fn init(config: &Config) -> Result<(), log::SetLoggerError> {
    console::init(config.log_level)?;
    log::info!("{} v{} initialized", NAME, VERSION);
    Ok(())
}
