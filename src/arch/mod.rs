//! Platform implementations of the machine interface
//!
//! Each platform provides a type implementing
//! [`Machine`](crate::kern::machine::Machine). Bare-metal ports supply their
//! own; the hosted implementation lives here.

#[cfg(any(test, feature = "std"))]
pub mod host;

#[cfg(any(test, feature = "std"))]
pub use host::{HostMachine, HostThread};
