//! Robot module system: concurrent modules exchanging values through named,
//! gated shared variables.
//!
//! - [`slot`]: fixed-type shared storage for one variable
//! - [`gate`]: single-producer / multi-consumer handoff barrier
//! - [`interface`]: name → (slot, gate) registry and its composition algebra
//! - [`module`]: the user behaviour trait and the runner driving its cycle
//! - [`network`]: start and stop a whole graph of modules
//!
//! Deadlock freedom is the application's responsibility: a module waits for
//! all of its inputs before publishing any output, so modules must not form a
//! circular wait. [`Network::check_wiring`] rejects the static form of that
//! mistake.

// Core infrastructure modules
pub mod core;

pub mod gate;
pub mod interface;
pub mod module;
pub mod network;
pub mod slot;

// Re-exports for convenience
pub use crate::core::config::{ModuleConfig, NetworkConfig};
pub use crate::core::errors::{Access, RmsError, Result};
pub use gate::{ConsumerId, Gate, ProducerId};
pub use interface::{Interface, Lookup};
pub use module::{Module, ModuleHandle, ModuleRunner, Ports, RunSummary, ShutdownSignal, StopReason};
pub use network::{Network, NetworkHandle};
pub use slot::{allocate_array, allocate_scalar, DType, Element, Slot};
