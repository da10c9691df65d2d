pub mod module;
pub mod runner;

pub use module::{Module, Ports};
pub use runner::{ModuleHandle, ModuleRunner, RunSummary, ShutdownSignal, StopReason};
