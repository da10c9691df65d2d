// Shared infrastructure used by every layer of the module system

pub mod config;
pub mod errors;

pub use config::{ModuleConfig, NetworkConfig};
pub use errors::{Access, RmsError, Result};
