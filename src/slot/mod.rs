pub mod dtype;
pub mod slot;

pub use dtype::{DType, Element};
pub use slot::{allocate_array, allocate_scalar, Slot};
