pub mod gate;

pub use gate::{ConsumerId, Gate, ProducerId};
