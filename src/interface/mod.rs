pub mod interface;
pub mod lookup;

pub use interface::Interface;
pub use lookup::Lookup;
