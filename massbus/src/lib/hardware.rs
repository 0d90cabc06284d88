mod hardware_interface;
mod hardware_memory;

pub use hardware_interface::*;
pub use hardware_memory::{InMemoryInterface, Transfer};
