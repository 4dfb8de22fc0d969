pub mod bus;
pub mod publisher;

pub use bus::*;
pub use publisher::*;
