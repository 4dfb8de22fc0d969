pub mod agents;
pub mod classifier;
pub mod webhooks;

pub use agents::*;
pub use classifier::*;
pub use webhooks::*;
