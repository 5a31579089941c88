//! Infrastructure layer - wire formats and host adapters

pub mod attribute;
pub mod protocol;
pub mod scheduler;

pub use attribute::{Delivery, LoopbackAttributeServer};
pub use scheduler::TokioScheduler;
