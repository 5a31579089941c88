//! Yodel - a call-control service engine
//!
//! This is a Domain-Driven Design (DDD) implementation of a telephone-bearer
//! service: telephone bearers expose their calls and properties as a
//! characteristic table, remote peers drive the calls through a control
//! point, and the hosting application drives them through a direct API. An
//! aggregate bearer mirrors every regular bearer as one merged view.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{
    AttributeServer, CallCallbacks, CallControlEngine, CharacteristicId, PeerId, RegisterParams,
    Scheduler,
};
pub use config::{Config, EngineConfig};
pub use domain::shared::error::ServiceError;
pub use domain::shared::result::Result;
