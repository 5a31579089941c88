//! Domain layer - call and bearer state plus the rules that govern them
//!
//! This layer contains:
//! - Entities: calls and bearers, objects with identity
//! - Value Objects: states, flags, feature masks, wire-stable enums
//! - Shared kernel: error taxonomy and result alias

pub mod bearer;
pub mod call;
pub mod shared;

// Re-export commonly used types
pub use shared::{ControlError, Result, ServiceError};
