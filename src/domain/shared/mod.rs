//! Shared kernel - common types used across the call and bearer contexts

pub mod error;
pub mod result;

pub use error::{AttributeError, ControlError, ServiceError, WriteError};
pub use result::Result;
