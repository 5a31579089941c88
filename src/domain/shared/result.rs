//! Domain result type

use super::error::ServiceError;

/// Standard result type for engine operations
pub type Result<T> = std::result::Result<T, ServiceError>;
