//! Domain errors

use thiserror::Error;

/// Errors returned by the bearer lifecycle and application API.
///
/// These are the "fatal" conditions of the engine: every one of them is a
/// precondition violation reported to the caller; the engine never aborts the
/// process on them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Aggregate bearer already registered")]
    AggregateAlreadyRegistered,

    #[error("Aggregate bearer must be registered first")]
    AggregateNotRegistered,

    #[error("Cannot unregister the aggregate bearer while regular bearers remain")]
    RegularBearersRemain,

    #[error("No free bearer slot")]
    NoFreeBearerSlot,

    #[error("Bearer {0} not found")]
    BearerNotFound(u8),

    #[error("Control operation failed: {0}")]
    Control(#[from] ControlError),

    #[error("Attribute server error: {0}")]
    Attribute(#[from] AttributeError),
}

/// In-band call-control failures.
///
/// Each variant maps 1:1 onto a wire result code; none of them mutates state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    #[error("Opcode not supported")]
    OpcodeNotSupported,

    #[error("Operation not possible")]
    OperationNotPossible,

    #[error("Invalid call index")]
    InvalidCallIndex,

    #[error("State mismatch")]
    StateMismatch,

    #[error("Out of resources")]
    OutOfResources,

    #[error("Invalid outgoing URI")]
    InvalidUri,
}

/// Transport-level rejection of a characteristic write.
///
/// Rejected before any decoding or mutation; the attribute layer maps these
/// onto its own protocol error codes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    #[error("Authorization required")]
    AuthorizationRequired,

    #[error("Invalid write offset")]
    InvalidOffset,

    #[error("Invalid payload length")]
    InvalidLength,

    #[error("Characteristic is not writable")]
    NotWritable,

    #[error("No bearer registered at the written handle")]
    UnknownBearer,
}

/// Failure reported by the attribute server when delivering a notification or
/// (un)registering a bearer's attribute set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("No subscribers for the characteristic")]
    NotSubscribed,

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Registration failed: {0}")]
    Registration(String),
}
