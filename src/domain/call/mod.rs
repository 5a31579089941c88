//! Call bounded context - per-call state and flags

pub mod entity;
pub mod value_object;

pub use entity::Call;
pub use value_object::{CallDirection, CallFlags, CallState, FREE_CALL_INDEX, MAX_CALL_INDEX};
