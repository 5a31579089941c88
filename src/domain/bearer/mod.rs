//! Bearer bounded context - call endpoints and their attributes

pub mod entity;
pub mod value_object;

pub use entity::{Bearer, UriRecord};
pub use value_object::{
    BearerFeatures, BearerKind, StatusFlags, Technology, TerminateReason, TerminateRecord,
    AGGREGATE_INDEX, SIGNAL_STRENGTH_MAX, SIGNAL_STRENGTH_UNKNOWN,
};
