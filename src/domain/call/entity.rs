//! Call entity

use crate::domain::call::value_object::{CallDirection, CallFlags, CallState};
use serde::{Deserialize, Serialize};

/// One call session tracked by index, state and remote-party URI.
///
/// A call is exclusively owned by the bearer holding its slot. It is created
/// by the allocator, mutated only by the state machine and freed on any
/// terminal transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Engine-wide unique call index (1..=254)
    index: u8,
    /// Current state
    state: CallState,
    /// Direction and reserved flag bits
    flags: CallFlags,
    /// Remote party URI, e.g. "tel:123"
    remote_uri: String,
}

impl Call {
    pub fn new(index: u8, state: CallState, direction: CallDirection, remote_uri: String) -> Self {
        Self {
            index,
            state,
            flags: CallFlags::from_direction(direction),
            remote_uri,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: CallState) {
        self.state = state;
    }

    pub fn flags(&self) -> CallFlags {
        self.flags
    }

    pub fn direction(&self) -> CallDirection {
        self.flags.direction()
    }

    pub fn remote_uri(&self) -> &str {
        &self.remote_uri
    }
}
