//! Call value objects

use serde::{Deserialize, Serialize};

/// Call index reserved as the free/none sentinel.
///
/// Index 0 doubles as the "no call" value reported back for failed control
/// commands; 255 is the aggregate bearer index and never assigned to a call.
pub const FREE_CALL_INDEX: u8 = 0;

/// Largest call index the allocator will ever hand out.
pub const MAX_CALL_INDEX: u8 = 254;

/// Call state
///
/// The discriminants are the wire values of the call-state report and must
/// not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CallState {
    /// A remote party is calling us
    Incoming = 0x00,
    /// We are calling a remote party, not yet ringing
    Dialing = 0x01,
    /// The remote party is being alerted
    Alerting = 0x02,
    /// The call is connected
    Active = 0x03,
    /// Held by the local party
    LocallyHeld = 0x04,
    /// Held by the remote party
    RemotelyHeld = 0x05,
    /// Held by both parties
    LocallyAndRemotelyHeld = 0x06,
}

impl CallState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(CallState::Incoming),
            0x01 => Some(CallState::Dialing),
            0x02 => Some(CallState::Alerting),
            0x03 => Some(CallState::Active),
            0x04 => Some(CallState::LocallyHeld),
            0x05 => Some(CallState::RemotelyHeld),
            0x06 => Some(CallState::LocallyAndRemotelyHeld),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get state name
    pub fn name(&self) -> &'static str {
        match self {
            CallState::Incoming => "Incoming",
            CallState::Dialing => "Dialing",
            CallState::Alerting => "Alerting",
            CallState::Active => "Active",
            CallState::LocallyHeld => "LocallyHeld",
            CallState::RemotelyHeld => "RemotelyHeld",
            CallState::LocallyAndRemotelyHeld => "LocallyAndRemotelyHeld",
        }
    }
}

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// A remote party called us
    Incoming,
    /// We called a remote party
    Outgoing,
}

/// Call flags as carried in call-state and current-calls reports.
///
/// Bit 0 is the direction (0 = incoming, 1 = outgoing); the remaining bits
/// are reserved and always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFlags(u8);

impl CallFlags {
    const OUTGOING: u8 = 0x01;

    pub fn incoming() -> Self {
        Self(0)
    }

    pub fn outgoing() -> Self {
        Self(Self::OUTGOING)
    }

    pub fn from_direction(direction: CallDirection) -> Self {
        match direction {
            CallDirection::Incoming => Self::incoming(),
            CallDirection::Outgoing => Self::outgoing(),
        }
    }

    pub fn direction(&self) -> CallDirection {
        if self.0 & Self::OUTGOING != 0 {
            CallDirection::Outgoing
        } else {
            CallDirection::Incoming
        }
    }

    pub fn to_u8(self) -> u8 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wire_values_round_trip() {
        for value in 0x00..=0x06 {
            let state = CallState::from_u8(value).unwrap();
            assert_eq!(state.to_u8(), value);
        }
        assert_eq!(CallState::from_u8(0x07), None);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(CallState::Incoming.name(), "Incoming");
        assert_eq!(CallState::Dialing.name(), "Dialing");
        assert_eq!(
            CallState::LocallyAndRemotelyHeld.name(),
            "LocallyAndRemotelyHeld"
        );
    }

    #[test]
    fn test_flags_direction_bit() {
        assert_eq!(CallFlags::incoming().to_u8(), 0x00);
        assert_eq!(CallFlags::outgoing().to_u8(), 0x01);
        assert_eq!(
            CallFlags::from_direction(CallDirection::Outgoing).direction(),
            CallDirection::Outgoing
        );
    }
}
