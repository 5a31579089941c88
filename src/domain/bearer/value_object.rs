//! Bearer value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bearer index addressing the aggregate bearer.
pub const AGGREGATE_INDEX: u8 = 0xFF;

/// Highest reportable signal strength.
pub const SIGNAL_STRENGTH_MAX: u8 = 100;

/// Sentinel meaning "signal strength unknown".
pub const SIGNAL_STRENGTH_UNKNOWN: u8 = 255;

/// Bearer kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BearerKind {
    /// One distinct transport/account, stored in the given registry slot
    Regular(u8),
    /// The single bearer presenting the union of all regular bearers
    Aggregate,
}

/// Bearer technology as exposed through the technology characteristic.
///
/// Wire values must be preserved for interoperability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Technology {
    ThreeG = 0x01,
    FourG = 0x02,
    Lte = 0x03,
    WiFi = 0x04,
    FiveG = 0x05,
    Gsm = 0x06,
    Cdma = 0x07,
    TwoG = 0x08,
    Wcdma = 0x09,
}

impl Technology {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Technology::ThreeG),
            0x02 => Some(Technology::FourG),
            0x03 => Some(Technology::Lte),
            0x04 => Some(Technology::WiFi),
            0x05 => Some(Technology::FiveG),
            0x06 => Some(Technology::Gsm),
            0x07 => Some(Technology::Cdma),
            0x08 => Some(Technology::TwoG),
            0x09 => Some(Technology::Wcdma),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Optional opcode capabilities of a bearer.
///
/// Bit 0 = local hold/retrieve, bit 1 = join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerFeatures(u16);

impl BearerFeatures {
    pub const HOLD: u16 = 0x0001;
    pub const JOIN: u16 = 0x0002;
    const ALL: u16 = Self::HOLD | Self::JOIN;

    pub fn new(mask: u16) -> Option<Self> {
        if mask <= Self::ALL {
            Some(Self(mask))
        } else {
            None
        }
    }

    pub fn all() -> Self {
        Self(Self::ALL)
    }

    pub fn none() -> Self {
        Self(0)
    }

    pub fn supports_hold(&self) -> bool {
        self.0 & Self::HOLD != 0
    }

    pub fn supports_join(&self) -> bool {
        self.0 & Self::JOIN != 0
    }

    pub fn to_u16(self) -> u16 {
        self.0
    }
}

/// Bearer status flags (bit 0 = inband ringtone, bit 1 = silent mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags(u16);

impl StatusFlags {
    pub const INBAND_RINGTONE: u16 = 0x0001;
    pub const SILENT_MODE: u16 = 0x0002;
    const ALL: u16 = Self::INBAND_RINGTONE | Self::SILENT_MODE;

    pub fn new(mask: u16) -> Option<Self> {
        if mask <= Self::ALL {
            Some(Self(mask))
        } else {
            None
        }
    }

    pub fn none() -> Self {
        Self(0)
    }

    pub fn to_u16(self) -> u16 {
        self.0
    }
}

/// Reason reported when a call terminates.
///
/// Wire values must be preserved for interoperability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TerminateReason {
    ImproperUri = 0x00,
    CallFailed = 0x01,
    RemoteEnded = 0x02,
    ServerEnded = 0x03,
    LineBusy = 0x04,
    NetworkCongestion = 0x05,
    ClientTerminated = 0x06,
    NoService = 0x07,
    NoAnswer = 0x08,
    Unspecified = 0x09,
}

impl TerminateReason {
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminateReason::ImproperUri => "improper URI",
            TerminateReason::CallFailed => "call failed",
            TerminateReason::RemoteEnded => "remote party ended the call",
            TerminateReason::ServerEnded => "server ended the call",
            TerminateReason::LineBusy => "line busy",
            TerminateReason::NetworkCongestion => "network congestion",
            TerminateReason::ClientTerminated => "client terminated the call",
            TerminateReason::NoService => "no service",
            TerminateReason::NoAnswer => "no answer",
            TerminateReason::Unspecified => "unspecified",
        };
        write!(f, "{}", name)
    }
}

/// Last termination record of a bearer, overwritten on each termination and
/// exposed only via notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateRecord {
    pub call_index: u8,
    pub reason: TerminateReason,
}
