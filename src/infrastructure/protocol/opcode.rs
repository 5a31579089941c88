//! Control-point command codec
//!
//! Wire layout: `{opcode: 1 byte, payload}`. Accept/terminate/hold/retrieve
//! carry a single call-index byte, originate carries raw URI bytes with no
//! terminator, join carries one call-index byte per joined call.

use crate::domain::shared::ControlError;
use crate::infrastructure::protocol::uri::MIN_URI_LEN;

/// Call-control opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Accept = 0x00,
    Terminate = 0x01,
    LocalHold = 0x02,
    LocalRetrieve = 0x03,
    Originate = 0x04,
    Join = 0x05,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Opcode::Accept),
            0x01 => Some(Opcode::Terminate),
            0x02 => Some(Opcode::LocalHold),
            0x03 => Some(Opcode::LocalRetrieve),
            0x04 => Some(Opcode::Originate),
            0x05 => Some(Opcode::Join),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get opcode name
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Accept => "Accept",
            Opcode::Terminate => "Terminate",
            Opcode::LocalHold => "LocalHold",
            Opcode::LocalRetrieve => "LocalRetrieve",
            Opcode::Originate => "Originate",
            Opcode::Join => "Join",
        }
    }
}

/// Result code carried in the status acknowledgement.
///
/// Wire values must be preserved for interoperability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResultCode {
    Success = 0x00,
    OpcodeNotSupported = 0x01,
    OperationNotPossible = 0x02,
    InvalidCallIndex = 0x03,
    StateMismatch = 0x04,
    OutOfResources = 0x05,
    InvalidUri = 0x06,
}

impl ResultCode {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get result name
    pub fn name(&self) -> &'static str {
        match self {
            ResultCode::Success => "Success",
            ResultCode::OpcodeNotSupported => "OpcodeNotSupported",
            ResultCode::OperationNotPossible => "OperationNotPossible",
            ResultCode::InvalidCallIndex => "InvalidCallIndex",
            ResultCode::StateMismatch => "StateMismatch",
            ResultCode::OutOfResources => "OutOfResources",
            ResultCode::InvalidUri => "InvalidUri",
        }
    }
}

impl From<ControlError> for ResultCode {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::OpcodeNotSupported => ResultCode::OpcodeNotSupported,
            ControlError::OperationNotPossible => ResultCode::OperationNotPossible,
            ControlError::InvalidCallIndex => ResultCode::InvalidCallIndex,
            ControlError::StateMismatch => ResultCode::StateMismatch,
            ControlError::OutOfResources => ResultCode::OutOfResources,
            ControlError::InvalidUri => ResultCode::InvalidUri,
        }
    }
}

/// Decoded control-point command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Accept { call_index: u8 },
    Terminate { call_index: u8 },
    Hold { call_index: u8 },
    Retrieve { call_index: u8 },
    Originate { uri: Vec<u8> },
    Join { call_indexes: Vec<u8> },
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Accept { .. } => Opcode::Accept,
            Command::Terminate { .. } => Opcode::Terminate,
            Command::Hold { .. } => Opcode::LocalHold,
            Command::Retrieve { .. } => Opcode::LocalRetrieve,
            Command::Originate { .. } => Opcode::Originate,
            Command::Join { .. } => Opcode::Join,
        }
    }
}

/// Command decoding failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The payload is empty or violates the opcode's length requirement;
    /// rejected at the transport level before any state is touched.
    InvalidLength,
    /// Unknown opcode byte; acknowledged in-band with OpcodeNotSupported.
    UnknownOpcode(u8),
}

impl Command {
    /// Decode one control-point write.
    ///
    /// Accept/terminate/hold/retrieve require an exact two-byte payload;
    /// originate requires at least the minimum URI length and join at least
    /// one call index (the 2..=capacity count rule is enforced by the join
    /// operation itself).
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        let (&opcode_byte, body) = payload.split_first().ok_or(ParseError::InvalidLength)?;
        let opcode = Opcode::from_u8(opcode_byte).ok_or(ParseError::UnknownOpcode(opcode_byte))?;

        match opcode {
            Opcode::Accept | Opcode::Terminate | Opcode::LocalHold | Opcode::LocalRetrieve => {
                if body.len() != 1 {
                    return Err(ParseError::InvalidLength);
                }
                let call_index = body[0];
                Ok(match opcode {
                    Opcode::Accept => Command::Accept { call_index },
                    Opcode::Terminate => Command::Terminate { call_index },
                    Opcode::LocalHold => Command::Hold { call_index },
                    _ => Command::Retrieve { call_index },
                })
            }
            Opcode::Originate => {
                if body.len() < MIN_URI_LEN {
                    return Err(ParseError::InvalidLength);
                }
                Ok(Command::Originate {
                    uri: body.to_vec(),
                })
            }
            Opcode::Join => {
                if body.is_empty() {
                    return Err(ParseError::InvalidLength);
                }
                Ok(Command::Join {
                    call_indexes: body.to_vec(),
                })
            }
        }
    }
}
