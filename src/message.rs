//! LPD8 SysEx messages
//!
//! | Operation            | Type | Payload                 | Reply                   |
//! |----------------------|------|-------------------------|-------------------------|
//! | write program        | 0x61 | index + program (58)    | none                    |
//! | set active program   | 0x62 | index                   | none                    |
//! | read program         | 0x63 | index                   | index + program (58)    |
//! | get active program   | 0x64 | empty                   | index                   |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::frame::{decode_frame, encode_frame};
use crate::program::{Program, PROGRAM_SIZE};

/// Payload size of a program read reply / program write request
pub const PROGRAM_MSG_SIZE: usize = PROGRAM_SIZE + 1;

/// Message type byte of an LPD8 SysEx message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    WriteProgram = 0x61,
    SetActiveProgram = 0x62,
    ReadProgram = 0x63,
    GetActiveProgram = 0x64,
}

impl MessageType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A program slot on the device (1-4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ProgramIndex(u8);

impl ProgramIndex {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    pub fn new(index: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&index) {
            Ok(Self(index))
        } else {
            Err(Error::InvalidProgramIndex(index))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// All slots in order
    pub fn all() -> impl Iterator<Item = ProgramIndex> {
        (Self::MIN..=Self::MAX).map(ProgramIndex)
    }
}

impl TryFrom<u8> for ProgramIndex {
    type Error = Error;

    fn try_from(index: u8) -> Result<Self> {
        Self::new(index)
    }
}

impl From<ProgramIndex> for u8 {
    fn from(index: ProgramIndex) -> u8 {
        index.0
    }
}

impl FromStr for ProgramIndex {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let index: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a program number (1-4)", s))?;
        Self::new(index).map_err(|e| e.to_string())
    }
}

impl fmt::Display for ProgramIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reply to a program read request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramResponse {
    /// Slot the device says this program belongs to. Not range checked.
    pub index: u8,
    pub program: Program,
}

impl ProgramResponse {
    /// Whether this reply answers a read of `index`
    pub fn is_for(&self, index: ProgramIndex) -> bool {
        self.index == index.get()
    }
}

/// Create a message that writes `program` to the slot at `index`.
///
/// The device does not reply to this message.
pub fn encode_write_program(index: ProgramIndex, program: &Program) -> Result<Vec<u8>> {
    let encoded = program.encode()?;
    let mut payload = Vec::with_capacity(PROGRAM_MSG_SIZE);
    payload.push(index.get());
    payload.extend_from_slice(&encoded);
    Ok(encode_frame(MessageType::WriteProgram.as_byte(), &payload))
}

/// Create a 'program read' request
pub fn encode_read_program(index: ProgramIndex) -> Vec<u8> {
    encode_frame(MessageType::ReadProgram.as_byte(), &[index.get()])
}

/// Decode the device's reply to a 'program read' request
pub fn decode_read_program_response(msg: &[u8]) -> Result<ProgramResponse> {
    let payload = decode_frame(
        msg,
        MessageType::ReadProgram.as_byte(),
        PROGRAM_MSG_SIZE as u8,
    )?;
    Ok(ProgramResponse {
        index: payload[0],
        program: Program::decode(&payload[1..])?,
    })
}

/// Create a 'get active program' request
pub fn encode_get_active_program() -> Vec<u8> {
    encode_frame(MessageType::GetActiveProgram.as_byte(), &[])
}

/// Decode the reply to a 'get active program' request
pub fn decode_active_program_response(msg: &[u8]) -> Result<ProgramIndex> {
    let payload = decode_frame(msg, MessageType::GetActiveProgram.as_byte(), 1)?;
    ProgramIndex::new(payload[0])
}

/// Create a message that selects the active program. The device does not reply.
pub fn encode_set_active_program(index: ProgramIndex) -> Vec<u8> {
    encode_frame(MessageType::SetActiveProgram.as_byte(), &[index.get()])
}
