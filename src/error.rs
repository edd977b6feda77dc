//! Error types for the LPD8 protocol core
//!
//! Every variant carries the offending value so the command layer can tell
//! the user exactly which frame byte, field or slot was wrong.

use std::time::Duration;

/// Result alias used throughout the protocol core
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by framing, program encoding and request correlation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The frame does not start with the expected header
    #[error("frame does not match LPD8 header (type 0x{expected_type:02X}, length {expected_length})")]
    FrameMismatch { expected_type: u8, expected_length: u8 },

    /// The frame is missing the SysEx end byte
    #[error("missing sysex termination byte")]
    FrameTruncated,

    /// The payload between header and trailer has the wrong size
    #[error("wrong message size {actual} (want {expected})")]
    FrameLengthMismatch { expected: usize, actual: usize },

    /// An encoded program is not exactly `PROGRAM_SIZE` bytes
    #[error("wrong encoded program size {actual}, want {expected} bytes")]
    WrongSize { expected: usize, actual: usize },

    #[error("invalid program: {0}")]
    InvalidProgram(#[from] ProgramError),

    /// Slot index outside 1-4
    #[error("invalid program index {0} (must be 1-4)")]
    InvalidProgramIndex(u8),

    #[error("timed out after {0:?} waiting for valid LPD8 response")]
    ResponseTimeout(Duration),

    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A field of a [`Program`](crate::program::Program) that failed validation.
///
/// Pad and knob numbers are 1-based, matching the labels on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProgramError {
    #[error("invalid MIDI channel {0}")]
    Channel(u8),

    #[error("pad {pad} has invalid {field} {value}")]
    PadValue { pad: usize, field: &'static str, value: u8 },

    #[error("knob {knob} has invalid {field} {value}")]
    KnobValue { knob: usize, field: &'static str, value: u8 },

    #[error("knob {knob} has min value {min} > max value {max}")]
    KnobRange { knob: usize, min: u8, max: u8 },
}

/// Failure reported by the underlying MIDI transport.
///
/// The core treats it as opaque and only passes it through.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
