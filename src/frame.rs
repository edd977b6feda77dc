//! LPD8 SysEx framing
//!
//! Every device message is wrapped in the same envelope:
//!
//! ```text
//! F0 47 7F 75 <type> 00 <length> <payload...> F7
//! ```
//!
//! This module only knows about the envelope, not about what the payload means.

use crate::error::{Error, Result};

/// SysEx start byte
pub const SYSEX_START: u8 = 0xF0;

/// SysEx end byte
pub const SYSEX_END: u8 = 0xF7;

/// Manufacturer (Akai) and model (LPD8) identifier
pub const DEVICE_ID: [u8; 3] = [0x47, 0x7F, 0x75];

/// Header size: start byte, device id, type, reserved, length
pub const HEADER_LEN: usize = 7;

/// Build the 7-byte header for a message of `msg_type` carrying `length` payload bytes.
///
/// The returned buffer has room for the payload and trailer.
pub fn build_header(msg_type: u8, length: u8) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN + length as usize + 1);
    header.push(SYSEX_START);
    header.extend_from_slice(&DEVICE_ID);
    header.extend_from_slice(&[msg_type, 0x00, length]);
    header
}

/// Wrap `payload` into a complete frame.
///
/// Payloads are at most a few dozen bytes; the length must fit the single length byte.
pub fn encode_frame(msg_type: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= u8::MAX as usize);
    let mut frame = build_header(msg_type, payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.push(SYSEX_END);
    frame
}

/// Check the envelope of `msg` and return its payload.
pub fn decode_frame(msg: &[u8], expected_type: u8, expected_length: u8) -> Result<&[u8]> {
    let header = build_header(expected_type, expected_length);
    if !msg.starts_with(&header) {
        return Err(Error::FrameMismatch {
            expected_type,
            expected_length,
        });
    }
    // The trailer must come after the header, not be part of it.
    if msg.len() <= HEADER_LEN || msg[msg.len() - 1] != SYSEX_END {
        return Err(Error::FrameTruncated);
    }

    let payload = &msg[HEADER_LEN..msg.len() - 1];
    if payload.len() != expected_length as usize {
        return Err(Error::FrameLengthMismatch {
            expected: expected_length as usize,
            actual: payload.len(),
        });
    }
    Ok(payload)
}

/// Whether `msg` looks like a complete SysEx message (starts with F0, ends with F7).
///
/// A lone `F0` is not a frame.
pub fn is_sysex(msg: &[u8]) -> bool {
    msg.len() >= 2 && msg[0] == SYSEX_START && msg[msg.len() - 1] == SYSEX_END
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
