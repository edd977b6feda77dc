//! LPD8 program data and its 57-byte wire layout
//!
//! ```text
//! byte 0        channel (0-based on the wire)
//! bytes 1..33   8 pads  x [note, pc, cc, toggle]
//! bytes 33..57  8 knobs x [cc, min, max]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, ProgramError, Result};

/// Number of pads in a program
pub const PAD_COUNT: usize = 8;

/// Number of knobs in a program
pub const KNOB_COUNT: usize = 8;

const PAD_SIZE: usize = 4;
const KNOB_SIZE: usize = 3;
const PADS_OFFSET: usize = 1;
const KNOBS_OFFSET: usize = PADS_OFFSET + PAD_COUNT * PAD_SIZE;

/// Size of an encoded program in bytes
pub const PROGRAM_SIZE: usize = KNOBS_OFFSET + KNOB_COUNT * KNOB_SIZE;

const MAX_DATA_VALUE: u8 = 127;
const MAX_CHANNEL: u8 = 16;

/// The configuration of one LPD8 program slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// MIDI channel (1-16)
    pub channel: u8,
    pub pads: [Pad; PAD_COUNT],
    pub knobs: [Knob; KNOB_COUNT],
}

/// Configuration of a single pad
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pad {
    pub note: u8,
    /// Program change number
    pub pc: u8,
    /// Control change number
    pub cc: u8,
    pub toggle: bool,
}

/// Configuration of a single knob
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Knob {
    pub cc: u8,
    pub min: u8,
    pub max: u8,
}

impl Default for Program {
    fn default() -> Self {
        Self {
            channel: 1,
            pads: [Pad::default(); PAD_COUNT],
            knobs: [Knob::default(); KNOB_COUNT],
        }
    }
}

fn check_value(
    value: u8,
    err: impl FnOnce(u8) -> ProgramError,
) -> std::result::Result<(), ProgramError> {
    if value > MAX_DATA_VALUE {
        Err(err(value))
    } else {
        Ok(())
    }
}

impl Program {
    /// Check every field against its allowed range
    pub fn validate(&self) -> std::result::Result<(), ProgramError> {
        if self.channel == 0 || self.channel > MAX_CHANNEL {
            return Err(ProgramError::Channel(self.channel));
        }
        for (i, pad) in self.pads.iter().enumerate() {
            let pad_err = |field: &'static str| {
                move |value| ProgramError::PadValue { pad: i + 1, field, value }
            };
            check_value(pad.note, pad_err("note"))?;
            check_value(pad.pc, pad_err("pc"))?;
            check_value(pad.cc, pad_err("cc"))?;
        }
        for (i, knob) in self.knobs.iter().enumerate() {
            let knob_err = |field: &'static str| {
                move |value| ProgramError::KnobValue { knob: i + 1, field, value }
            };
            check_value(knob.cc, knob_err("cc"))?;
            check_value(knob.min, knob_err("min"))?;
            check_value(knob.max, knob_err("max"))?;
            if knob.min > knob.max {
                return Err(ProgramError::KnobRange {
                    knob: i + 1,
                    min: knob.min,
                    max: knob.max,
                });
            }
        }
        Ok(())
    }

    /// Encode the program into its wire layout
    pub fn encode(&self) -> Result<[u8; PROGRAM_SIZE]> {
        self.validate()?;

        let mut buf = [0u8; PROGRAM_SIZE];
        buf[0] = self.channel - 1;

        let pads = buf[PADS_OFFSET..KNOBS_OFFSET].chunks_exact_mut(PAD_SIZE);
        for (chunk, pad) in pads.zip(&self.pads) {
            chunk.copy_from_slice(&[pad.note, pad.pc, pad.cc, pad.toggle as u8]);
        }

        let knobs = buf[KNOBS_OFFSET..].chunks_exact_mut(KNOB_SIZE);
        for (chunk, knob) in knobs.zip(&self.knobs) {
            chunk.copy_from_slice(&[knob.cc, knob.min, knob.max]);
        }

        Ok(buf)
    }

    /// Decode a program from its wire layout.
    ///
    /// The decoded program is validated; a device is not trusted to send sane data.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PROGRAM_SIZE {
            return Err(Error::WrongSize {
                expected: PROGRAM_SIZE,
                actual: bytes.len(),
            });
        }

        let mut program = Program {
            channel: bytes[0].saturating_add(1),
            ..Default::default()
        };

        let pads = bytes[PADS_OFFSET..KNOBS_OFFSET].chunks_exact(PAD_SIZE);
        for (pad, chunk) in program.pads.iter_mut().zip(pads) {
            *pad = Pad {
                note: chunk[0],
                pc: chunk[1],
                cc: chunk[2],
                toggle: chunk[3] != 0,
            };
        }

        let knobs = bytes[KNOBS_OFFSET..].chunks_exact(KNOB_SIZE);
        for (knob, chunk) in program.knobs.iter_mut().zip(knobs) {
            *knob = Knob {
                cc: chunk[0],
                min: chunk[1],
                max: chunk[2],
            };
        }

        program.validate()?;
        Ok(program)
    }
}
