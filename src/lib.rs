//! Akai LPD8 program editor library
//!
//! Reads and writes LPD8 programs over the device's SysEx channel.
//!
//! - [`frame`]: SysEx envelope
//! - [`program`]: program data and its 57-byte layout
//! - [`message`]: the device's four messages
//! - [`connection`]: request/response over an asynchronous inbound stream
//! - [`device`]: midir transport

pub mod backup;
pub mod commands;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod frame;
pub mod message;
pub mod program;

pub use connection::{inbound_queue, Connection, FrameQueue, FrameSink, Transport};
pub use error::{Error, ProgramError, Result, TransportError};
pub use message::ProgramIndex;
pub use program::{Knob, Pad, Program};
