//! midir transport for the LPD8
//!
//! Opens the input and output ports of the device, forwards inbound SysEx
//! to a [`FrameSink`] and sends outbound frames.

use anyhow::{anyhow, Context, Result};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::connection::{FrameSink, Transport};
use crate::error::TransportError;

const CLIENT_NAME: &str = "LPD8-Tool";

/// An open MIDI input/output port pair
pub struct MidiTransport {
    input_conn: Mutex<Option<MidiInputConnection<()>>>,
    output_conn: Mutex<Option<MidiOutputConnection>>,
    port_name: String,
}

impl MidiTransport {
    /// Open the device whose port name contains `device` (case-insensitive).
    ///
    /// An empty name selects the first input port. The output port must have
    /// exactly the same name as the input port.
    pub fn open(device: &str, sink: FrameSink) -> Result<Self> {
        let mut midi_in = MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input")?;
        // SysEx is ignored by default.
        midi_in.ignore(Ignore::None);
        let midi_out = MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output")?;

        let (in_port, port_name) = find_input_port(&midi_in, device)?;
        let out_port = find_output_port(&midi_out, &port_name)?;

        info!("MIDI input: {}", port_name);
        info!("MIDI output: {}", port_name);

        let input_conn = midi_in
            .connect(
                &in_port,
                "lpd8-in",
                move |_timestamp, data, _| sink.push(data),
                (),
            )
            .map_err(|e| anyhow!("Can't open MIDI input: {}", e))?;

        // Dropping `input_conn` on error closes the input again.
        let output_conn = midi_out
            .connect(&out_port, "lpd8-out")
            .map_err(|e| anyhow!("Can't open MIDI output: {}", e))?;

        Ok(Self {
            input_conn: Mutex::new(Some(input_conn)),
            output_conn: Mutex::new(Some(output_conn)),
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Transport for MidiTransport {
    fn send(&self, msg: &[u8]) -> std::result::Result<(), TransportError> {
        let mut output = self.output_conn.lock();
        let conn = output
            .as_mut()
            .ok_or_else(|| TransportError::new("MIDI output is closed"))?;
        conn.send(msg)
            .map_err(|e| TransportError::with_source("Failed to send MIDI message", e))
    }

    fn close(&self) {
        if let Some(conn) = self.input_conn.lock().take() {
            conn.close();
        }
        if let Some(conn) = self.output_conn.lock().take() {
            conn.close();
        }
        debug!("MIDI ports closed: {}", self.port_name);
    }
}

fn find_input_port(midi_in: &MidiInput, device: &str) -> Result<(midir::MidiInputPort, String)> {
    let ports = midi_in.ports();
    if ports.is_empty() {
        return Err(anyhow!("No MIDI inputs"));
    }

    let pattern = device.to_lowercase();
    let mut names = Vec::new();
    for port in ports {
        let Ok(name) = midi_in.port_name(&port) else {
            continue;
        };
        if name.to_lowercase().contains(&pattern) {
            debug!("Found input port '{}' matching '{}'", name, device);
            return Ok((port, name));
        }
        names.push(name);
    }
    Err(anyhow!(
        "Can't find MIDI input device '{}', have {:?}",
        device,
        names
    ))
}

fn find_output_port(midi_out: &MidiOutput, name: &str) -> Result<midir::MidiOutputPort> {
    let mut names = Vec::new();
    for port in midi_out.ports() {
        let Ok(port_name) = midi_out.port_name(&port) else {
            continue;
        };
        if port_name == name {
            return Ok(port);
        }
        names.push(port_name);
    }
    Err(anyhow!(
        "Can't find MIDI output device '{}', have {:?}",
        name,
        names
    ))
}

/// Port discovery utilities
pub mod discovery {
    use super::*;

    /// List available MIDI input port names
    pub fn list_input_ports() -> Result<Vec<String>> {
        let midi_in = MidiInput::new("LPD8-Tool-Scanner")?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }

    /// List available MIDI output port names
    pub fn list_output_ports() -> Result<Vec<String>> {
        let midi_out = MidiOutput::new("LPD8-Tool-Scanner")?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::inbound_queue;

    #[test]
    fn test_port_discovery() {
        // Only checks that discovery doesn't panic; CI machines may have no MIDI backend.
        let _ = discovery::list_input_ports();
        let _ = discovery::list_output_ports();
    }

    #[test]
    fn test_open_unknown_device_fails() {
        let (sink, _queue) = inbound_queue(1);
        let res = MidiTransport::open("no-such-device-4f2a9c", sink);
        assert!(res.is_err());
    }
}
