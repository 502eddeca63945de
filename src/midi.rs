// src/midi.rs

use crate::action::Dispatcher;
use crate::settings::BindingTrigger;
use anyhow::{Context, Result};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiInputPort};
use std::sync::{Arc, Mutex};

const APP_NAME: &str = "looprack";

pub fn get_midi_ports() -> Result<Vec<(String, MidiInputPort)>> {
    let midi_in = MidiInput::new(APP_NAME)?;
    let ports = midi_in.ports();
    let mut result = Vec::with_capacity(ports.len());
    for port in ports.iter() {
        let name = midi_in.port_name(port)?;
        result.push((name, port.clone()));
    }
    Ok(result)
}

/// Decodes a note message on `channel` into `(note, down)`. Note-on with
/// velocity 0 counts as a release.
pub fn parse_note(message: &[u8], channel: u8) -> Option<(u8, bool)> {
    if message.len() < 3 || message[0] & 0x0F != channel {
        return None;
    }
    let note = message[1];
    let velocity = message[2];
    match message[0] & 0xF0 {
        0x90 => Some((note, velocity > 0)),
        0x80 => Some((note, false)),
        _ => None,
    }
}

/// Opens the named port (or the first one) and routes note events through
/// the dispatcher's bindings.
pub fn connect(port_name: Option<&str>, channel: u8, dispatcher: Arc<Mutex<Dispatcher>>) -> Result<MidiInputConnection<()>> {
    let mut midi_in = MidiInput::new(APP_NAME)?;
    midi_in.ignore(Ignore::All);

    let ports = midi_in.ports();
    let port = match port_name {
        Some(wanted) => ports
            .iter()
            .find(|p| midi_in.port_name(p).map_or(false, |n| n.contains(wanted)))
            .with_context(|| format!("MIDI port not found: {wanted}"))?,
        None => ports.first().context("No MIDI input ports")?,
    }
    .clone();
    let in_port_name = midi_in.port_name(&port)?;
    log::info!("Opening MIDI connection to: {} (channel {})", in_port_name, channel + 1);

    let connection = midi_in
        .connect(
            &port,
            &format!("{APP_NAME}-in"),
            move |_stamp, message, _| {
                let Some((note, down)) = parse_note(message, channel) else {
                    return;
                };
                match dispatcher.lock() {
                    Ok(mut dispatcher) => {
                        if dispatcher.handle(BindingTrigger::MidiNote(note), down).is_none() {
                            log::trace!("Unbound MIDI note {note}");
                        }
                    }
                    Err(_) => log::error!("Dispatcher lock poisoned, MIDI note {note} ignored"),
                }
            },
            (),
        )
        .map_err(|e| anyhow::anyhow!("Failed to connect to MIDI port {}: {}", in_port_name, e))?;
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_and_off() {
        assert_eq!(parse_note(&[0x90, 60, 100], 0), Some((60, true)));
        assert_eq!(parse_note(&[0x80, 60, 64], 0), Some((60, false)));
        assert_eq!(parse_note(&[0x90, 60, 0], 0), Some((60, false)));
    }

    #[test]
    fn other_channels_and_messages_are_ignored() {
        assert_eq!(parse_note(&[0x91, 60, 100], 0), None);
        assert_eq!(parse_note(&[0x93, 61, 100], 3), Some((61, true)));
        assert_eq!(parse_note(&[0xB0, 7, 100], 0), None);
        assert_eq!(parse_note(&[0x90, 60], 0), None);
    }
}
