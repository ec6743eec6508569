// MIDI event types
//
// `MidiEvent` is the parsed wire message; `RawMidiEvent` is what travels on the
// note event queue once the capture callback has stamped it with clock time.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    /// `channel` is 0-based (0-15)
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
}

impl MidiEvent {
    /// Parse a raw MIDI message. Only note messages are kept; everything else
    /// (CC, pitch bend, sysex, clock) returns `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 3 {
            return None;
        }

        let status = bytes[0];
        let channel = status & 0x0F;
        let note = bytes[1] & 0x7F;
        let velocity = bytes[2] & 0x7F;

        match status & 0xF0 {
            0x90 => {
                // Velocity 0 = Note Off
                if velocity == 0 {
                    Some(MidiEvent::NoteOff { channel, note })
                } else {
                    Some(MidiEvent::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            0x80 => Some(MidiEvent::NoteOff { channel, note }),
            _ => None,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. } | MidiEvent::NoteOff { channel, .. } => channel,
        }
    }
}

/// Timestamped note event. Produced once by the capture callback, consumed once
/// by the session control context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMidiEvent {
    pub pitch: u8,
    pub velocity: u8,
    pub is_note_on: bool,
    /// Clock time in seconds
    pub timestamp: f64,
}

impl RawMidiEvent {
    pub fn note_on(pitch: u8, velocity: u8, timestamp: f64) -> Self {
        Self {
            pitch,
            velocity,
            is_note_on: true,
            timestamp,
        }
    }

    pub fn note_off(pitch: u8, timestamp: f64) -> Self {
        Self {
            pitch,
            velocity: 0,
            is_note_on: false,
            timestamp,
        }
    }

    pub fn from_event(event: MidiEvent, timestamp: f64) -> Self {
        match event {
            MidiEvent::NoteOn { note, velocity, .. } => Self::note_on(note, velocity, timestamp),
            MidiEvent::NoteOff { note, .. } => Self::note_off(note, timestamp),
        }
    }
}
