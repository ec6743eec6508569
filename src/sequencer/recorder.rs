// Recording assembler - Pairs captured note-on/note-off events into notes
//
// Runs in the session control context. One window at a time; the window is
// fixed-length and starts at the first note-on of the response.

use super::note::{Note, RecordedPhrase};
use super::timeline::Tempo;
use crate::error::{Result, TrainerError};
use crate::midi::event::RawMidiEvent;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy)]
struct OpenNote {
    velocity: u8,
    timestamp: f64,
}

#[derive(Debug)]
struct Window {
    start: f64,
    end: f64,
    tempo: Tempo,
    /// Note-ons awaiting their note-off, per pitch, in arrival order
    open: HashMap<u8, VecDeque<OpenNote>>,
    notes: Vec<Note>,
}

impl Window {
    /// Clock time to beats after the window start, at the target tempo
    fn beats_since_start(&self, timestamp: f64) -> f64 {
        self.tempo.seconds_to_beats((timestamp - self.start).max(0.0))
    }

    fn close_note(&self, pitch: u8, open: OpenNote, off_time: f64) -> Option<Note> {
        let start = self.beats_since_start(open.timestamp);
        let duration = self.tempo.seconds_to_beats((off_time - open.timestamp).max(0.0));
        match Note::new(pitch, start, duration, open.velocity) {
            Ok(note) => Some(note),
            Err(e) => {
                log::debug!("Dropping unrepresentable recorded note: {}", e);
                None
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingAssembler {
    window: Option<Window>,
}

impl RecordingAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a window `[start, start + length)`. Beats are computed at `tempo`
    /// (the target phrase's tempo) so the recording lines up with the target.
    pub fn begin_window(&mut self, start: f64, length: f64, tempo: Tempo) -> Result<()> {
        if self.window.is_some() {
            return Err(TrainerError::AlreadyRecording);
        }
        self.window = Some(Window {
            start,
            end: start + length.max(0.0),
            tempo,
            open: HashMap::new(),
            notes: Vec::new(),
        });
        log::debug!("Recording window armed at {:.3} s for {:.3} s", start, length);
        Ok(())
    }

    pub fn is_armed(&self) -> bool {
        self.window.is_some()
    }

    /// Window bounds `(start, end)` while armed
    pub fn window(&self) -> Option<(f64, f64)> {
        self.window.as_ref().map(|w| (w.start, w.end))
    }

    /// Completed notes so far
    pub fn note_count(&self) -> usize {
        self.window.as_ref().map_or(0, |w| w.notes.len())
    }

    /// Feed one captured event. Returns the note a note-off completed, if any.
    pub fn push(&mut self, event: RawMidiEvent) -> Option<Note> {
        let window = self.window.as_mut()?;
        if event.timestamp < window.start || event.timestamp >= window.end {
            return None;
        }

        if event.is_note_on {
            window
                .open
                .entry(event.pitch)
                .or_default()
                .push_back(OpenNote {
                    velocity: event.velocity,
                    timestamp: event.timestamp,
                });
            return None;
        }

        let Some(open) = window.open.get_mut(&event.pitch).and_then(VecDeque::pop_front) else {
            log::debug!("Note-off for pitch {} without a matching note-on", event.pitch);
            return None;
        };
        let note = window.close_note(event.pitch, open, event.timestamp)?;
        window.notes.push(note);
        Some(note)
    }

    /// Close the window at its fixed end. Notes still held are cut at the
    /// window end rather than discarded.
    pub fn end_window(&mut self) -> Result<RecordedPhrase> {
        let mut window = self.window.take().ok_or(TrainerError::NotRecording)?;

        let mut held: Vec<(u8, OpenNote)> = window
            .open
            .drain()
            .flat_map(|(pitch, queue)| queue.into_iter().map(move |open| (pitch, open)))
            .collect();
        held.sort_by(|a, b| a.1.timestamp.total_cmp(&b.1.timestamp).then(a.0.cmp(&b.0)));

        let mut truncated = 0;
        for (pitch, open) in held {
            if let Some(note) = window.close_note(pitch, open, window.end) {
                window.notes.push(note);
                truncated += 1;
            }
        }

        log::debug!(
            "Recording window closed: {} note(s), {} truncated",
            window.notes.len(),
            truncated
        );
        Ok(RecordedPhrase::new(
            window.notes,
            window.tempo.bpm(),
            window.start,
            window.end,
            truncated,
        ))
    }

    /// Drop the in-progress recording. Returns whether a window was armed.
    pub fn abort(&mut self) -> bool {
        self.window.take().is_some()
    }
}
