// Note and phrase types
// Notes are beat-relative; a phrase carries the tempo that turns beats into seconds

use super::timeline::{BEATS_PER_BAR, Tempo};
use crate::error::{Result, TrainerError};

/// Longest phrase accepted, in bars
pub const MAX_BAR_COUNT: u32 = 64;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A musical note. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pitch: u8,
    /// Start in beats
    start: f64,
    /// Duration in beats
    duration: f64,
    velocity: u8,
}

impl Note {
    pub fn new(pitch: u8, start: f64, duration: f64, velocity: u8) -> Result<Self> {
        if pitch > 127 {
            return Err(TrainerError::InvalidNote(format!("pitch {} outside 0-127", pitch)));
        }
        if velocity > 127 {
            return Err(TrainerError::InvalidNote(format!(
                "velocity {} outside 0-127",
                velocity
            )));
        }
        if !start.is_finite() || start < 0.0 {
            return Err(TrainerError::InvalidNote(format!("start {} must be >= 0", start)));
        }
        if !duration.is_finite() || duration < 0.0 {
            return Err(TrainerError::InvalidNote(format!(
                "duration {} must be >= 0",
                duration
            )));
        }
        Ok(Self {
            pitch,
            start,
            duration,
            velocity,
        })
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Note name with octave (e.g. "C4", "A#5")
    pub fn note_name(&self) -> String {
        note_name(self.pitch)
    }
}

/// MIDI pitch to name, middle C = C4
pub fn note_name(pitch: u8) -> String {
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}

/// Phrase metadata
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseMetadata {
    /// Beats per minute
    pub tempo: f64,
    pub bar_count: u32,
    pub style: String,
    /// 1 (easiest) to 5
    pub difficulty: u8,
}

impl Default for PhraseMetadata {
    fn default() -> Self {
        Self {
            tempo: 120.0,
            bar_count: 2,
            style: "modal_jazz".to_string(),
            difficulty: 2,
        }
    }
}

/// Ordered, immutable musical passage
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    notes: Vec<Note>,
    metadata: PhraseMetadata,
}

impl Phrase {
    /// Build a phrase; notes are sorted by start time, ties by ascending pitch.
    /// An empty note list is allowed here and rejected at scheduling time.
    pub fn new(mut notes: Vec<Note>, metadata: PhraseMetadata) -> Result<Self> {
        Tempo::new(metadata.tempo)?;
        if !(1..=MAX_BAR_COUNT).contains(&metadata.bar_count) {
            return Err(TrainerError::InvalidPhrase(format!(
                "bar count {} outside 1-{}",
                metadata.bar_count, MAX_BAR_COUNT
            )));
        }
        if !(1..=5).contains(&metadata.difficulty) {
            return Err(TrainerError::InvalidPhrase(format!(
                "difficulty {} outside 1-5",
                metadata.difficulty
            )));
        }

        sort_notes(&mut notes);
        Ok(Self { notes, metadata })
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn metadata(&self) -> &PhraseMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Length in beats: the bar grid, extended if a note rings past it
    pub fn duration_beats(&self) -> f64 {
        let grid = f64::from(self.metadata.bar_count) * f64::from(BEATS_PER_BAR);
        self.notes.iter().map(Note::end).fold(grid, f64::max)
    }

    pub fn duration_seconds(&self, tempo: &Tempo) -> f64 {
        tempo.beats_to_seconds(self.duration_beats())
    }
}

/// Notes captured during one response window, beat-relative at the target tempo
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPhrase {
    notes: Vec<Note>,
    tempo: f64,
    window_start: f64,
    window_end: f64,
    truncated: usize,
}

impl RecordedPhrase {
    pub(crate) fn new(
        mut notes: Vec<Note>,
        tempo: f64,
        window_start: f64,
        window_end: f64,
        truncated: usize,
    ) -> Self {
        sort_notes(&mut notes);
        Self {
            notes,
            tempo,
            window_start,
            window_end,
            truncated,
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Target tempo the beats were scaled with
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Clock time of the first note-on
    pub fn window_start(&self) -> f64 {
        self.window_start
    }

    pub fn window_end(&self) -> f64 {
        self.window_end
    }

    /// Notes still held at window close and cut at the window end
    pub fn truncated_count(&self) -> usize {
        self.truncated
    }

    pub fn window_seconds(&self) -> f64 {
        (self.window_end - self.window_start).max(0.0)
    }
}

fn sort_notes(notes: &mut [Note]) {
    notes.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.pitch.cmp(&b.pitch)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, start: f64) -> Note {
        Note::new(pitch, start, 1.0, 100).unwrap()
    }

    #[test]
    fn test_note_validation() {
        assert!(Note::new(60, 0.0, 1.0, 100).is_ok());
        assert!(Note::new(60, 0.0, 0.0, 100).is_ok());
        assert!(matches!(Note::new(128, 0.0, 1.0, 100), Err(TrainerError::InvalidNote(_))));
        assert!(Note::new(60, 0.0, 1.0, 200).is_err());
        assert!(Note::new(60, -0.5, 1.0, 100).is_err());
        assert!(Note::new(60, 0.0, -1.0, 100).is_err());
        assert!(Note::new(60, f64::NAN, 1.0, 100).is_err());
    }

    #[test]
    fn test_note_name() {
        assert_eq!(note(60, 0.0).note_name(), "C4");
        assert_eq!(note(69, 0.0).note_name(), "A4");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(127), "G9");
    }

    #[test]
    fn test_phrase_sorting_ties_by_pitch() {
        let phrase = Phrase::new(
            vec![note(67, 1.0), note(64, 0.0), note(60, 1.0), note(55, 0.0)],
            PhraseMetadata::default(),
        )
        .unwrap();

        let order: Vec<(f64, u8)> = phrase.notes().iter().map(|n| (n.start(), n.pitch())).collect();
        assert_eq!(order, vec![(0.0, 55), (0.0, 64), (1.0, 60), (1.0, 67)]);
    }

    #[test]
    fn test_phrase_metadata_validation() {
        let mut metadata = PhraseMetadata::default();
        metadata.tempo = 0.0;
        assert!(matches!(Phrase::new(vec![], metadata), Err(TrainerError::InvalidTempo(_))));

        let mut metadata = PhraseMetadata::default();
        metadata.difficulty = 6;
        assert!(matches!(Phrase::new(vec![], metadata), Err(TrainerError::InvalidPhrase(_))));

        let mut metadata = PhraseMetadata::default();
        metadata.bar_count = 0;
        assert!(Phrase::new(vec![], metadata).is_err());
    }

    #[test]
    fn test_phrase_bar_count_upper_bound() {
        let mut metadata = PhraseMetadata::default();
        metadata.bar_count = u32::MAX;
        assert!(matches!(
            Phrase::new(vec![note(60, 0.0)], metadata.clone()),
            Err(TrainerError::InvalidPhrase(_))
        ));

        metadata.bar_count = MAX_BAR_COUNT;
        let longest = Phrase::new(vec![note(60, 0.0)], metadata).unwrap();
        assert_eq!(longest.duration_beats(), f64::from(MAX_BAR_COUNT) * 4.0);
    }

    #[test]
    fn test_phrase_duration() {
        let metadata = PhraseMetadata {
            tempo: 100.0,
            bar_count: 1,
            ..PhraseMetadata::default()
        };
        let phrase = Phrase::new(
            (0..4).map(|i| note(60 + i, i as f64)).collect(),
            metadata.clone(),
        )
        .unwrap();
        assert_eq!(phrase.duration_beats(), 4.0);
        let tempo = Tempo::new(100.0).unwrap();
        assert!((phrase.duration_seconds(&tempo) - 2.4).abs() < 1e-12);

        // A note ringing past the bar extends the phrase
        let long = Phrase::new(vec![Note::new(60, 3.0, 2.5, 90).unwrap()], metadata).unwrap();
        assert_eq!(long.duration_beats(), 5.5);
    }

    #[test]
    fn test_recorded_phrase_sorted() {
        let recorded = RecordedPhrase::new(vec![note(64, 1.0), note(60, 0.0)], 120.0, 5.0, 7.0, 0);
        assert_eq!(recorded.notes()[0].pitch(), 60);
        assert_eq!(recorded.window_seconds(), 2.0);
        assert_eq!(recorded.tempo(), 120.0);
    }
}
