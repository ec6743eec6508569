// Timeline - Musical time representation
// Conversion between beats, bars and wall-clock seconds

use crate::error::{Result, TrainerError};
use std::fmt;

/// Beats per bar (quarter notes); every phrase is in 4/4
pub const BEATS_PER_BAR: u32 = 4;

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo. Any finite BPM above zero is accepted.
    pub fn new(bpm: f64) -> Result<Self> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(TrainerError::InvalidTempo(bpm));
        }
        Ok(Self { bpm })
    }

    /// Creates a tempo that must also lie in `[min, max]`
    pub fn within(bpm: f64, min: f64, max: f64) -> Result<Self> {
        let tempo = Self::new(bpm)?;
        if bpm < min || bpm > max {
            return Err(TrainerError::InvalidTempo(bpm));
        }
        Ok(tempo)
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * 60.0 / self.bpm
    }

    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        seconds * self.bpm / 60.0
    }

    /// Duration of `bars` bars in seconds
    pub fn bars_to_seconds(&self, bars: u32) -> f64 {
        self.beats_to_seconds(f64::from(bars) * f64::from(BEATS_PER_BAR))
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_validation() {
        assert!(Tempo::new(120.0).is_ok());
        assert!(Tempo::new(0.5).is_ok());
        assert!(matches!(Tempo::new(0.0), Err(TrainerError::InvalidTempo(_))));
        assert!(matches!(Tempo::new(-60.0), Err(TrainerError::InvalidTempo(_))));
        assert!(Tempo::new(f64::NAN).is_err());
        assert!(Tempo::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_tempo_within_range() {
        assert!(Tempo::within(100.0, 60.0, 180.0).is_ok());
        assert!(Tempo::within(60.0, 60.0, 180.0).is_ok());
        assert!(Tempo::within(59.9, 60.0, 180.0).is_err());
        assert!(Tempo::within(200.0, 60.0, 180.0).is_err());
    }

    #[test]
    fn test_beat_conversions() {
        let tempo = Tempo::new(100.0).unwrap();
        assert!((tempo.beat_duration_seconds() - 0.6).abs() < 1e-12);
        assert!((tempo.beats_to_seconds(4.0) - 2.4).abs() < 1e-12);
        assert!((tempo.seconds_to_beats(2.4) - 4.0).abs() < 1e-12);
        assert!((tempo.bars_to_seconds(2) - 4.8).abs() < 1e-12);
        assert!(tempo.bars_to_seconds(u32::MAX).is_finite());
    }

    #[test]
    fn test_tempo_display() {
        assert_eq!(Tempo::default().to_string(), "120.0 BPM");
    }
}
