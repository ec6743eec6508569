// Oscillator - Naive (non band-limited) waveforms for the call voices

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveformType {
    Sine,
    Square,
    Saw,
    Triangle,
}

impl WaveformType {
    /// Value at normalized `phase` in [0, 1)
    #[inline]
    pub fn at(self, phase: f32) -> f32 {
        match self {
            WaveformType::Sine => (phase * TAU).sin(),
            WaveformType::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            WaveformType::Saw => 2.0 * phase - 1.0,
            WaveformType::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

/// Equal-tempered frequency of a MIDI pitch (A4 = 69 = 440 Hz)
#[inline]
pub fn pitch_to_frequency(pitch: u8) -> f32 {
    440.0 * 2_f32.powf((pitch as f32 - 69.0) / 12.0)
}

pub struct PhaseOscillator {
    waveform: WaveformType,
    phase: f32,
    step: f32,
    sample_rate: f32,
}

impl PhaseOscillator {
    pub fn new(waveform: WaveformType, sample_rate: f32) -> Self {
        Self {
            waveform,
            phase: 0.0,
            step: 0.0,
            sample_rate: sample_rate.max(1.0),
        }
    }

    /// Retune to `pitch` and restart the cycle
    pub fn tune(&mut self, pitch: u8) {
        // Above Nyquist the step is clamped; the voice just aliases
        self.step = (pitch_to_frequency(pitch) / self.sample_rate).min(0.5);
        self.phase = 0.0;
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let sample = self.waveform.at(self.phase);
        self.phase = (self.phase + self.step).fract();
        sample
    }
}
