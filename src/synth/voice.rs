// Voice - One sounding call note

use super::envelope::{AdsrEnvelope, AdsrParams, EnvelopePhase};
use super::oscillator::{PhaseOscillator, WaveformType};

pub struct Voice {
    oscillator: PhaseOscillator,
    envelope: AdsrEnvelope,
    pitch: u8,
    velocity: f32,
    /// Start order for stealing priority (higher = newer)
    age: u64,
    trigger_beat: f64,
    /// Transport beat at which the held note lets go; `None` = until told
    release_beat: Option<f64>,
}

impl Voice {
    pub fn new(sample_rate: f32, waveform: WaveformType, adsr: AdsrParams) -> Self {
        Self {
            oscillator: PhaseOscillator::new(waveform, sample_rate),
            envelope: AdsrEnvelope::new(adsr, sample_rate),
            pitch: 0,
            velocity: 0.0,
            age: 0,
            trigger_beat: 0.0,
            release_beat: None,
        }
    }

    pub fn start(
        &mut self,
        pitch: u8,
        velocity: u8,
        age: u64,
        trigger_beat: f64,
        release_beat: Option<f64>,
    ) {
        self.pitch = pitch;
        self.velocity = velocity.min(127) as f32 / 127.0;
        self.age = age;
        self.trigger_beat = trigger_beat;
        self.release_beat = release_beat;

        self.oscillator.tune(pitch);
        self.envelope.note_on();
    }

    /// Normal release with the configured release time
    pub fn release(&mut self) {
        self.release_beat = None;
        self.envelope.note_off();
    }

    /// Fade out within `max_samples` (voice stealing)
    pub fn force_release(&mut self, max_samples: f32) {
        self.release_beat = None;
        self.envelope.force_release(max_samples);
    }

    /// Held note whose scheduled duration has elapsed at `beat`
    #[inline]
    pub fn release_due(&self, beat: f64) -> bool {
        self.is_held() && self.release_beat.is_some_and(|at| beat >= at)
    }

    /// Sounding, including the release tail
    pub fn is_active(&self) -> bool {
        self.envelope.is_active()
    }

    /// Sounding and not yet released
    pub fn is_held(&self) -> bool {
        self.envelope.is_active() && !self.envelope.is_releasing()
    }

    pub fn is_releasing(&self) -> bool {
        self.envelope.is_releasing()
    }

    pub fn phase(&self) -> EnvelopePhase {
        self.envelope.phase()
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn trigger_beat(&self) -> f64 {
        self.trigger_beat
    }

    pub fn silence(&mut self) {
        self.envelope.reset();
        self.release_beat = None;
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        if !self.envelope.is_active() {
            return 0.0;
        }
        let level = self.envelope.process();
        self.oscillator.next_sample() * self.velocity * level
    }
}
