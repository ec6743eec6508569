// ADSR Envelope implementation
//
// Attack-Decay-Sustain-Release generator shaping each voice's amplitude.
// Sample-count based; no allocation, safe to run in the audio callback.

use serde::{Deserialize, Serialize};

/// ADSR Envelope parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdsrParams {
    /// Attack time in seconds (0.001 to 5.0)
    pub attack: f32,
    /// Decay time in seconds (0.001 to 5.0)
    pub decay: f32,
    /// Sustain level (0.0 to 1.0)
    pub sustain: f32,
    /// Release time in seconds (0.001 to 5.0)
    pub release: f32,
}

impl AdsrParams {
    /// Create ADSR parameters, clamped to the supported ranges
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.clamp(0.001, 5.0),
            decay: decay.clamp(0.001, 5.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.clamp(0.001, 5.0),
        }
    }
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

/// Envelope phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopePhase {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

pub struct AdsrEnvelope {
    params: AdsrParams,
    phase: EnvelopePhase,
    current_value: f32,

    attack_samples: f32,
    decay_samples: f32,
    release_samples: f32,

    /// Samples spent in the current phase
    phase_position: f32,
    /// Level and length of the running release ramp
    release_from: f32,
    release_length: f32,
}

impl AdsrEnvelope {
    pub fn new(params: AdsrParams, sample_rate: f32) -> Self {
        Self {
            params,
            phase: EnvelopePhase::Idle,
            current_value: 0.0,
            attack_samples: params.attack * sample_rate,
            decay_samples: params.decay * sample_rate,
            release_samples: params.release * sample_rate,
            phase_position: 0.0,
            release_from: 0.0,
            release_length: 0.0,
        }
    }

    pub fn params(&self) -> AdsrParams {
        self.params
    }

    pub fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    /// Start the attack phase from silence
    pub fn note_on(&mut self) {
        self.phase = EnvelopePhase::Attack;
        self.phase_position = 0.0;
        self.current_value = 0.0;
    }

    /// Start the release phase from the current level
    pub fn note_off(&mut self) {
        self.begin_release(self.release_samples);
    }

    /// Release within at most `max_samples` (voice stealing). A release already
    /// running is shortened, never lengthened.
    pub fn force_release(&mut self, max_samples: f32) {
        let max_samples = max_samples.max(1.0);
        if self.phase == EnvelopePhase::Release {
            let remaining = self.release_length - self.phase_position;
            if remaining > max_samples {
                self.release_from = self.current_value;
                self.release_length = max_samples;
                self.phase_position = 0.0;
            }
            return;
        }
        self.begin_release(self.release_samples.min(max_samples));
    }

    fn begin_release(&mut self, length: f32) {
        if matches!(self.phase, EnvelopePhase::Idle | EnvelopePhase::Release) {
            return;
        }
        self.phase = EnvelopePhase::Release;
        self.phase_position = 0.0;
        self.release_from = self.current_value;
        self.release_length = length;
    }

    /// Advance one sample and return the envelope level (0.0 to 1.0)
    #[inline]
    pub fn process(&mut self) -> f32 {
        match self.phase {
            EnvelopePhase::Idle => {
                self.current_value = 0.0;
            }

            EnvelopePhase::Attack => {
                if self.attack_samples > 0.0 {
                    self.current_value = (self.phase_position / self.attack_samples).min(1.0);
                    self.phase_position += 1.0;
                    if self.phase_position >= self.attack_samples {
                        self.phase = EnvelopePhase::Decay;
                        self.phase_position = 0.0;
                        self.current_value = 1.0;
                    }
                } else {
                    self.current_value = 1.0;
                    self.phase = EnvelopePhase::Decay;
                    self.phase_position = 0.0;
                }
            }

            EnvelopePhase::Decay => {
                if self.decay_samples > 0.0 {
                    let progress = self.phase_position / self.decay_samples;
                    self.current_value =
                        (1.0 - progress * (1.0 - self.params.sustain)).max(self.params.sustain);
                    self.phase_position += 1.0;
                    if self.phase_position >= self.decay_samples {
                        self.phase = EnvelopePhase::Sustain;
                        self.current_value = self.params.sustain;
                    }
                } else {
                    self.current_value = self.params.sustain;
                    self.phase = EnvelopePhase::Sustain;
                }
            }

            EnvelopePhase::Sustain => {
                self.current_value = self.params.sustain;
            }

            EnvelopePhase::Release => {
                if self.release_length > 0.0 {
                    let progress = self.phase_position / self.release_length;
                    self.current_value = (self.release_from * (1.0 - progress)).max(0.0);
                    self.phase_position += 1.0;
                    if self.phase_position >= self.release_length {
                        self.phase = EnvelopePhase::Idle;
                        self.current_value = 0.0;
                    }
                } else {
                    self.current_value = 0.0;
                    self.phase = EnvelopePhase::Idle;
                }
            }
        }

        self.current_value
    }

    pub fn is_active(&self) -> bool {
        self.phase != EnvelopePhase::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.phase == EnvelopePhase::Release
    }

    pub fn current_value(&self) -> f32 {
        self.current_value
    }

    pub fn reset(&mut self) {
        self.phase = EnvelopePhase::Idle;
        self.current_value = 0.0;
        self.phase_position = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SAMPLE_RATE: f32 = 48000.0;

    #[test]
    fn test_adsr_params_default() {
        let params = AdsrParams::default();
        assert_eq!(params.attack, 0.01);
        assert_eq!(params.decay, 0.1);
        assert_eq!(params.sustain, 0.7);
        assert_eq!(params.release, 0.3);
    }

    #[test]
    fn test_adsr_params_clamping() {
        let params = AdsrParams::new(-1.0, 10.0, 1.5, 0.0001);
        assert_eq!(params.attack, 0.001);
        assert_eq!(params.decay, 5.0);
        assert_eq!(params.sustain, 1.0);
        assert_eq!(params.release, 0.001);
    }

    #[test]
    fn test_full_cycle() {
        let mut env = AdsrEnvelope::new(AdsrParams::default(), TEST_SAMPLE_RATE);
        assert!(!env.is_active());

        env.note_on();
        assert_eq!(env.phase(), EnvelopePhase::Attack);

        // Attack (480) + decay (4800) samples
        for _ in 0..6000 {
            env.process();
        }
        assert_eq!(env.phase(), EnvelopePhase::Sustain);
        assert!((env.current_value() - 0.7).abs() < 1e-6);

        env.note_off();
        assert!(env.is_releasing());
        // Release is 0.3 s = 14400 samples
        for _ in 0..14_401 {
            env.process();
        }
        assert!(!env.is_active());
        assert_eq!(env.current_value(), 0.0);
    }

    #[test]
    fn test_release_is_linear_from_release_level() {
        let mut env = AdsrEnvelope::new(AdsrParams::new(0.001, 0.001, 0.5, 0.01), 1000.0);
        env.note_on();
        for _ in 0..10 {
            env.process();
        }
        env.note_off();
        // 10 samples of release from 0.5
        let first = env.process();
        let second = env.process();
        assert!((first - 0.5).abs() < 1e-6);
        assert!((second - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_force_release_finishes_within_bound() {
        let mut env = AdsrEnvelope::new(AdsrParams::default(), TEST_SAMPLE_RATE);
        env.note_on();
        for _ in 0..6000 {
            env.process();
        }

        env.force_release(256.0);
        let mut previous = env.current_value();
        for _ in 0..256 {
            let value = env.process();
            // Monotonic ramp, small steps
            assert!(value <= previous + 1e-6);
            assert!(previous - value < 0.01);
            previous = value;
        }
        assert!(!env.is_active());
    }

    #[test]
    fn test_force_release_shortens_running_release() {
        let mut env = AdsrEnvelope::new(AdsrParams::default(), TEST_SAMPLE_RATE);
        env.note_on();
        for _ in 0..6000 {
            env.process();
        }
        env.note_off();
        env.process();
        env.force_release(64.0);
        for _ in 0..64 {
            env.process();
        }
        assert!(!env.is_active());
    }

    #[test]
    fn test_note_off_when_idle_is_ignored() {
        let mut env = AdsrEnvelope::new(AdsrParams::default(), TEST_SAMPLE_RATE);
        env.note_off();
        assert!(!env.is_active());
        assert_eq!(env.process(), 0.0);
    }
}
