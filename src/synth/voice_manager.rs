// Voice Manager - Polyphony handling
//
// Fixed pool allocated up front; nothing here allocates after construction.
// The cap limits *held* voices: when a new note would exceed it, the oldest
// held voice is force-released with a short fade instead of being cut.

use super::envelope::AdsrParams;
use super::oscillator::WaveformType;
use super::voice::Voice;
use crate::config::MAX_POLYPHONY;

/// Pool size: room for a full set of held voices plus their release tails
pub const POOL_SIZE: usize = MAX_POLYPHONY * 2;

/// Mix headroom applied to the voice sum before soft clipping
const MIX_GAIN: f32 = 0.25;

pub struct VoiceManager {
    voices: [Voice; POOL_SIZE],
    polyphony: usize,
    /// Fade length for force-released voices, in samples
    steal_fade_samples: f32,
    /// Incremented on each note_on for stealing priority
    age_counter: u64,
    forced_releases: u64,
}

impl VoiceManager {
    pub fn new(
        sample_rate: f32,
        polyphony: usize,
        waveform: WaveformType,
        adsr: AdsrParams,
        steal_fade_samples: usize,
    ) -> Self {
        Self {
            voices: std::array::from_fn(|_| Voice::new(sample_rate, waveform, adsr)),
            polyphony: polyphony.clamp(1, MAX_POLYPHONY),
            steal_fade_samples: steal_fade_samples.max(1) as f32,
            age_counter: 0,
            forced_releases: 0,
        }
    }

    pub fn polyphony(&self) -> usize {
        self.polyphony
    }

    /// Fade length for voices force-released from now on
    #[inline]
    pub fn set_steal_fade(&mut self, samples: usize) {
        self.steal_fade_samples = samples.max(1) as f32;
    }

    /// Start a voice. `release_beat` is the transport beat at which it lets go.
    pub fn note_on(&mut self, pitch: u8, velocity: u8, trigger_beat: f64, release_beat: Option<f64>) {
        self.age_counter = self.age_counter.wrapping_add(1);

        if self.held_voice_count() >= self.polyphony {
            if let Some(oldest) = self.oldest_held() {
                self.voices[oldest].force_release(self.steal_fade_samples);
                self.forced_releases += 1;
            }
        }

        let index = match self.voices.iter().position(|v| !v.is_active()) {
            Some(free) => free,
            None => self.find_voice_to_steal(),
        };
        self.voices[index].start(pitch, velocity, self.age_counter, trigger_beat, release_beat);
    }

    fn oldest_held(&self) -> Option<usize> {
        self.voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_held())
            .min_by_key(|(_, v)| v.age())
            .map(|(i, _)| i)
    }

    /// Fallback when every slot is sounding: prefer a releasing voice, then the oldest
    fn find_voice_to_steal(&self) -> usize {
        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| (!v.is_releasing(), v.age()))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Release held voices whose scheduled duration ended at `beat`
    #[inline]
    pub fn release_due(&mut self, beat: f64) {
        for voice in self.voices.iter_mut() {
            if voice.release_due(beat) {
                voice.release();
            }
        }
    }

    /// Release every held voice with its normal release time
    pub fn release_all(&mut self) {
        for voice in self.voices.iter_mut() {
            if voice.is_held() {
                voice.release();
            }
        }
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        self.voices.iter_mut().map(|v| v.next_sample()).sum::<f32>() * MIX_GAIN
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    pub fn held_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_held()).count()
    }

    pub fn is_held(&self, pitch: u8) -> bool {
        self.voices.iter().any(|v| v.is_held() && v.pitch() == pitch)
    }

    pub fn is_sounding(&self, pitch: u8) -> bool {
        self.voices.iter().any(|v| v.is_active() && v.pitch() == pitch)
    }

    /// Total voices force-released by the polyphony cap
    pub fn forced_releases(&self) -> u64 {
        self.forced_releases
    }
}
