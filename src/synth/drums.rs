// Drums - Beat loop sample kit and playback
//
// Samples are rendered (or loaded) once at setup. The player only reads
// preallocated buffers, so it is safe inside the audio callback.

use crate::error::Result;
use crate::sequencer::beat_pattern::{BeatPattern, DrumSound, Genre};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;
use std::path::Path;

const KICK_SECONDS: f32 = 0.5;
const SNARE_SECONDS: f32 = 0.2;
const HIHAT_SECONDS: f32 = 0.1;

/// Fixed mix level of each drum relative to the beat volume
pub const KICK_LEVEL: f32 = 0.15;
pub const SNARE_LEVEL: f32 = 0.14;
pub const HIHAT_LEVEL: f32 = 0.08;

/// Simultaneous drum hits the player can sound
const MAX_PLAYBACKS: usize = 8;

const NOISE_SEED: u64 = 0x5EED_D2C5;

/// Mono one-shot buffers for the three kit pieces, peak-normalized
#[derive(Debug, Clone)]
pub struct DrumKit {
    kick: Vec<f32>,
    snare: Vec<f32>,
    hihat: Vec<f32>,
}

impl DrumKit {
    /// Synthesize the kit at `sample_rate`
    pub fn synthesized(sample_rate: f32) -> Self {
        let mut rng = StdRng::seed_from_u64(NOISE_SEED);
        Self {
            kick: normalize(synth_kick(sample_rate, &mut rng)),
            snare: normalize(synth_snare(sample_rate, &mut rng)),
            hihat: normalize(synth_hihat(sample_rate, &mut rng)),
        }
    }

    /// Load `kick.wav`, `snare.wav` and `hihat.wav` from `dir`; any missing
    /// file falls back to the synthesized sound.
    pub fn load_or_synthesize(dir: &Path, sample_rate: f32) -> Result<Self> {
        let mut kit = Self::synthesized(sample_rate);
        for (name, slot) in [
            ("kick.wav", &mut kit.kick),
            ("snare.wav", &mut kit.snare),
            ("hihat.wav", &mut kit.hihat),
        ] {
            let path = dir.join(name);
            if path.exists() {
                *slot = normalize(load_wav_mono(&path, sample_rate)?);
                log::info!("Loaded drum sample {}", path.display());
            } else {
                log::debug!("No {} in {}, using synthesized sound", name, dir.display());
            }
        }
        Ok(kit)
    }

    pub fn sample(&self, sound: DrumSound) -> &[f32] {
        match sound {
            DrumSound::Kick => &self.kick,
            DrumSound::Snare => &self.snare,
            DrumSound::Hihat => &self.hihat,
        }
    }
}

fn level(sound: DrumSound) -> f32 {
    match sound {
        DrumSound::Kick => KICK_LEVEL,
        DrumSound::Snare => SNARE_LEVEL,
        DrumSound::Hihat => HIHAT_LEVEL,
    }
}

fn sample_count(seconds: f32, sample_rate: f32) -> usize {
    (seconds * sample_rate).max(1.0) as usize
}

/// Sine swept 60 Hz down to 30 Hz with a short noise click on top
fn synth_kick(sample_rate: f32, rng: &mut StdRng) -> Vec<f32> {
    let n = sample_count(KICK_SECONDS, sample_rate);
    let mut phase = 0.0f32;
    (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate;
            let progress = i as f32 / n as f32;
            let freq = 60.0 - 30.0 * progress;
            phase += 2.0 * PI * freq / sample_rate;
            let body = phase.sin() * (-15.0 * t).exp();
            let click = rng.gen_range(-1.0f32..1.0) * (-100.0 * t).exp() * 0.3;
            body + click
        })
        .collect()
}

fn synth_snare(sample_rate: f32, rng: &mut StdRng) -> Vec<f32> {
    let n = sample_count(SNARE_SECONDS, sample_rate);
    (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate;
            let noise = rng.gen_range(-1.0f32..1.0);
            let tone = (2.0 * PI * 200.0 * t).sin() * 0.3 + (2.0 * PI * 8000.0 * t).sin() * 0.1;
            (noise + tone) * (-20.0 * t).exp()
        })
        .collect()
}

/// First difference of white noise tilts it towards the top end
fn synth_hihat(sample_rate: f32, rng: &mut StdRng) -> Vec<f32> {
    let n = sample_count(HIHAT_SECONDS, sample_rate);
    let mut previous = 0.0f32;
    (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate;
            let noise = rng.gen_range(-1.0f32..1.0);
            let bright = noise - previous;
            previous = noise;
            bright * (-80.0 * t).exp()
        })
        .collect()
}

fn normalize(mut samples: Vec<f32>) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
    samples
}

/// Read a WAV file as mono f32 at `target_rate` (channels averaged, linear resampling)
fn load_wav_mono(path: &Path, target_rate: f32) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<f32>, hound::Error>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, hound::Error>>()?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    let source_rate = spec.sample_rate as f32;
    if (source_rate - target_rate).abs() < f32::EPSILON || mono.len() < 2 {
        return Ok(mono);
    }
    Ok(resample_linear(&mono, source_rate, target_rate))
}

fn resample_linear(input: &[f32], source_rate: f32, target_rate: f32) -> Vec<f32> {
    let ratio = source_rate as f64 / target_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let index = pos.floor() as usize;
            let frac = (pos - index as f64) as f32;
            let a = input[index.min(input.len() - 1)];
            let b = input[(index + 1).min(input.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct DrumPlayback {
    sound: DrumSound,
    position: usize,
}

/// Background beat loop driven by transport beats
pub struct BeatLoopPlayer {
    kit: DrumKit,
    pattern: Option<BeatPattern>,
    playbacks: [Option<DrumPlayback>; MAX_PLAYBACKS],
    volume: f32,
}

impl BeatLoopPlayer {
    pub fn new(kit: DrumKit, volume: f32) -> Self {
        Self {
            kit,
            pattern: None,
            playbacks: [None; MAX_PLAYBACKS],
            volume: volume.clamp(0.0, 2.0),
        }
    }

    pub fn start(&mut self, genre: Genre) {
        self.pattern = Some(genre.pattern());
    }

    /// Stop scheduling new hits; hits already sounding ring out
    pub fn stop(&mut self) {
        self.pattern = None;
    }

    pub fn is_playing(&self) -> bool {
        self.pattern.is_some()
    }

    pub fn genre(&self) -> Option<Genre> {
        self.pattern.map(|p| p.genre())
    }

    fn trigger(&mut self, sound: DrumSound) {
        let hit = DrumPlayback { sound, position: 0 };
        if let Some(slot) = self.playbacks.iter_mut().find(|p| p.is_none()) {
            *slot = Some(hit);
            return;
        }
        // All slots busy: replace the hit closest to finishing
        let mut victim = 0;
        let mut furthest = 0;
        for (i, playback) in self.playbacks.iter().enumerate() {
            if let Some(p) = playback {
                if p.position >= furthest {
                    furthest = p.position;
                    victim = i;
                }
            }
        }
        self.playbacks[victim] = Some(hit);
    }

    /// Render one sample covering the beat span `[beat, next_beat)`
    #[inline]
    pub fn next_sample(&mut self, beat: f64, next_beat: f64) -> f32 {
        if let Some(pattern) = self.pattern {
            pattern.for_each_hit(beat, next_beat, |_, sound| self.trigger(sound));
        }

        let mut out = 0.0;
        for playback in self.playbacks.iter_mut() {
            if let Some(p) = playback {
                let samples = self.kit.sample(p.sound);
                if p.position < samples.len() {
                    out += samples[p.position] * level(p.sound);
                    p.position += 1;
                } else {
                    *playback = None;
                }
            }
        }
        out * self.volume
    }

    pub fn active_hits(&self) -> usize {
        self.playbacks.iter().filter(|p| p.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48000.0;

    #[test]
    fn test_synthesized_lengths() {
        let kit = DrumKit::synthesized(SAMPLE_RATE);
        assert_eq!(kit.sample(DrumSound::Kick).len(), 24_000);
        assert_eq!(kit.sample(DrumSound::Snare).len(), 9_600);
        assert_eq!(kit.sample(DrumSound::Hihat).len(), 4_800);
    }

    #[test]
    fn test_samples_are_normalized() {
        let kit = DrumKit::synthesized(SAMPLE_RATE);
        for sound in [DrumSound::Kick, DrumSound::Snare, DrumSound::Hihat] {
            let peak = kit.sample(sound).iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!((peak - 1.0).abs() < 1e-6, "{:?} peak {}", sound, peak);
        }
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let a = DrumKit::synthesized(SAMPLE_RATE);
        let b = DrumKit::synthesized(SAMPLE_RATE);
        assert_eq!(a.sample(DrumSound::Snare), b.sample(DrumSound::Snare));
    }

    #[test]
    fn test_player_silent_until_started() {
        let mut player = BeatLoopPlayer::new(DrumKit::synthesized(SAMPLE_RATE), 1.0);
        assert_eq!(player.next_sample(0.0, 0.01), 0.0);
        player.start(Genre::Blues);
        player.next_sample(0.0, 0.01);
        // Kick and hihat both land on beat 0
        assert_eq!(player.active_hits(), 2);
    }

    #[test]
    fn test_stop_lets_hits_ring() {
        let mut player = BeatLoopPlayer::new(DrumKit::synthesized(SAMPLE_RATE), 1.0);
        player.start(Genre::Folk);
        player.next_sample(0.0, 0.001);
        player.stop();
        assert!(!player.is_playing());
        assert!(player.active_hits() > 0);

        // A stopped loop fires nothing new and drains once the tails end
        for _ in 0..24_000 {
            player.next_sample(1.0, 1.001);
        }
        assert_eq!(player.active_hits(), 0);
    }

    #[test]
    fn test_playback_slots_never_overflow() {
        let mut player = BeatLoopPlayer::new(DrumKit::synthesized(SAMPLE_RATE), 1.0);
        player.start(Genre::ModalJazz);
        // One huge span fires many hits in a single sample
        player.next_sample(0.0, 64.0);
        assert_eq!(player.active_hits(), MAX_PLAYBACKS);
    }

    #[test]
    fn test_load_wav_with_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dir.path().join("kick.wav"), spec).unwrap();
        for i in 0..2400 {
            let v = ((i as f32 / 10.0).sin() * 10_000.0) as i16;
            writer.write_sample(v).unwrap();
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let kit = DrumKit::load_or_synthesize(dir.path(), SAMPLE_RATE).unwrap();
        // 0.1 s of stereo at 24 kHz resampled to 48 kHz mono
        let kick = kit.sample(DrumSound::Kick).len();
        assert!((4790..=4800).contains(&kick), "kick length {}", kick);
        // Snare was missing and is synthesized
        assert_eq!(kit.sample(DrumSound::Snare).len(), 9_600);
    }
}
