// Renderer - Device-independent core of the audio callback
//
// SACRED ZONE rules apply to everything reachable from `render_block`:
// no allocation, no locks, no logging, no unbounded work. Faults are
// counted in atomics and reported by the control context.

use super::dsp_utils::{OnePoleSmoother, finish_sample};
use super::parameters::AtomicF32;
use crate::config::TrainerConfig;
use crate::messaging::channels::RenderConsumer;
use crate::messaging::command::{RenderCommand, VoiceTrigger};
use crate::sequencer::transport::{TransportReader, TransportSnapshot};
use crate::synth::drums::{BeatLoopPlayer, DrumKit};
use crate::synth::envelope::AdsrParams;
use crate::synth::oscillator::WaveformType;
use crate::synth::voice_manager::VoiceManager;
use ringbuf::traits::Consumer;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Master volume smoothing time
const VOLUME_SMOOTHING_MS: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererSettings {
    pub sample_rate: f32,
    pub polyphony: usize,
    pub waveform: WaveformType,
    pub adsr: AdsrParams,
    /// Forced releases fade out within this many samples, and never take
    /// longer than the block being rendered
    pub steal_fade_samples: usize,
    pub master_volume: f32,
    pub beat_volume: f32,
    /// Scheduled triggers held at once; sized like the trigger queue
    pub pending_capacity: usize,
}

impl RendererSettings {
    pub fn from_config(config: &TrainerConfig, sample_rate: f32) -> Self {
        Self {
            sample_rate,
            polyphony: config.audio.polyphony,
            waveform: config.audio.waveform,
            adsr: config.audio.adsr,
            steal_fade_samples: config.audio.buffer_size.max(1) as usize,
            master_volume: config.audio.master_volume,
            beat_volume: config.practice.beat_volume,
            pending_capacity: config.audio.trigger_queue_capacity.max(1),
        }
    }
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self::from_config(&TrainerConfig::default(), 48_000.0)
    }
}

/// Counters written by the callback, read by the control context
#[derive(Debug, Default)]
pub struct RenderStats {
    blocks: AtomicU64,
    triggers_fired: AtomicU64,
    forced_releases: AtomicU64,
    transport_fallbacks: AtomicU64,
    non_finite_samples: AtomicU64,
    active_voices: AtomicU32,
}

impl RenderStats {
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn triggers_fired(&self) -> u64 {
        self.triggers_fired.load(Ordering::Relaxed)
    }

    pub fn forced_releases(&self) -> u64 {
        self.forced_releases.load(Ordering::Relaxed)
    }

    /// Blocks rendered from the cached transport because the live read kept racing the writer
    pub fn transport_fallbacks(&self) -> u64 {
        self.transport_fallbacks.load(Ordering::Relaxed)
    }

    /// Samples replaced by silence because the mix went NaN/inf
    pub fn non_finite_samples(&self) -> u64 {
        self.non_finite_samples.load(Ordering::Relaxed)
    }

    pub fn active_voices(&self) -> u32 {
        self.active_voices.load(Ordering::Relaxed)
    }
}

/// Control-side handle on a renderer that has been moved into the callback
#[derive(Clone)]
pub struct RendererHandle {
    master_volume: AtomicF32,
    stats: Arc<RenderStats>,
}

impl RendererHandle {
    pub fn set_master_volume(&self, volume: f32) {
        self.master_volume.set(volume.clamp(0.0, 1.0));
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume.get()
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }
}

pub struct Renderer {
    voices: VoiceManager,
    beat_loop: BeatLoopPlayer,
    commands: RenderConsumer,
    transport: TransportReader,

    /// Scheduled triggers not yet fired, ascending by beat. Never grows past `pending_limit`.
    pending: Vec<VoiceTrigger>,
    pending_limit: usize,
    next_pending: usize,

    last_snapshot: TransportSnapshot,
    /// Beat reached by the end of the previous sample
    beat_cursor: f64,

    master_volume: AtomicF32,
    volume_smoother: OnePoleSmoother,
    stats: Arc<RenderStats>,
    sample_period: f64,
    steal_fade_samples: usize,
    reported_forced_releases: u64,
}

impl Renderer {
    pub fn new(
        settings: RendererSettings,
        kit: DrumKit,
        commands: RenderConsumer,
        transport: TransportReader,
    ) -> Self {
        let master_volume = AtomicF32::new(settings.master_volume.clamp(0.0, 1.0));
        let last_snapshot = transport.snapshot();
        Self {
            voices: VoiceManager::new(
                settings.sample_rate,
                settings.polyphony,
                settings.waveform,
                settings.adsr,
                settings.steal_fade_samples,
            ),
            beat_loop: BeatLoopPlayer::new(kit, settings.beat_volume),
            commands,
            transport,
            pending: Vec::with_capacity(settings.pending_capacity),
            pending_limit: settings.pending_capacity,
            next_pending: 0,
            last_snapshot,
            beat_cursor: last_snapshot.frozen_beat,
            volume_smoother: OnePoleSmoother::new(
                master_volume.get(),
                VOLUME_SMOOTHING_MS,
                settings.sample_rate,
            ),
            master_volume,
            stats: Arc::new(RenderStats::default()),
            sample_period: 1.0 / settings.sample_rate.max(1.0) as f64,
            steal_fade_samples: settings.steal_fade_samples.max(1),
            reported_forced_releases: 0,
        }
    }

    pub fn handle(&self) -> RendererHandle {
        RendererHandle {
            master_volume: self.master_volume.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Apply queued commands. Stops early when the pending list is full;
    /// the rest stays queued for the next block.
    fn drain_commands(&mut self) {
        loop {
            if self.pending.len() >= self.pending_limit {
                self.compact_pending();
                if self.pending.len() >= self.pending_limit {
                    return;
                }
            }
            let Some(command) = self.commands.try_pop() else {
                return;
            };
            match command {
                RenderCommand::Reset => {
                    self.pending.clear();
                    self.next_pending = 0;
                    self.voices.release_all();
                    self.beat_loop.stop();
                }
                RenderCommand::Trigger(trigger) => self.pending.push(trigger),
                RenderCommand::StartBeatLoop(genre) => self.beat_loop.start(genre),
                RenderCommand::StopBeatLoop => self.beat_loop.stop(),
            }
        }
    }

    fn compact_pending(&mut self) {
        if self.next_pending > 0 {
            self.pending.drain(..self.next_pending);
            self.next_pending = 0;
        }
    }

    fn read_transport(&mut self) -> TransportSnapshot {
        match self.transport.try_snapshot() {
            Some(snapshot) => {
                // `start` anchors a new pass at beat 0; `set_tempo` re-anchors mid-pass
                let new_pass = snapshot.running
                    && (!self.last_snapshot.running
                        || (snapshot.epoch != self.last_snapshot.epoch
                            && snapshot.origin_beat == 0.0));
                if new_pass {
                    // Hits and triggers between the epoch and this block are still due
                    self.beat_cursor = snapshot.origin_beat;
                }
                self.last_snapshot = snapshot;
                snapshot
            }
            None => {
                self.stats.transport_fallbacks.fetch_add(1, Ordering::Relaxed);
                self.last_snapshot
            }
        }
    }

    #[inline]
    fn fire_due_triggers(&mut self, beat: f64) {
        while let Some(trigger) = self.pending.get(self.next_pending) {
            if trigger.beat > beat {
                break;
            }
            let release_beat = trigger.beat + trigger.duration_beats.max(0.0);
            self.voices
                .note_on(trigger.pitch, trigger.velocity, trigger.beat, Some(release_beat));
            self.next_pending += 1;
            self.stats.triggers_fired.fetch_add(1, Ordering::Relaxed);
        }
        if self.next_pending > 0 && self.next_pending == self.pending.len() {
            self.pending.clear();
            self.next_pending = 0;
        }
    }

    /// Render one mono block. Never fails: faults become silence and counters.
    pub fn render_block(&mut self, output: &mut [f32]) {
        // Hosts may call back with fewer frames than the configured buffer
        self.voices
            .set_steal_fade(self.steal_fade_samples.min(output.len()));
        self.drain_commands();
        let snapshot = self.read_transport();
        let block_start = self.transport.now();

        for (i, out) in output.iter_mut().enumerate() {
            let sample_end = block_start + (i + 1) as f64 * self.sample_period;

            let drum_span = if snapshot.running {
                let end_beat = snapshot.beat_at(sample_end);
                let start_beat = self.beat_cursor;
                self.fire_due_triggers(start_beat);
                self.voices.release_due(start_beat);
                self.beat_cursor = self.beat_cursor.max(end_beat);
                (start_beat, end_beat)
            } else {
                (self.beat_cursor, self.beat_cursor)
            };

            let mix = self.voices.next_sample() + self.beat_loop.next_sample(drum_span.0, drum_span.1);
            let volume = self.volume_smoother.process(self.master_volume.get());
            *out = match finish_sample(mix * volume) {
                Some(sample) => sample,
                None => {
                    self.stats.non_finite_samples.fetch_add(1, Ordering::Relaxed);
                    0.0
                }
            };
        }

        let forced = self.voices.forced_releases();
        if forced != self.reported_forced_releases {
            self.stats
                .forced_releases
                .fetch_add(forced - self.reported_forced_releases, Ordering::Relaxed);
            self.reported_forced_releases = forced;
        }
        self.stats
            .active_voices
            .store(self.voices.active_voice_count() as u32, Ordering::Relaxed);
        self.stats.blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }

    pub fn beat_loop(&self) -> &BeatLoopPlayer {
        &self.beat_loop
    }

    /// Triggers queued but not yet sounded
    pub fn pending_triggers(&self) -> usize {
        self.pending.len() - self.next_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::channels::create_render_channel;
    use crate::sequencer::beat_pattern::Genre;
    use crate::sequencer::clock::ManualClock;
    use crate::sequencer::transport::TransportClock;
    use ringbuf::traits::Producer;

    const SAMPLE_RATE: f32 = 48_000.0;
    const BLOCK: usize = 480;

    fn setup(
        polyphony: usize,
    ) -> (Renderer, crate::messaging::channels::RenderProducer, TransportClock, ManualClock) {
        let clock = ManualClock::new(0.0);
        let transport = TransportClock::new(Arc::new(clock.clone()));
        let (tx, rx) = create_render_channel(256);
        let settings = RendererSettings {
            sample_rate: SAMPLE_RATE,
            polyphony,
            steal_fade_samples: BLOCK,
            pending_capacity: 256,
            ..RendererSettings::default()
        };
        let renderer = Renderer::new(settings, DrumKit::synthesized(SAMPLE_RATE), rx, transport.reader());
        (renderer, tx, transport, clock)
    }

    fn trigger(pitch: u8, beat: f64, duration_beats: f64) -> RenderCommand {
        RenderCommand::Trigger(VoiceTrigger {
            pitch,
            velocity: 100,
            beat,
            duration_beats,
        })
    }

    /// Render one block and move the clock forward by its duration
    fn step(renderer: &mut Renderer, clock: &ManualClock) -> Vec<f32> {
        let mut block = vec![0.0; BLOCK];
        renderer.render_block(&mut block);
        clock.advance(BLOCK as f64 / SAMPLE_RATE as f64);
        block
    }

    #[test]
    fn test_silence_when_idle() {
        let (mut renderer, _tx, _transport, clock) = setup(16);
        let block = step(&mut renderer, &clock);
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_triggers_wait_for_running_transport() {
        let (mut renderer, mut tx, mut transport, clock) = setup(16);
        tx.try_push(trigger(60, 0.0, 1.0)).unwrap();
        step(&mut renderer, &clock);
        assert_eq!(renderer.pending_triggers(), 1);
        assert_eq!(renderer.voices().active_voice_count(), 0);

        transport.start(120.0).unwrap();
        step(&mut renderer, &clock);
        assert_eq!(renderer.pending_triggers(), 0);
        assert!(renderer.voices().is_held(60));
    }

    #[test]
    fn test_trigger_fires_at_its_beat() {
        let (mut renderer, mut tx, mut transport, clock) = setup(16);
        // 120 BPM: beat 1.0 is 0.5 s = 50 blocks of 10 ms
        tx.try_push(trigger(64, 1.0, 0.5)).unwrap();
        transport.start(120.0).unwrap();

        for _ in 0..49 {
            step(&mut renderer, &clock);
        }
        assert!(!renderer.voices().is_sounding(64));
        step(&mut renderer, &clock);
        step(&mut renderer, &clock);
        assert!(renderer.voices().is_held(64));

        // Held for half a beat (0.25 s), then released
        for _ in 0..26 {
            step(&mut renderer, &clock);
        }
        assert!(!renderer.voices().is_held(64));
        assert!(renderer.voices().is_sounding(64));
    }

    #[test]
    fn test_reset_clears_pending_and_releases() {
        let (mut renderer, mut tx, mut transport, clock) = setup(16);
        transport.start(120.0).unwrap();
        tx.try_push(trigger(60, 0.0, 8.0)).unwrap();
        tx.try_push(trigger(62, 100.0, 1.0)).unwrap();
        step(&mut renderer, &clock);
        assert!(renderer.voices().is_held(60));
        assert_eq!(renderer.pending_triggers(), 1);

        tx.try_push(RenderCommand::Reset).unwrap();
        step(&mut renderer, &clock);
        assert_eq!(renderer.pending_triggers(), 0);
        assert!(!renderer.voices().is_held(60));
    }

    #[test]
    fn test_output_is_bounded() {
        let (mut renderer, mut tx, mut transport, clock) = setup(32);
        transport.start(120.0).unwrap();
        for pitch in 40..72 {
            tx.try_push(trigger(pitch, 0.0, 4.0)).unwrap();
        }
        tx.try_push(RenderCommand::StartBeatLoop(Genre::ModalJazz)).unwrap();
        renderer.handle().set_master_volume(1.0);

        for _ in 0..100 {
            let block = step(&mut renderer, &clock);
            assert!(block.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        }
        assert_eq!(renderer.handle().stats().non_finite_samples(), 0);
    }

    #[test]
    fn test_beat_loop_plays_on_downbeat() {
        let (mut renderer, mut tx, mut transport, clock) = setup(16);
        tx.try_push(RenderCommand::StartBeatLoop(Genre::Blues)).unwrap();
        transport.start(100.0).unwrap();
        let block = step(&mut renderer, &clock);
        assert!(renderer.beat_loop().is_playing());
        assert!(block.iter().any(|&s| s.abs() > 0.0));

        tx.try_push(RenderCommand::StopBeatLoop).unwrap();
        step(&mut renderer, &clock);
        assert!(!renderer.beat_loop().is_playing());
    }

    #[test]
    fn test_downbeat_sounds_when_first_block_is_late() {
        let (mut renderer, mut tx, mut transport, clock) = setup(16);
        tx.try_push(RenderCommand::StartBeatLoop(Genre::Blues)).unwrap();
        tx.try_push(trigger(60, 0.0, 1.0)).unwrap();
        transport.start(100.0).unwrap();
        // The device callback runs a little after the transport started
        clock.advance(0.002);

        let block = step(&mut renderer, &clock);
        assert!(renderer.beat_loop().active_hits() > 0);
        assert!(renderer.voices().is_held(60));
        assert!(block.iter().any(|&s| s.abs() > 0.0));
    }

    #[test]
    fn test_reset_lets_drum_hits_ring() {
        let (mut renderer, mut tx, mut transport, clock) = setup(16);
        tx.try_push(RenderCommand::StartBeatLoop(Genre::Blues)).unwrap();
        transport.start(100.0).unwrap();
        step(&mut renderer, &clock);
        assert!(renderer.beat_loop().active_hits() > 0);

        tx.try_push(RenderCommand::Reset).unwrap();
        let block = step(&mut renderer, &clock);
        assert!(!renderer.beat_loop().is_playing());
        assert!(renderer.beat_loop().active_hits() > 0);
        assert!(block.iter().any(|&s| s.abs() > 0.0));
    }

    #[test]
    fn test_restart_replays_downbeat() {
        let (mut renderer, mut tx, mut transport, clock) = setup(16);
        tx.try_push(RenderCommand::StartBeatLoop(Genre::Blues)).unwrap();
        transport.start(100.0).unwrap();
        // Three seconds in: the first downbeat has rung out
        for _ in 0..300 {
            step(&mut renderer, &clock);
        }

        tx.try_push(RenderCommand::Reset).unwrap();
        tx.try_push(RenderCommand::StartBeatLoop(Genre::Blues)).unwrap();
        transport.start(100.0).unwrap();
        clock.advance(0.005);
        let before = renderer.beat_loop().active_hits();
        step(&mut renderer, &clock);
        assert!(renderer.beat_loop().active_hits() > before);
    }

    #[test]
    fn test_stats_track_forced_releases() {
        let (mut renderer, mut tx, mut transport, clock) = setup(2);
        transport.start(120.0).unwrap();
        for pitch in [60, 62, 64] {
            tx.try_push(trigger(pitch, 0.0, 4.0)).unwrap();
        }
        step(&mut renderer, &clock);
        let handle = renderer.handle();
        assert_eq!(handle.stats().triggers_fired(), 3);
        assert_eq!(handle.stats().forced_releases(), 1);
        assert_eq!(handle.stats().blocks(), 1);
    }

    #[test]
    fn test_steal_fade_fits_short_callback() {
        let clock = ManualClock::new(0.0);
        let mut transport = TransportClock::new(Arc::new(clock.clone()));
        let (mut tx, rx) = create_render_channel(16);
        let settings = RendererSettings {
            sample_rate: SAMPLE_RATE,
            polyphony: 1,
            steal_fade_samples: 512,
            ..RendererSettings::default()
        };
        let mut renderer = Renderer::new(settings, DrumKit::synthesized(SAMPLE_RATE), rx, transport.reader());

        tx.try_push(trigger(60, 0.0, 4.0)).unwrap();
        tx.try_push(trigger(62, 0.0, 4.0)).unwrap();
        transport.start(120.0).unwrap();

        // A 128-frame callback: the stolen voice is gone by its last sample
        let mut block = vec![0.0; 128];
        renderer.render_block(&mut block);
        assert_eq!(renderer.handle().stats().forced_releases(), 1);
        assert!(!renderer.voices().is_sounding(60));
        assert!(renderer.voices().is_held(62));
    }

    #[test]
    fn test_pending_overflow_stays_queued() {
        let clock = ManualClock::new(0.0);
        let mut transport = TransportClock::new(Arc::new(clock.clone()));
        let (mut tx, rx) = create_render_channel(16);
        let settings = RendererSettings {
            sample_rate: SAMPLE_RATE,
            pending_capacity: 4,
            ..RendererSettings::default()
        };
        let mut renderer = Renderer::new(settings, DrumKit::synthesized(SAMPLE_RATE), rx, transport.reader());

        for i in 0..8 {
            tx.try_push(trigger(60 + i, 10.0 + i as f64, 1.0)).unwrap();
        }
        step(&mut renderer, &clock);
        assert_eq!(renderer.pending_triggers(), 4);

        transport.start(6000.0).unwrap();
        // 100 beats per second: every trigger is due within a few blocks
        for _ in 0..30 {
            step(&mut renderer, &clock);
        }
        assert_eq!(renderer.handle().stats().triggers_fired(), 8);
    }
}
