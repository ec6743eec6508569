// Integration test: render engine without an audio device
//
// Drives `Renderer::render_block` with a manual clock, the way the cpal
// callback would, and checks voice lifecycle and the polyphony cap.

use music_trainer::messaging::channels::{RenderProducer, create_render_channel};
use music_trainer::messaging::command::{RenderCommand, VoiceTrigger};
use music_trainer::sequencer::beat_pattern::Genre;
use music_trainer::synth::drums::DrumKit;
use music_trainer::{ManualClock, Renderer, RendererSettings, TransportClock};
use ringbuf::traits::Producer;
use std::sync::Arc;

const SAMPLE_RATE: f32 = 48_000.0;
const BUFFER: usize = 256;

struct Rig {
    renderer: Renderer,
    commands: RenderProducer,
    transport: TransportClock,
    clock: ManualClock,
}

fn rig(polyphony: usize) -> Rig {
    let clock = ManualClock::new(0.0);
    let transport = TransportClock::new(Arc::new(clock.clone()));
    let (commands, consumer) = create_render_channel(128);
    let settings = RendererSettings {
        sample_rate: SAMPLE_RATE,
        polyphony,
        steal_fade_samples: BUFFER,
        pending_capacity: 128,
        ..RendererSettings::default()
    };
    let renderer = Renderer::new(
        settings,
        DrumKit::synthesized(SAMPLE_RATE),
        consumer,
        transport.reader(),
    );
    Rig {
        renderer,
        commands,
        transport,
        clock,
    }
}

fn trigger(pitch: u8, beat: f64, duration_beats: f64) -> RenderCommand {
    RenderCommand::Trigger(VoiceTrigger {
        pitch,
        velocity: 100,
        beat,
        duration_beats,
    })
}

impl Rig {
    fn render(&mut self) -> Vec<f32> {
        let mut buffer = vec![0.0; BUFFER];
        self.renderer.render_block(&mut buffer);
        self.clock.advance(BUFFER as f64 / SAMPLE_RATE as f64);
        buffer
    }
}

#[test]
fn test_polyphony_cap_releases_oldest_voice_within_one_buffer() {
    let mut rig = rig(8);
    rig.transport.start(120.0).unwrap();

    // Eight held voices, then a ninth a quarter beat later
    for (i, pitch) in (48..56).enumerate() {
        rig.commands.try_push(trigger(pitch, i as f64 * 0.001, 8.0)).unwrap();
    }
    rig.commands.try_push(trigger(60, 0.25, 8.0)).unwrap();

    let first = rig.render();
    let voices = rig.renderer.voices();
    assert_eq!(voices.held_voice_count(), 8);
    assert!(voices.is_held(48));
    assert!(!voices.is_sounding(60));

    // 0.25 beat at 120 BPM = 125 ms, about 24 buffers
    let mut previous = first[BUFFER - 1];
    let mut max_step = 0.0f32;
    let mut stolen_at = None;
    for block in 0..40 {
        let buffer = rig.render();
        for &sample in &buffer {
            max_step = max_step.max((sample - previous).abs());
            previous = sample;
        }
        if stolen_at.is_none() && rig.renderer.voices().is_sounding(60) {
            stolen_at = Some(block);
            // The oldest voice lets go as the new one starts, but still fades
            assert!(!rig.renderer.voices().is_held(48));
            assert_eq!(rig.renderer.voices().held_voice_count(), 8);
        }
    }
    assert!(stolen_at.is_some());
    // Fade finished well within the following buffer
    assert!(!rig.renderer.voices().is_sounding(48));
    assert_eq!(rig.renderer.handle().stats().forced_releases(), 1);
    // No click: adjacent samples never jump like a hard cut would
    assert!(max_step < 0.2, "max step {}", max_step);
}

#[test]
fn test_stolen_voice_silent_after_next_buffer() {
    let mut rig = rig(2);
    rig.transport.start(60.0).unwrap();
    rig.commands.try_push(trigger(60, 0.0, 10.0)).unwrap();
    rig.commands.try_push(trigger(64, 0.0, 10.0)).unwrap();
    rig.commands.try_push(trigger(67, 0.0, 10.0)).unwrap();

    rig.render();
    assert!(!rig.renderer.voices().is_held(60));
    assert!(rig.renderer.voices().is_held(67));
    rig.render();
    assert!(!rig.renderer.voices().is_sounding(60));
}

#[test]
fn test_scheduled_duration_starts_release() {
    let mut rig = rig(8);
    rig.transport.start(120.0).unwrap();
    // Half a beat = 250 ms
    rig.commands.try_push(trigger(69, 0.0, 0.5)).unwrap();

    rig.render();
    assert!(rig.renderer.voices().is_held(69));
    for _ in 0..50 {
        rig.render();
    }
    assert!(!rig.renderer.voices().is_held(69));

    // Default release is 0.3 s
    for _ in 0..80 {
        rig.render();
    }
    assert!(!rig.renderer.voices().is_sounding(69));
    assert_eq!(rig.renderer.voices().active_voice_count(), 0);
}

#[test]
fn test_beat_loop_follows_transport() {
    let mut rig = rig(8);
    rig.commands
        .try_push(RenderCommand::StartBeatLoop(Genre::Folk))
        .unwrap();

    // Stopped transport: nothing plays
    let silent = rig.render();
    assert!(silent.iter().all(|&s| s == 0.0));

    rig.transport.start(120.0).unwrap();
    let mut energy = 0.0f32;
    for _ in 0..20 {
        energy += rig.render().iter().map(|s| s * s).sum::<f32>();
    }
    assert!(energy > 0.0);
    assert!(rig.renderer.beat_loop().is_playing());
}

#[test]
fn test_master_volume_zero_fades_to_silence() {
    let mut rig = rig(8);
    rig.transport.start(120.0).unwrap();
    rig.commands.try_push(trigger(57, 0.0, 100.0)).unwrap();
    for _ in 0..10 {
        rig.render();
    }

    rig.renderer.handle().set_master_volume(0.0);
    for _ in 0..40 {
        rig.render();
    }
    let tail = rig.render();
    assert!(tail.iter().all(|s| s.abs() < 1e-3));
}

#[test]
fn test_output_always_finite_and_bounded() {
    let mut rig = rig(32);
    rig.transport.start(180.0).unwrap();
    for pitch in 0..32u8 {
        rig.commands
            .try_push(trigger(pitch * 4, 0.0, 2.0))
            .unwrap();
    }
    rig.commands
        .try_push(RenderCommand::StartBeatLoop(Genre::ModalJazz))
        .unwrap();
    for _ in 0..200 {
        let buffer = rig.render();
        assert!(buffer.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }
    assert_eq!(rig.renderer.handle().stats().non_finite_samples(), 0);
}
