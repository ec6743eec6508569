use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use music_trainer::audio::format_conversion::write_mono_block;
use music_trainer::messaging::channels::create_render_channel;
use music_trainer::messaging::command::{RenderCommand, VoiceTrigger};
use music_trainer::sequencer::beat_pattern::Genre;
use music_trainer::synth::drums::DrumKit;
use music_trainer::synth::envelope::AdsrParams;
use music_trainer::synth::oscillator::WaveformType;
use music_trainer::synth::voice_manager::VoiceManager;
use music_trainer::{ManualClock, Renderer, RendererSettings, TransportClock};
use ringbuf::traits::Producer;
use std::sync::Arc;

const SAMPLE_RATE: f32 = 48000.0;
const BUFFER_SIZE: usize = 512;

/// Voice pool cost per buffer at increasing polyphony
fn bench_voice_manager(c: &mut Criterion) {
    let mut group = c.benchmark_group("voice_manager");

    for voices in [1usize, 8, 16, 32] {
        let mut manager = VoiceManager::new(
            SAMPLE_RATE,
            voices,
            WaveformType::Sine,
            AdsrParams::default(),
            BUFFER_SIZE,
        );
        for i in 0..voices {
            manager.note_on(48 + i as u8, 100, 0.0, None);
        }

        group.bench_with_input(BenchmarkId::from_parameter(voices), &voices, |b, _| {
            b.iter(|| {
                for _ in 0..BUFFER_SIZE {
                    black_box(manager.next_sample());
                }
            });
        });
    }
    group.finish();
}

/// Full render_block: voices, beat loop, volume smoothing and clipping
fn bench_render_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_block");

    for voices in [0usize, 8, 16] {
        let clock = ManualClock::new(0.0);
        let mut transport = TransportClock::new(Arc::new(clock.clone()));
        let (mut tx, rx) = create_render_channel(64);
        let settings = RendererSettings {
            sample_rate: SAMPLE_RATE,
            polyphony: 16,
            ..RendererSettings::default()
        };
        let mut renderer =
            Renderer::new(settings, DrumKit::synthesized(SAMPLE_RATE), rx, transport.reader());

        for i in 0..voices {
            let _ = tx.try_push(RenderCommand::Trigger(VoiceTrigger {
                pitch: 48 + i as u8,
                velocity: 100,
                beat: 0.0,
                duration_beats: 1.0e9,
            }));
        }
        let _ = tx.try_push(RenderCommand::StartBeatLoop(Genre::ModalJazz));
        let _ = transport.start(120.0);

        let mut buffer = vec![0.0f32; BUFFER_SIZE];
        let block_seconds = BUFFER_SIZE as f64 / SAMPLE_RATE as f64;
        group.bench_with_input(BenchmarkId::from_parameter(voices), &voices, |b, _| {
            b.iter(|| {
                renderer.render_block(&mut buffer);
                clock.advance(block_seconds);
                black_box(&buffer);
            });
        });
    }
    group.finish();
}

/// Mono to interleaved stereo, as done in the cpal callback
fn bench_interleave(c: &mut Criterion) {
    let mono = vec![0.25f32; BUFFER_SIZE];
    let mut stereo_f32 = vec![0.0f32; BUFFER_SIZE * 2];
    let mut stereo_i16 = vec![0i16; BUFFER_SIZE * 2];

    c.bench_function("interleave_f32_stereo", |b| {
        b.iter(|| black_box(write_mono_block(&mono, &mut stereo_f32, 2)));
    });
    c.bench_function("interleave_i16_stereo", |b| {
        b.iter(|| black_box(write_mono_block(&mono, &mut stereo_i16, 2)));
    });
}

criterion_group!(
    benches,
    bench_voice_manager,
    bench_render_block,
    bench_interleave
);
criterion_main!(benches);
