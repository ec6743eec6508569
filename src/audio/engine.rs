// Audio engine - CPAL output stream around the renderer
//
// # Format Support
//
// The device's preferred sample format is detected with `sample_format()` and
// a matching stream is built (f32, i16 or u16). Rendering is always mono f32;
// conversion happens while writing the interleaved output buffer, without
// allocation, through `FromSample<f32>`.
//
// # Stream Limitations
//
// On macOS (CoreAudio) the Stream is not Send/Sync, so the engine must stay on
// the thread that created it. Stream errors set the device status and are
// logged from the error callback; there is no automatic audio reconnection.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig,
    SupportedBufferSize,
};

use crate::audio::format_conversion::{write_mono_block, write_silence};
use crate::audio::load_monitor::LoadMonitor;
use crate::audio::renderer::{Renderer, RendererHandle, RendererSettings};
use crate::config::TrainerConfig;
use crate::connection::status::{AtomicDeviceStatus, DeviceStatus};
use crate::error::{Result, TrainerError};
use crate::messaging::channels::RenderConsumer;
use crate::sequencer::transport::TransportReader;
use crate::synth::drums::DrumKit;

/// Mono scratch size; larger device buffers are rendered in several passes
const SCRATCH_FRAMES: usize = 8192;

/// Measure one out of N callbacks
const MEASURE_EVERY_N: u32 = 10;

pub struct AudioEngine {
    _device: Device,
    _stream: Stream,
    sample_rate: f32,
    channels: usize,
    handle: RendererHandle,
    load_monitor: LoadMonitor,
    status: AtomicDeviceStatus,
    reported_fallbacks: u64,
    reported_non_finite: u64,
}

impl AudioEngine {
    /// Open the default output device and start rendering.
    ///
    /// `commands` is the consumer half of the trigger queue; the renderer owns
    /// it from here on.
    pub fn start(
        config: &TrainerConfig,
        commands: RenderConsumer,
        transport: TransportReader,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| TrainerError::AudioDevice("No audio output device found".to_string()))?;

        log::info!(
            "Audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported_config = device
            .default_output_config()
            .map_err(|e| TrainerError::AudioDevice(format!("Configuration error: {}", e)))?;

        let sample_format = supported_config.sample_format();
        log::debug!("Audio config: {:?}", supported_config);

        let sample_rate = supported_config.sample_rate().0 as f32;
        let channels = supported_config.channels() as usize;
        let buffer_frames = fixed_buffer_frames(config.audio.buffer_size, supported_config.buffer_size());
        let mut stream_config: StreamConfig = supported_config.into();
        stream_config.buffer_size = BufferSize::Fixed(buffer_frames);
        log::debug!("Requested buffer: {} frames", buffer_frames);

        let kit = match &config.practice.drum_samples_dir {
            Some(dir) => DrumKit::load_or_synthesize(dir, sample_rate).unwrap_or_else(|e| {
                log::warn!("Drum samples unusable ({}), using synthesized kit", e);
                DrumKit::synthesized(sample_rate)
            }),
            None => DrumKit::synthesized(sample_rate),
        };

        let settings = RendererSettings {
            steal_fade_samples: buffer_frames as usize,
            ..RendererSettings::from_config(config, sample_rate)
        };
        let renderer = Renderer::new(
            settings,
            kit,
            commands,
            transport,
        );
        let handle = renderer.handle();

        let load_monitor = LoadMonitor::new(sample_rate, MEASURE_EVERY_N);
        let status = AtomicDeviceStatus::new(DeviceStatus::Connecting);

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &stream_config,
                channels,
                renderer,
                load_monitor.clone(),
                status.clone(),
            ),
            SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &stream_config,
                channels,
                renderer,
                load_monitor.clone(),
                status.clone(),
            ),
            SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &stream_config,
                channels,
                renderer,
                load_monitor.clone(),
                status.clone(),
            ),
            other => {
                return Err(TrainerError::AudioDevice(format!(
                    "Unsupported sample format: {:?}. Supported formats: F32, I16, U16",
                    other
                )));
            }
        }?;

        stream
            .play()
            .map_err(|e| TrainerError::AudioDevice(format!("Failed to start stream: {}", e)))?;
        status.set(DeviceStatus::Connected);

        log::info!("Audio engine started: {} Hz, {} channel(s)", sample_rate, channels);

        Ok(Self {
            _device: device,
            _stream: stream,
            sample_rate,
            channels,
            handle,
            load_monitor,
            status,
            reported_fallbacks: 0,
            reported_non_finite: 0,
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn handle(&self) -> &RendererHandle {
        &self.handle
    }

    pub fn load_monitor(&self) -> &LoadMonitor {
        &self.load_monitor
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.get()
    }

    /// Log callback faults counted since the previous call (control context)
    pub fn report(&mut self) {
        self.load_monitor.report();
        let fallbacks = self.handle.stats().transport_fallbacks();
        if fallbacks > self.reported_fallbacks {
            log::warn!(
                "Audio callback rendered {} block(s) from a cached transport state",
                fallbacks - self.reported_fallbacks
            );
            self.reported_fallbacks = fallbacks;
        }
        let non_finite = self.handle.stats().non_finite_samples();
        if non_finite > self.reported_non_finite {
            log::error!(
                "Audio mix produced {} non-finite sample(s), replaced with silence",
                non_finite - self.reported_non_finite
            );
            self.reported_non_finite = non_finite;
        }
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        channels: usize,
        mut renderer: Renderer,
        load_monitor: LoadMonitor,
        status: AtomicDeviceStatus,
    ) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let channels = channels.max(1);
        let mut scratch = vec![0.0f32; SCRATCH_FRAMES];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // ========== SACRED ZONE ==========
                    // No allocations, No I/O, No blocking locks
                    let measure_start = load_monitor.start_measure();
                    let frames = data.len() / channels;

                    for chunk in data.chunks_mut(SCRATCH_FRAMES * channels) {
                        let chunk_frames = chunk.len() / channels;
                        let mono = &mut scratch[..chunk_frames];
                        renderer.render_block(mono);
                        let written = write_mono_block(mono, chunk, channels);
                        // Trailing partial frame, if the device hands us one
                        if written * channels < chunk.len() {
                            write_silence(&mut chunk[written * channels..]);
                        }
                    }

                    load_monitor.end_measure(measure_start, frames);
                    // ========== SACRED ZONE END ==========
                },
                move |err| {
                    // Runs outside the audio callback
                    log::error!("Audio stream error: {}", err);
                    status.set(DeviceStatus::Error);
                },
                None,
            )
            .map_err(|e| TrainerError::AudioDevice(format!("Stream creation failed: {}", e)))?;

        Ok(stream)
    }
}

/// Configured buffer size, clamped to the range the device reports
fn fixed_buffer_frames(requested: u32, supported: &SupportedBufferSize) -> u32 {
    let requested = requested.max(1);
    match *supported {
        SupportedBufferSize::Range { min, max } => requested.clamp(min, max.max(min)),
        SupportedBufferSize::Unknown => requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_within_device_range() {
        let range = SupportedBufferSize::Range { min: 64, max: 4096 };
        assert_eq!(fixed_buffer_frames(512, &range), 512);
        assert_eq!(fixed_buffer_frames(16, &range), 64);
        assert_eq!(fixed_buffer_frames(8192, &range), 4096);
    }

    #[test]
    fn test_buffer_size_unknown_range() {
        assert_eq!(fixed_buffer_frames(256, &SupportedBufferSize::Unknown), 256);
        assert_eq!(fixed_buffer_frames(0, &SupportedBufferSize::Unknown), 1);
    }
}
