// Format conversion for CPAL audio streams
//
// The renderer works in mono f32. Devices may want f32, i16 or u16 with any
// channel count; these helpers write the mono mix into every channel of an
// interleaved buffer. Allocation-free.

use cpal::{FromSample, Sample};

/// Write one mono sample to every channel of an interleaved frame
#[inline]
pub fn write_mono_to_interleaved_frame<T>(internal_sample: f32, output_frame: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    let converted: T = Sample::from_sample::<f32>(internal_sample);
    for channel_sample in output_frame.iter_mut() {
        *channel_sample = converted;
    }
}

/// Spread a mono block over an interleaved output buffer.
///
/// Writes `min(mono.len(), output.len() / channels)` frames and returns that count.
#[inline]
pub fn write_mono_block<T>(mono: &[f32], output: &mut [T], channels: usize) -> usize
where
    T: Sample + FromSample<f32>,
{
    let channels = channels.max(1);
    let mut frames = 0;
    for (frame, &sample) in output.chunks_mut(channels).zip(mono.iter()) {
        write_mono_to_interleaved_frame(sample, frame);
        frames += 1;
    }
    frames
}

/// Fill an interleaved buffer with the format's silence
#[inline]
pub fn write_silence<T>(output: &mut [T])
where
    T: Sample,
{
    for sample in output.iter_mut() {
        *sample = T::EQUILIBRIUM;
    }
}
