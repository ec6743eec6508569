// DSP utilities - Last stage of the render loop
//
// Called per sample from the callback: no allocation, no state beyond the smoother.

/// Anything smaller is treated as silence
const DENORMAL_THRESHOLD: f32 = 1e-15;

#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < DENORMAL_THRESHOLD { 0.0 } else { x }
}

/// tanh saturation, close to linear below 0.3
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// Output stage for one mixed sample: denormal flush then soft clip.
/// `None` for NaN or infinity so the caller can count the fault and write silence.
#[inline]
pub fn finish_sample(mix: f32) -> Option<f32> {
    if mix.is_nan() {
        return None;
    }
    // tanh(inf) is finite, so check before clipping
    if mix.is_infinite() {
        return None;
    }
    Some(soft_clip(flush_denormals_to_zero(mix)))
}

/// One-pole lowpass for control values (master volume).
/// `time_constant_ms` is the time to cover about 63 % of a step.
pub struct OnePoleSmoother {
    value: f32,
    coefficient: f32,
}

impl OnePoleSmoother {
    pub fn new(initial: f32, time_constant_ms: f32, sample_rate: f32) -> Self {
        let samples = (time_constant_ms * 0.001 * sample_rate).max(1.0);
        Self {
            value: initial,
            coefficient: 1.0 / samples,
        }
    }

    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        self.value = flush_denormals_to_zero(self.value + self.coefficient * (target - self.value));
        self.value
    }

    pub fn get(&self) -> f32 {
        self.value
    }
}
