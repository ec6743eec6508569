// Load monitor - Audio callback timing
//
// Measures how long each render takes against the buffer's playback time.
// The callback only touches atomics; the control context reads and logs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

#[derive(Clone)]
pub struct LoadMonitor {
    total_callback_time_ns: Arc<AtomicU64>,
    total_available_time_ns: Arc<AtomicU64>,
    measured: Arc<AtomicU64>,
    /// Callbacks that ran longer than their buffer lasts (underrun risk)
    overloads: Arc<AtomicU64>,
    /// Worst observed load in per-mille
    peak_load_permille: Arc<AtomicU32>,

    sample_rate: f32,
    measure_every_n: u32,
    current_count: Arc<AtomicU32>,
}

impl LoadMonitor {
    /// Measure one out of every `measure_every_n` callbacks
    pub fn new(sample_rate: f32, measure_every_n: u32) -> Self {
        Self {
            total_callback_time_ns: Arc::new(AtomicU64::new(0)),
            total_available_time_ns: Arc::new(AtomicU64::new(0)),
            measured: Arc::new(AtomicU64::new(0)),
            overloads: Arc::new(AtomicU64::new(0)),
            peak_load_permille: Arc::new(AtomicU32::new(0)),
            sample_rate: sample_rate.max(1.0),
            measure_every_n: measure_every_n.max(1),
            current_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Call at callback start; `None` means this callback is not measured
    #[inline]
    pub fn start_measure(&self) -> Option<Instant> {
        let count = self.current_count.fetch_add(1, Ordering::Relaxed);
        if count % self.measure_every_n == 0 {
            Some(Instant::now())
        } else {
            None
        }
    }

    /// Call at callback end with the number of frames rendered
    #[inline]
    pub fn end_measure(&self, start_time: Option<Instant>, frames: usize) {
        if let Some(start) = start_time {
            self.record(start.elapsed().as_nanos() as u64, frames);
        }
    }

    #[inline]
    fn record(&self, elapsed_ns: u64, frames: usize) {
        let available_ns = ((frames as f64 / self.sample_rate as f64) * 1_000_000_000.0) as u64;
        if available_ns == 0 {
            return;
        }

        self.total_callback_time_ns.fetch_add(elapsed_ns, Ordering::Relaxed);
        self.total_available_time_ns.fetch_add(available_ns, Ordering::Relaxed);
        self.measured.fetch_add(1, Ordering::Relaxed);

        if elapsed_ns > available_ns {
            self.overloads.fetch_add(1, Ordering::Relaxed);
        }
        let permille = (elapsed_ns.saturating_mul(1000) / available_ns).min(u32::MAX as u64) as u32;
        self.peak_load_permille.fetch_max(permille, Ordering::Relaxed);
    }

    /// Average load in percent (can exceed 100 when overloaded)
    pub fn load_percentage(&self) -> f32 {
        let callback = self.total_callback_time_ns.load(Ordering::Relaxed);
        let available = self.total_available_time_ns.load(Ordering::Relaxed);
        if available == 0 {
            return 0.0;
        }
        (callback as f64 / available as f64 * 100.0) as f32
    }

    pub fn peak_percentage(&self) -> f32 {
        self.peak_load_permille.load(Ordering::Relaxed) as f32 / 10.0
    }

    pub fn measured_count(&self) -> u64 {
        self.measured.load(Ordering::Relaxed)
    }

    /// Overloads since the last call
    pub fn take_overloads(&self) -> u64 {
        self.overloads.swap(0, Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.total_callback_time_ns.store(0, Ordering::Relaxed);
        self.total_available_time_ns.store(0, Ordering::Relaxed);
        self.measured.store(0, Ordering::Relaxed);
        self.overloads.store(0, Ordering::Relaxed);
        self.peak_load_permille.store(0, Ordering::Relaxed);
        self.current_count.store(0, Ordering::Relaxed);
    }

    /// Log accumulated overloads; called periodically from the control context
    pub fn report(&self) {
        let overloads = self.take_overloads();
        if overloads > 0 {
            log::warn!(
                "Audio callback overran its buffer {} time(s) (avg load {:.1}%, peak {:.1}%)",
                overloads,
                self.load_percentage(),
                self.peak_percentage()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation() {
        let monitor = LoadMonitor::new(44100.0, 10);
        assert_eq!(monitor.load_percentage(), 0.0);
        assert_eq!(monitor.measured_count(), 0);
    }

    #[test]
    fn test_measure_sampling() {
        let monitor = LoadMonitor::new(44100.0, 10);
        let measured = (0..100).filter(|_| monitor.start_measure().is_some()).count();
        assert_eq!(measured, 10);
    }

    #[test]
    fn test_load_and_overloads() {
        let monitor = LoadMonitor::new(1000.0, 1);
        // 100 frames at 1 kHz = 100 ms available
        monitor.record(50_000_000, 100);
        assert!((monitor.load_percentage() - 50.0).abs() < 0.01);
        assert_eq!(monitor.take_overloads(), 0);

        monitor.record(150_000_000, 100);
        assert_eq!(monitor.take_overloads(), 1);
        assert_eq!(monitor.take_overloads(), 0);
        assert!((monitor.peak_percentage() - 150.0).abs() < 0.01);
    }

    #[test]
    fn test_reset() {
        let monitor = LoadMonitor::new(1000.0, 1);
        monitor.record(10_000_000, 100);
        monitor.reset();
        assert_eq!(monitor.load_percentage(), 0.0);
        assert_eq!(monitor.measured_count(), 0);
        assert_eq!(monitor.peak_percentage(), 0.0);
    }

    #[test]
    fn test_real_measurement() {
        let monitor = LoadMonitor::new(44100.0, 1);
        let start = monitor.start_measure();
        std::thread::sleep(std::time::Duration::from_micros(100));
        monitor.end_measure(start, 512);
        assert!(monitor.load_percentage() > 0.0);
        assert_eq!(monitor.measured_count(), 1);
    }
}
