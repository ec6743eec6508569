// Clock - Monotonic time sources
//
// Everything time-dependent reads seconds from a `Clock` instead of calling
// `Instant::now()` directly, so tests can drive time by hand.

use crate::audio::parameters::AtomicF64;
use std::sync::Arc;
use std::time::Instant;

/// Monotonic time source in seconds.
///
/// Implementations must be cheap, lock-free and non-decreasing: `now()` is called
/// from the audio callback and the MIDI input callback.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time since construction
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to (tests, offline rendering)
#[derive(Clone, Default)]
pub struct ManualClock {
    seconds: AtomicF64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            seconds: AtomicF64::new(start),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.seconds.set(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.seconds.set(self.seconds.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.seconds.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_decreases() {
        let clock = MonotonicClock::new();
        let mut last = clock.now();
        for _ in 0..1000 {
            let now = clock.now();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1.5);
        assert_eq!(clock.now(), 1.5);

        clock.advance(0.25);
        assert_eq!(clock.now(), 1.75);

        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(0.0);
        let shared: SharedClock = Arc::new(clock.clone());
        clock.advance(2.0);
        assert_eq!(shared.now(), 2.0);
    }
}
