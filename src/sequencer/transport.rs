// Transport - Shared musical clock
//
// One writer (`TransportClock`, owned by the session control context), many
// readers (`TransportReader`, handed to the audio callback and the display side).
// Fields live in atomics behind a sequence counter so a reader never waits on
// a lock: it either gets a consistent (tempo, epoch, origin) triple or retries.

use super::clock::SharedClock;
use super::timeline::Tempo;
use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering, fence};

/// Retry bound for readers on the real-time path
const MAX_READ_RETRIES: usize = 64;

/// Consistent copy of the transport fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSnapshot {
    pub running: bool,
    /// Beats per minute
    pub tempo: f64,
    /// Clock time of the current anchor (set by `start`/`set_tempo`)
    pub epoch: f64,
    /// Beat position at `epoch`
    pub origin_beat: f64,
    /// Position reported while stopped
    pub frozen_beat: f64,
}

impl TransportSnapshot {
    /// Beat position at clock time `now`
    #[inline]
    pub fn beat_at(&self, now: f64) -> f64 {
        if self.running {
            self.origin_beat + (now - self.epoch) * self.tempo / 60.0
        } else {
            self.frozen_beat
        }
    }

    /// Beats advanced per second (0 when stopped)
    #[inline]
    pub fn beats_per_second(&self) -> f64 {
        if self.running { self.tempo / 60.0 } else { 0.0 }
    }
}

#[derive(Debug)]
struct SharedTransportState {
    sequence: AtomicU64,
    running: AtomicBool,
    tempo: AtomicU64,
    epoch: AtomicU64,
    origin_beat: AtomicU64,
    frozen_beat: AtomicU64,
}

impl SharedTransportState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sequence: AtomicU64::new(0),
            running: AtomicBool::new(false),
            tempo: AtomicU64::new(Tempo::default().bpm().to_bits()),
            epoch: AtomicU64::new(0f64.to_bits()),
            origin_beat: AtomicU64::new(0f64.to_bits()),
            frozen_beat: AtomicU64::new(0f64.to_bits()),
        })
    }

    fn load_fields(&self) -> TransportSnapshot {
        TransportSnapshot {
            running: self.running.load(Ordering::Relaxed),
            tempo: f64::from_bits(self.tempo.load(Ordering::Relaxed)),
            epoch: f64::from_bits(self.epoch.load(Ordering::Relaxed)),
            origin_beat: f64::from_bits(self.origin_beat.load(Ordering::Relaxed)),
            frozen_beat: f64::from_bits(self.frozen_beat.load(Ordering::Relaxed)),
        }
    }

    /// Single-writer update. Readers that overlap it see an odd sequence and retry.
    fn write(&self, next: TransportSnapshot) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.running.store(next.running, Ordering::Relaxed);
        self.tempo.store(next.tempo.to_bits(), Ordering::Relaxed);
        self.epoch.store(next.epoch.to_bits(), Ordering::Relaxed);
        self.origin_beat.store(next.origin_beat.to_bits(), Ordering::Relaxed);
        self.frozen_beat.store(next.frozen_beat.to_bits(), Ordering::Relaxed);

        self.sequence.store(sequence.wrapping_add(2), Ordering::Release);
    }

    fn try_read(&self) -> Option<TransportSnapshot> {
        for _ in 0..MAX_READ_RETRIES {
            let before = self.sequence.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let snapshot = self.load_fields();
            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == before {
                return Some(snapshot);
            }
        }
        None
    }

    fn read(&self) -> TransportSnapshot {
        loop {
            if let Some(snapshot) = self.try_read() {
                return snapshot;
            }
            std::thread::yield_now();
        }
    }
}

/// Read-only handle on the transport, safe to use from any context
#[derive(Clone)]
pub struct TransportReader {
    shared: Arc<SharedTransportState>,
    clock: SharedClock,
}

impl TransportReader {
    /// Bounded read for the audio callback; `None` if the writer kept the
    /// sequence busy for every retry
    #[inline]
    pub fn try_snapshot(&self) -> Option<TransportSnapshot> {
        self.shared.try_read()
    }

    /// Consistent read, retrying until the writer is done (never call from the audio callback)
    pub fn snapshot(&self) -> TransportSnapshot {
        self.shared.read()
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn beat_position(&self) -> f64 {
        self.snapshot().beat_at(self.clock.now())
    }

    pub fn is_running(&self) -> bool {
        self.snapshot().running
    }
}

/// Transport controller: the only writer of the shared musical clock
pub struct TransportClock {
    shared: Arc<SharedTransportState>,
    clock: SharedClock,
}

impl TransportClock {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            shared: SharedTransportState::new(),
            clock,
        }
    }

    /// Reader handle for other contexts
    pub fn reader(&self) -> TransportReader {
        TransportReader {
            shared: Arc::clone(&self.shared),
            clock: Arc::clone(&self.clock),
        }
    }

    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }

    /// Start a new pass: epoch = now, beat 0
    pub fn start(&mut self, bpm: f64) -> Result<()> {
        let tempo = Tempo::new(bpm)?;
        let now = self.clock.now();
        self.shared.write(TransportSnapshot {
            running: true,
            tempo: tempo.bpm(),
            epoch: now,
            origin_beat: 0.0,
            frozen_beat: 0.0,
        });
        Ok(())
    }

    /// Stop and freeze the position; a no-op when already stopped
    pub fn stop(&mut self) {
        let current = self.shared.read();
        if !current.running {
            return;
        }
        let now = self.clock.now();
        self.shared.write(TransportSnapshot {
            running: false,
            frozen_beat: current.beat_at(now),
            ..current
        });
    }

    /// Change tempo without a jump in beat position: the running pass is
    /// re-anchored at the current beat with a new epoch
    pub fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        let tempo = Tempo::new(bpm)?;
        let current = self.shared.read();
        let next = if current.running {
            let now = self.clock.now();
            TransportSnapshot {
                tempo: tempo.bpm(),
                epoch: now,
                origin_beat: current.beat_at(now),
                ..current
            }
        } else {
            TransportSnapshot {
                tempo: tempo.bpm(),
                ..current
            }
        };
        self.shared.write(next);
        Ok(())
    }

    pub fn beat_position(&self) -> f64 {
        self.shared.read().beat_at(self.clock.now())
    }

    pub fn tempo(&self) -> f64 {
        self.shared.read().tempo
    }

    pub fn is_running(&self) -> bool {
        self.shared.read().running
    }

    /// Seconds since the current epoch (0 when stopped)
    pub fn elapsed(&self) -> f64 {
        let snapshot = self.shared.read();
        if snapshot.running {
            (self.clock.now() - snapshot.epoch).max(0.0)
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        self.shared.read()
    }
}
