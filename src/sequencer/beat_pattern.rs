// Beat patterns - Genre drum grooves for the background loop
// Offsets are zero-based beats within a 4/4 bar

use super::timeline::BEATS_PER_BAR;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Genre {
    ModalJazz,
    Blues,
    Folk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrumSound {
    Kick,
    Snare,
    Hihat,
}

const KICK_ONE_THREE: [f64; 2] = [0.0, 2.0];
const SNARE_BACKBEAT: [f64; 2] = [1.0, 3.0];
const HIHAT_EIGHTHS: [f64; 8] = [0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5];
const HIHAT_QUARTERS: [f64; 4] = [0.0, 1.0, 2.0, 3.0];

impl Genre {
    pub fn pattern(self) -> BeatPattern {
        match self {
            Genre::ModalJazz | Genre::Folk => BeatPattern {
                genre: self,
                kick: &KICK_ONE_THREE,
                snare: &SNARE_BACKBEAT,
                hihat: &HIHAT_EIGHTHS,
            },
            Genre::Blues => BeatPattern {
                genre: self,
                kick: &KICK_ONE_THREE,
                snare: &SNARE_BACKBEAT,
                hihat: &HIHAT_QUARTERS,
            },
        }
    }
}

/// Fixed per-bar drum offsets for one genre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatPattern {
    genre: Genre,
    kick: &'static [f64],
    snare: &'static [f64],
    hihat: &'static [f64],
}

impl BeatPattern {
    pub fn genre(&self) -> Genre {
        self.genre
    }

    pub fn offsets(&self, sound: DrumSound) -> &'static [f64] {
        match sound {
            DrumSound::Kick => self.kick,
            DrumSound::Snare => self.snare,
            DrumSound::Hihat => self.hihat,
        }
    }

    /// Call `on_hit` for every hit in the half-open beat interval `[from, to)`.
    /// Hits repeat every bar starting at beat 0. Allocation-free.
    #[inline]
    pub fn for_each_hit(&self, from: f64, to: f64, mut on_hit: impl FnMut(f64, DrumSound)) {
        if to <= from {
            return;
        }
        let bar = BEATS_PER_BAR as f64;
        for sound in [DrumSound::Kick, DrumSound::Snare, DrumSound::Hihat] {
            for &offset in self.offsets(sound) {
                let mut index = hits_before(from, offset, bar);
                let end = hits_before(to, offset, bar);
                while index < end {
                    on_hit(index as f64 * bar + offset, sound);
                    index += 1;
                }
            }
        }
    }

    /// Hits in `[from, to)` sorted by beat (kick, snare, hihat on ties)
    pub fn hits_between(&self, from: f64, to: f64) -> Vec<(f64, DrumSound)> {
        let mut hits = Vec::new();
        self.for_each_hit(from, to, |beat, sound| hits.push((beat, sound)));
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then((a.1 as u8).cmp(&(b.1 as u8))));
        hits
    }
}

/// Number of hits `bar * k + offset` (k >= 0) strictly before `beat`
#[inline]
fn hits_before(beat: f64, offset: f64, bar: f64) -> i64 {
    if beat <= offset {
        0
    } else {
        ((beat - offset) / bar).ceil() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genre_patterns() {
        let jazz = Genre::ModalJazz.pattern();
        assert_eq!(jazz.offsets(DrumSound::Kick), &[0.0, 2.0]);
        assert_eq!(jazz.offsets(DrumSound::Snare), &[1.0, 3.0]);
        assert_eq!(jazz.offsets(DrumSound::Hihat).len(), 8);

        let blues = Genre::Blues.pattern();
        assert_eq!(blues.offsets(DrumSound::Hihat), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_first_bar_hits() {
        let hits = Genre::Blues.pattern().hits_between(0.0, 4.0);
        let expected = vec![
            (0.0, DrumSound::Kick),
            (0.0, DrumSound::Hihat),
            (1.0, DrumSound::Snare),
            (1.0, DrumSound::Hihat),
            (2.0, DrumSound::Kick),
            (2.0, DrumSound::Hihat),
            (3.0, DrumSound::Snare),
            (3.0, DrumSound::Hihat),
        ];
        assert_eq!(hits, expected);
    }

    #[test]
    fn test_hits_repeat_each_bar() {
        let pattern = Genre::ModalJazz.pattern();
        let kicks: Vec<f64> = pattern
            .hits_between(0.0, 12.0)
            .into_iter()
            .filter(|(_, s)| *s == DrumSound::Kick)
            .map(|(b, _)| b)
            .collect();
        assert_eq!(kicks, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
    }

    #[test]
    fn test_half_open_interval_counts_each_hit_once() {
        let pattern = Genre::Folk.pattern();
        let mut count = 0;
        for i in 0..(8 * 480) {
            let from = i as f64 / 480.0;
            let to = (i + 1) as f64 / 480.0;
            pattern.for_each_hit(from, to, |_, _| count += 1);
        }
        // Two bars: 2 kicks + 2 snares + 8 hihats per bar
        assert_eq!(count, 24);
    }

    #[test]
    fn test_empty_interval() {
        let pattern = Genre::Folk.pattern();
        let mut fired = false;
        pattern.for_each_hit(1.0, 1.0, |_, _| fired = true);
        pattern.for_each_hit(2.0, 1.0, |_, _| fired = true);
        assert!(!fired);
    }
}
