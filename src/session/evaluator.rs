// Evaluator interface - The boundary to the musical assessment
//
// The engine only packages what was played; scoring is up to the implementation.

use crate::error::Result;
use crate::sequencer::note::{Phrase, RecordedPhrase};
use std::collections::BTreeMap;

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;

/// Everything the evaluator gets for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    pub target: Phrase,
    pub recorded: RecordedPhrase,
    pub style: String,
    pub difficulty: u8,
    /// Effective tempo of the turn in BPM
    pub tempo: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// Score per dimension, e.g. "pitch" or "rhythm"
    pub scores: BTreeMap<String, f32>,
    pub feedback: String,
    suggested_difficulty: u8,
}

impl EvaluationResult {
    pub fn new(scores: BTreeMap<String, f32>, feedback: impl Into<String>, suggested_difficulty: u8) -> Self {
        Self {
            scores,
            feedback: feedback.into(),
            suggested_difficulty: suggested_difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY),
        }
    }

    /// "No adjustment" result used when the evaluator fails or times out
    pub fn neutral(difficulty: u8) -> Self {
        Self::new(BTreeMap::new(), String::new(), difficulty)
    }

    pub fn suggested_difficulty(&self) -> u8 {
        self.suggested_difficulty
    }

    pub fn is_neutral(&self) -> bool {
        self.scores.is_empty() && self.feedback.is_empty()
    }
}

/// Assesses one performance. Called from a worker thread, so it may block.
///
/// The controller stops waiting after the evaluation timeout but cannot
/// cancel the call: the worker thread lives until `evaluate` returns and is
/// joined on a later `poll`. An implementation that never returns keeps its
/// thread for good, so remote calls should carry their own timeout.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, summary: &PerformanceSummary) -> Result<EvaluationResult>;
}

/// Compares note counts and pitches position by position. Used by the demo
/// binary and as a stand-in when no assessment service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoteCountEvaluator;

impl Evaluator for NoteCountEvaluator {
    fn evaluate(&self, summary: &PerformanceSummary) -> Result<EvaluationResult> {
        let target = summary.target.len();
        let played = summary.recorded.len();

        let completeness = if target == 0 {
            0.0
        } else {
            (played.min(target) as f32) / target as f32
        };
        let matching = summary
            .target
            .notes()
            .iter()
            .zip(summary.recorded.notes())
            .filter(|(want, got)| want.pitch() == got.pitch())
            .count();
        let pitch = if target == 0 {
            0.0
        } else {
            matching as f32 / target as f32
        };

        let mut scores = BTreeMap::new();
        scores.insert("completeness".to_string(), completeness);
        scores.insert("pitch".to_string(), pitch);

        let feedback = format!(
            "Played {} of {} note(s), {} on the right pitch",
            played, target, matching
        );
        let suggested = if pitch >= 0.9 && played == target {
            summary.difficulty.saturating_add(1)
        } else if pitch < 0.5 {
            summary.difficulty.saturating_sub(1)
        } else {
            summary.difficulty
        };

        Ok(EvaluationResult::new(scores, feedback, suggested))
    }
}
