// Session - One call-and-response turn at a time

pub mod controller;
pub mod evaluator;
pub mod state;

pub use controller::{EvaluationReport, SessionController, SessionOutcome};
pub use evaluator::{EvaluationResult, Evaluator, NoteCountEvaluator, PerformanceSummary};
pub use state::{OutcomeKind, SessionEvent, SessionState};
