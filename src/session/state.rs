// Session states and the transition table
//
// `SessionState::on` is the only place that decides whether a transition is
// legal. The controller asks it before touching any component, so a rejected
// event leaves everything as it was.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    PlayingCall,
    WaitingForResponse,
    RecordingResponse,
    Evaluating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// `start_session`
    Start,
    /// Call duration plus grace period elapsed
    CallFinished,
    /// First note-on while waiting
    FirstNoteOn,
    /// No note-on within the maximum wait
    WaitExpired,
    /// Fixed-length recording window elapsed
    WindowClosed,
    /// Evaluator replied, failed or timed out
    EvaluationDone,
    /// Explicit abort or device loss
    Abort,
}

/// How a session turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Evaluated,
    /// Evaluated with the neutral fallback result
    Degraded,
    NoResponse,
    Aborted,
}

impl SessionState {
    /// Next state for `event`, or `None` when the event does not apply here
    pub fn on(self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (S::Idle, E::Start) => Some(S::PlayingCall),
            (S::PlayingCall, E::CallFinished) => Some(S::WaitingForResponse),
            (S::WaitingForResponse, E::FirstNoteOn) => Some(S::RecordingResponse),
            (S::WaitingForResponse, E::WaitExpired) => Some(S::Idle),
            (S::RecordingResponse, E::WindowClosed) => Some(S::Evaluating),
            (S::Evaluating, E::EvaluationDone) => Some(S::Idle),
            (S::Idle, E::Abort) => None,
            (_, E::Abort) => Some(S::Idle),
            _ => None,
        }
    }

    pub fn is_idle(self) -> bool {
        self == SessionState::Idle
    }

    /// Whether incoming note events are meaningful in this state
    pub fn accepts_input(self) -> bool {
        matches!(
            self,
            SessionState::WaitingForResponse | SessionState::RecordingResponse
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::PlayingCall => "playing call",
            SessionState::WaitingForResponse => "waiting for response",
            SessionState::RecordingResponse => "recording response",
            SessionState::Evaluating => "evaluating",
        };
        f.write_str(name)
    }
}
