// Error types for the call-and-response engine
//
// One enum for the whole crate. Control-context operations return it
// synchronously; the audio callback never produces one.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("MIDI device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to connect to MIDI device '{device}': {reason}")]
    ConnectionFailed { device: String, reason: String },

    #[error("Note event queue overflow: {dropped} event(s) dropped")]
    QueueOverflow { dropped: u64 },

    #[error("Invalid tempo: {0} BPM")]
    InvalidTempo(f64),

    #[error("Phrase has no notes")]
    EmptyPhrase,

    #[error("Recording window already armed")]
    AlreadyRecording,

    #[error("Recording window is not armed")]
    NotRecording,

    #[error("A session is already in progress")]
    SessionInProgress,

    #[error("No response from the musician")]
    NoResponse,

    #[error("Session aborted: {0}")]
    SessionAborted(String),

    #[error("Evaluation unavailable: {0}")]
    EvaluationUnavailable(String),

    #[error("Invalid note: {0}")]
    InvalidNote(String),

    #[error("Invalid phrase: {0}")]
    InvalidPhrase(String),

    #[error("Trigger queue full: {needed} slots needed, {available} available")]
    TriggerQueueFull { needed: usize, available: usize },

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl TrainerError {
    /// Errors after which the current session keeps running
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TrainerError::QueueOverflow { .. } | TrainerError::EvaluationUnavailable(_)
        )
    }

    /// Errors that end the current session (but never the process)
    pub fn is_session_terminal(&self) -> bool {
        matches!(self, TrainerError::NoResponse | TrainerError::SessionAborted(_))
    }
}

pub type Result<T> = std::result::Result<T, TrainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(TrainerError::QueueOverflow { dropped: 3 }.is_recoverable());
        assert!(TrainerError::EvaluationUnavailable("timeout".into()).is_recoverable());
        assert!(!TrainerError::EmptyPhrase.is_recoverable());

        assert!(TrainerError::NoResponse.is_session_terminal());
        assert!(TrainerError::SessionAborted("device lost".into()).is_session_terminal());
        assert!(!TrainerError::SessionInProgress.is_session_terminal());
    }

    #[test]
    fn test_error_messages() {
        let err = TrainerError::ConnectionFailed {
            device: "Keystation".to_string(),
            reason: "busy".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to connect to MIDI device 'Keystation': busy"
        );
        assert_eq!(
            TrainerError::InvalidTempo(-5.0).to_string(),
            "Invalid tempo: -5 BPM"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TrainerError = io.into();
        assert!(matches!(err, TrainerError::Io(_)));
    }
}
