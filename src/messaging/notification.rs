// Notifications - Display-layer event stream
//
// Emitted by the control context, never by the audio callback. The display side
// drains them at its own pace; nothing is expected back.

use crate::connection::status::DeviceStatus;
use crate::sequencer::note::Note;
use crate::session::state::{OutcomeKind, SessionState};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Subsystem the notification comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    Session,
    Playback,
    Recording,
    Midi,
    Audio,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationKind {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// A call note reached its trigger time (seconds since the call started)
    NoteTriggered {
        pitch: u8,
        velocity: u8,
        time: f64,
    },
    NoteRecorded(Note),
    SessionFinished(OutcomeKind),
    DeviceStatusChanged(DeviceStatus),
    QueueOverflow {
        dropped: u64,
    },
    Message(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub category: NotificationCategory,
    pub kind: NotificationKind,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        category: NotificationCategory,
        kind: NotificationKind,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            level,
            category,
            kind,
            timestamp,
        }
    }

    pub fn info(category: NotificationCategory, message: String) -> Self {
        Self::new(NotificationLevel::Info, category, NotificationKind::Message(message))
    }

    pub fn warning(category: NotificationCategory, message: String) -> Self {
        Self::new(NotificationLevel::Warning, category, NotificationKind::Message(message))
    }

    pub fn error(category: NotificationCategory, message: String) -> Self {
        Self::new(NotificationLevel::Error, category, NotificationKind::Message(message))
    }

    pub fn state_changed(from: SessionState, to: SessionState) -> Self {
        Self::new(
            NotificationLevel::Info,
            NotificationCategory::Session,
            NotificationKind::StateChanged { from, to },
        )
    }

    pub fn note_triggered(pitch: u8, velocity: u8, time: f64) -> Self {
        Self::new(
            NotificationLevel::Info,
            NotificationCategory::Playback,
            NotificationKind::NoteTriggered {
                pitch,
                velocity,
                time,
            },
        )
    }

    pub fn note_recorded(note: Note) -> Self {
        Self::new(
            NotificationLevel::Info,
            NotificationCategory::Recording,
            NotificationKind::NoteRecorded(note),
        )
    }

    pub fn session_finished(outcome: OutcomeKind) -> Self {
        let level = match outcome {
            OutcomeKind::Evaluated => NotificationLevel::Info,
            OutcomeKind::Degraded | OutcomeKind::NoResponse => NotificationLevel::Warning,
            OutcomeKind::Aborted => NotificationLevel::Error,
        };
        Self::new(
            level,
            NotificationCategory::Session,
            NotificationKind::SessionFinished(outcome),
        )
    }

    pub fn device_status(status: DeviceStatus) -> Self {
        let level = match status {
            DeviceStatus::Error => NotificationLevel::Error,
            DeviceStatus::Disconnected => NotificationLevel::Warning,
            _ => NotificationLevel::Info,
        };
        Self::new(
            level,
            NotificationCategory::Midi,
            NotificationKind::DeviceStatusChanged(status),
        )
    }

    pub fn queue_overflow(dropped: u64) -> Self {
        Self::new(
            NotificationLevel::Warning,
            NotificationCategory::Midi,
            NotificationKind::QueueOverflow { dropped },
        )
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NotificationKind::StateChanged { from, to } => write!(f, "{:?} -> {:?}", from, to),
            NotificationKind::NoteTriggered {
                pitch,
                velocity,
                time,
            } => write!(f, "play {} vel {} at {:.3}s", pitch, velocity, time),
            NotificationKind::NoteRecorded(note) => write!(
                f,
                "recorded {} vel {} at beat {:.2} for {:.2} beats",
                note.note_name(),
                note.velocity(),
                note.start(),
                note.duration()
            ),
            NotificationKind::SessionFinished(outcome) => write!(f, "session finished: {:?}", outcome),
            NotificationKind::DeviceStatusChanged(status) => write!(f, "MIDI device {}", status),
            NotificationKind::QueueOverflow { dropped } => {
                write!(f, "{} MIDI event(s) dropped", dropped)
            }
            NotificationKind::Message(message) => f.write_str(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_creation() {
        let notif = Notification::error(NotificationCategory::Midi, "Test error".to_string());

        assert_eq!(notif.level, NotificationLevel::Error);
        assert_eq!(notif.category, NotificationCategory::Midi);
        assert_eq!(notif.kind, NotificationKind::Message("Test error".to_string()));
        assert!(notif.timestamp > 0);
    }

    #[test]
    fn test_outcome_levels() {
        assert_eq!(
            Notification::session_finished(OutcomeKind::Evaluated).level,
            NotificationLevel::Info
        );
        assert_eq!(
            Notification::session_finished(OutcomeKind::NoResponse).level,
            NotificationLevel::Warning
        );
        assert_eq!(
            Notification::session_finished(OutcomeKind::Aborted).level,
            NotificationLevel::Error
        );
    }

    #[test]
    fn test_display() {
        let notif = Notification::state_changed(SessionState::Idle, SessionState::PlayingCall);
        assert_eq!(notif.to_string(), "Idle -> PlayingCall");

        let notif = Notification::queue_overflow(4);
        assert_eq!(notif.to_string(), "4 MIDI event(s) dropped");
    }
}
