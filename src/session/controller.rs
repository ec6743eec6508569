// Session controller - The control context of a call-and-response turn
//
// Everything that changes session state goes through `poll()` on one thread:
// captured notes, timer deadlines and messages from other threads. Notes and
// deadlines are handled in timestamp order; windows are half-open, so a note
// stamped exactly at a deadline is handled after the timer has fired.
//
// There is a single pending timer. Each transition replaces it and bumps the
// generation, which also invalidates evaluator replies from an earlier turn.

use super::evaluator::{EvaluationResult, Evaluator, PerformanceSummary};
use super::state::{OutcomeKind, SessionEvent, SessionState};
use crate::config::SessionSettings;
use crate::connection::status::DeviceStatus;
use crate::error::{Result, TrainerError};
use crate::messaging::channels::{NoteEventReceiver, NotificationProducer};
use crate::messaging::command::ControlMessage;
use crate::messaging::notification::Notification;
use crate::midi::event::RawMidiEvent;
use crate::sequencer::clock::SharedClock;
use crate::sequencer::note::{Phrase, RecordedPhrase};
use crate::sequencer::recorder::RecordingAssembler;
use crate::sequencer::scheduler::{PhraseScheduler, Schedule};
use crate::sequencer::timeline::Tempo;
use crate::sequencer::transport::TransportClock;
use crossbeam_channel::{Receiver, Sender};
use ringbuf::traits::Producer;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    CallFinished,
    WaitExpired,
    WindowClosed,
    EvaluationTimeout,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    kind: TimerKind,
    /// Clock time in seconds
    deadline: f64,
    generation: u64,
}

/// Evaluation delivered at the end of a turn
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub result: EvaluationResult,
    /// The evaluator failed or timed out and the neutral result was used
    pub degraded: bool,
    pub recorded: RecordedPhrase,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Evaluated(EvaluationReport),
    NoResponse,
    Aborted { reason: String },
}

impl SessionOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            SessionOutcome::Evaluated(report) if report.degraded => OutcomeKind::Degraded,
            SessionOutcome::Evaluated(_) => OutcomeKind::Evaluated,
            SessionOutcome::NoResponse => OutcomeKind::NoResponse,
            SessionOutcome::Aborted { .. } => OutcomeKind::Aborted,
        }
    }

    /// Taxonomy error for outcomes that did not produce an evaluation
    pub fn as_error(&self) -> Option<TrainerError> {
        match self {
            SessionOutcome::Evaluated(_) => None,
            SessionOutcome::NoResponse => Some(TrainerError::NoResponse),
            SessionOutcome::Aborted { reason } => Some(TrainerError::SessionAborted(reason.clone())),
        }
    }
}

/// State of the turn in progress
struct Turn {
    phrase: Phrase,
    settings: SessionSettings,
    schedule: Schedule,
    /// Transport epoch of the call
    started_at: f64,
    /// Next scheduled note to announce
    next_announced: usize,
    recorded: Option<RecordedPhrase>,
}

pub struct SessionController {
    settings: SessionSettings,
    clock: SharedClock,
    transport: TransportClock,
    scheduler: PhraseScheduler,
    recorder: RecordingAssembler,
    notes: NoteEventReceiver,
    evaluator: Arc<dyn Evaluator>,
    control_tx: Sender<ControlMessage>,
    control_rx: Receiver<ControlMessage>,
    notifications: Option<NotificationProducer>,
    /// Evaluator threads not yet joined, including ones that outlived their timeout
    evaluations: Vec<JoinHandle<()>>,

    state: SessionState,
    generation: u64,
    timer: Option<Timer>,
    turn: Option<Turn>,
    finished: Option<SessionOutcome>,
    last_outcome: Option<SessionOutcome>,
}

impl SessionController {
    pub fn new(
        settings: SessionSettings,
        transport: TransportClock,
        scheduler: PhraseScheduler,
        notes: NoteEventReceiver,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        Self {
            settings,
            clock: transport.clock(),
            transport,
            scheduler,
            recorder: RecordingAssembler::new(),
            notes,
            evaluator,
            control_tx,
            control_rx,
            notifications: None,
            evaluations: Vec::new(),
            state: SessionState::Idle,
            generation: 0,
            timer: None,
            turn: None,
            finished: None,
            last_outcome: None,
        }
    }

    /// Send display events to `producer`
    pub fn with_notifications(mut self, producer: NotificationProducer) -> Self {
        self.notifications = Some(producer);
        self
    }

    /// Settings for the next session; a running session keeps its snapshot
    pub fn set_settings(&mut self, settings: SessionSettings) {
        self.settings = settings;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_outcome(&self) -> Option<&SessionOutcome> {
        self.last_outcome.as_ref()
    }

    /// For threads that report into this controller (device monitor)
    pub fn control_sender(&self) -> Sender<ControlMessage> {
        self.control_tx.clone()
    }

    pub fn transport(&self) -> &TransportClock {
        &self.transport
    }

    /// Evaluator threads still running. A thread whose evaluation timed out
    /// stays here until the evaluator returns.
    pub fn evaluations_in_flight(&self) -> usize {
        self.evaluations.len()
    }

    /// Clock time of the pending timer, if any
    pub fn next_deadline(&self) -> Option<f64> {
        self.timer.map(|t| t.deadline)
    }

    /// Begin a turn: queue the call for playback and start the transport.
    /// Fails without any state change if a session is active, the phrase is
    /// empty, the effective tempo is outside the configured range or the
    /// trigger queue cannot take the whole call.
    pub fn start_session(&mut self, phrase: Phrase) -> Result<Schedule> {
        if self.state.on(SessionEvent::Start).is_none() {
            return Err(TrainerError::SessionInProgress);
        }
        if phrase.is_empty() {
            return Err(TrainerError::EmptyPhrase);
        }

        let settings = self.settings.clone();
        let bpm = settings.tempo_override.unwrap_or(phrase.metadata().tempo);
        let tempo = Tempo::within(bpm, settings.min_tempo, settings.max_tempo)?;
        let genre = settings.beat_enabled.then_some(settings.beat_genre);

        let schedule = self.scheduler.schedule(&phrase, tempo.bpm(), genre)?;
        if let Err(e) = self.transport.start(tempo.bpm()) {
            self.silence();
            return Err(e);
        }

        // Input from before the call is not part of the response
        let stale = self.notes.clear();
        if stale > 0 {
            log::debug!("Discarded {} stale note event(s)", stale);
        }

        let started_at = self.transport.snapshot().epoch;
        let call_end = started_at + schedule.duration_seconds + settings.grace_period;
        log::info!(
            "Session started: {} note(s) at {}, listening from {:.2} s",
            phrase.len(),
            tempo,
            call_end - started_at
        );

        self.finished = None;
        self.turn = Some(Turn {
            phrase,
            settings,
            schedule: schedule.clone(),
            started_at,
            next_announced: 0,
            recorded: None,
        });
        self.commit(SessionEvent::Start);
        self.arm(TimerKind::CallFinished, call_end);
        Ok(schedule)
    }

    /// Abort the active turn. Returns false when idle.
    pub fn abort(&mut self) -> bool {
        self.abort_with("aborted by user")
    }

    /// Process everything that happened up to now. Returns the outcome if the
    /// turn ended during this call.
    pub fn poll(&mut self) -> Option<SessionOutcome> {
        let now = self.clock.now();
        self.reap_evaluations();

        let dropped = self.notes.take_dropped();
        if dropped > 0 {
            let overflow = TrainerError::QueueOverflow { dropped };
            log::warn!("{}", overflow);
            self.notify(Notification::queue_overflow(dropped));
        }

        while let Some(event) = self.notes.try_recv() {
            // Half-open: a deadline at the event's timestamp fires first
            self.fire_timers_until(event.timestamp);
            self.handle_note(event);
        }
        self.fire_timers_until(now);
        self.announce_triggers(now);

        while let Ok(message) = self.control_rx.try_recv() {
            self.handle_control(message);
        }
        // Replies can arm a timer that is already due
        self.fire_timers_until(self.clock.now());

        self.finished.take()
    }

    fn fire_timers_until(&mut self, limit: f64) {
        while let Some(timer) = self.timer {
            if timer.deadline > limit {
                break;
            }
            self.timer = None;
            if timer.generation != self.generation {
                log::trace!("Ignoring stale {:?} timer", timer.kind);
                continue;
            }
            self.fire(timer);
        }
    }

    fn fire(&mut self, timer: Timer) {
        match timer.kind {
            TimerKind::CallFinished => {
                if self.commit(SessionEvent::CallFinished) {
                    let max_wait = self.turn.as_ref().map_or(0.0, |t| t.settings.max_wait);
                    self.arm(TimerKind::WaitExpired, timer.deadline + max_wait);
                }
            }
            TimerKind::WaitExpired => {
                if self.commit(SessionEvent::WaitExpired) {
                    log::info!("No response before the wait timeout");
                    self.finish(SessionOutcome::NoResponse);
                }
            }
            TimerKind::WindowClosed => self.close_window(),
            TimerKind::EvaluationTimeout => {
                log::warn!(
                    "Evaluator timed out, using neutral result ({} evaluator thread(s) still running)",
                    self.evaluations.len()
                );
                self.finish_evaluation(None);
            }
        }
    }

    fn handle_note(&mut self, event: RawMidiEvent) {
        if !self.state.accepts_input() {
            log::trace!("Ignoring note event in state {}", self.state);
            return;
        }
        match self.state {
            SessionState::WaitingForResponse if event.is_note_on => self.begin_recording(event),
            SessionState::RecordingResponse => {
                if let Some(note) = self.recorder.push(event) {
                    self.notify(Notification::note_recorded(note));
                }
            }
            _ => {}
        }
    }

    fn begin_recording(&mut self, first: RawMidiEvent) {
        let Some(turn) = self.turn.as_ref() else {
            return;
        };
        let length = turn.schedule.duration_seconds;
        if let Err(e) = self.recorder.begin_window(first.timestamp, length, turn.schedule.tempo) {
            log::error!("Cannot start recording: {}", e);
            return;
        }
        self.recorder.push(first);
        self.commit(SessionEvent::FirstNoteOn);
        self.arm(TimerKind::WindowClosed, first.timestamp + length);
    }

    fn close_window(&mut self) {
        if self.state.on(SessionEvent::WindowClosed).is_none() {
            return;
        }
        let recorded = match self.recorder.end_window() {
            Ok(recorded) => recorded,
            Err(e) => {
                log::error!("Recording window lost: {}", e);
                self.abort_with("recording window lost");
                return;
            }
        };
        if recorded.truncated_count() > 0 {
            log::debug!("{} note(s) still held at window end", recorded.truncated_count());
        }

        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        let metadata = turn.phrase.metadata();
        let summary = PerformanceSummary {
            target: turn.phrase.clone(),
            recorded: recorded.clone(),
            style: metadata.style.clone(),
            difficulty: metadata.difficulty,
            tempo: turn.schedule.tempo.bpm(),
        };
        let timeout = turn.settings.evaluation_timeout;
        turn.recorded = Some(recorded);

        self.commit(SessionEvent::WindowClosed);
        self.spawn_evaluation(summary, self.generation);
        self.arm(TimerKind::EvaluationTimeout, self.clock.now() + timeout);
    }

    fn spawn_evaluation(&mut self, summary: PerformanceSummary, generation: u64) {
        let evaluator = Arc::clone(&self.evaluator);
        let reply = self.control_tx.clone();
        let spawned = thread::Builder::new()
            .name("evaluator".to_string())
            .spawn(move || {
                let result = evaluator.evaluate(&summary);
                let _ = reply.send(ControlMessage::EvaluationFinished { generation, result });
            });

        match spawned {
            Ok(handle) => self.evaluations.push(handle),
            Err(e) => {
                let _ = self.control_tx.send(ControlMessage::EvaluationFinished {
                    generation,
                    result: Err(TrainerError::EvaluationUnavailable(format!(
                        "cannot start evaluator: {}",
                        e
                    ))),
                });
            }
        }
    }

    /// Join evaluator threads that have returned
    fn reap_evaluations(&mut self) {
        let mut i = 0;
        while i < self.evaluations.len() {
            if !self.evaluations[i].is_finished() {
                i += 1;
                continue;
            }
            let handle = self.evaluations.swap_remove(i);
            if handle.join().is_err() {
                log::error!("Evaluator thread panicked");
            }
        }
    }

    fn handle_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::DeviceLost { device } => {
                self.notify(Notification::device_status(DeviceStatus::Disconnected));
                if !self.state.is_idle() {
                    log::warn!("MIDI device '{}' lost during {}", device, self.state);
                    self.abort_with(&format!("MIDI device '{}' disconnected", device));
                }
            }
            ControlMessage::DeviceReconnected { device } => {
                log::info!("MIDI device '{}' is back", device);
                self.notify(Notification::device_status(DeviceStatus::Connected));
            }
            ControlMessage::EvaluationFinished { generation, result } => {
                if generation != self.generation || self.state != SessionState::Evaluating {
                    log::debug!("Ignoring stale evaluation reply");
                    return;
                }
                match result {
                    Ok(result) => self.finish_evaluation(Some(result)),
                    Err(e) => {
                        log::warn!("Evaluator failed ({}), using neutral result", e);
                        self.finish_evaluation(None);
                    }
                }
            }
        }
    }

    /// `None` means the neutral fallback
    fn finish_evaluation(&mut self, result: Option<EvaluationResult>) {
        if !self.commit(SessionEvent::EvaluationDone) {
            return;
        }
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        let recorded = turn
            .recorded
            .take()
            .unwrap_or_else(|| RecordedPhrase::new(Vec::new(), turn.schedule.tempo.bpm(), 0.0, 0.0, 0));
        let degraded = result.is_none();
        let result =
            result.unwrap_or_else(|| EvaluationResult::neutral(turn.phrase.metadata().difficulty));

        self.finish(SessionOutcome::Evaluated(EvaluationReport {
            result,
            degraded,
            recorded,
        }));
    }

    fn abort_with(&mut self, reason: &str) -> bool {
        if !self.commit(SessionEvent::Abort) {
            return false;
        }
        if self.recorder.abort() {
            log::debug!("Discarded in-progress recording");
        }
        log::warn!("Session aborted: {}", reason);
        self.finish(SessionOutcome::Aborted {
            reason: reason.to_string(),
        });
        true
    }

    /// Common end of turn: silence, stop the transport, publish the outcome
    fn finish(&mut self, outcome: SessionOutcome) {
        self.silence();
        self.transport.stop();
        self.turn = None;
        self.timer = None;

        self.notify(Notification::session_finished(outcome.kind()));
        self.last_outcome = Some(outcome.clone());
        self.finished = Some(outcome);
    }

    fn silence(&mut self) {
        if let Err(e) = self.scheduler.stop_all() {
            log::warn!("Could not queue stop for the renderer: {}", e);
        }
    }

    /// Apply `event` to the state. Bumps the generation and drops the pending
    /// timer on success.
    fn commit(&mut self, event: SessionEvent) -> bool {
        let Some(next) = self.state.on(event) else {
            log::debug!("Event {:?} ignored in state {}", event, self.state);
            return false;
        };
        let from = self.state;
        self.state = next;
        self.generation += 1;
        self.timer = None;
        log::info!("Session: {} -> {}", from, next);
        self.notify(Notification::state_changed(from, next));
        true
    }

    fn arm(&mut self, kind: TimerKind, deadline: f64) {
        self.timer = Some(Timer {
            kind,
            deadline,
            generation: self.generation,
        });
    }

    fn announce_triggers(&mut self, now: f64) {
        let mut due = Vec::new();
        if let Some(turn) = self.turn.as_mut() {
            let elapsed = now - turn.started_at;
            while let Some(note) = turn.schedule.notes.get(turn.next_announced) {
                if note.trigger_time > elapsed {
                    break;
                }
                due.push(Notification::note_triggered(note.pitch, note.velocity, note.trigger_time));
                turn.next_announced += 1;
            }
        }
        for notification in due {
            self.notify(notification);
        }
    }

    fn notify(&mut self, notification: Notification) {
        if let Some(producer) = self.notifications.as_mut() {
            if producer.try_push(notification).is_err() {
                log::trace!("Notification queue full, dropping");
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if !self.state.is_idle() {
            self.abort_with("session controller dropped");
        }
    }
}
