// Phrase scheduler - Turns a phrase into render commands
//
// Trigger times are relative to a fresh transport epoch: beat 0 is the moment
// the session starts the transport. Commands are queued before that, in
// ascending beat order, so the renderer only has to compare against the
// current beat.

use super::beat_pattern::{DrumSound, Genre};
use super::note::Phrase;
use super::timeline::Tempo;
use crate::error::{Result, TrainerError};
use crate::messaging::channels::RenderProducer;
use crate::messaging::command::{RenderCommand, VoiceTrigger};
use ringbuf::traits::{Observer, Producer};

/// One phrase note placed on the clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNote {
    pub pitch: u8,
    pub velocity: u8,
    pub beat: f64,
    pub duration_beats: f64,
    /// Seconds after the transport epoch
    pub trigger_time: f64,
    /// Held length in seconds
    pub duration: f64,
}

/// One drum hit of the beat loop, for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledHit {
    pub sound: DrumSound,
    pub beat: f64,
    pub trigger_time: f64,
}

/// Result of planning one playback
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub notes: Vec<ScheduledNote>,
    pub hits: Vec<ScheduledHit>,
    pub tempo: Tempo,
    pub genre: Option<Genre>,
    pub duration_beats: f64,
    pub duration_seconds: f64,
}

impl Schedule {
    /// Render commands for this schedule: reset, triggers, then the beat loop
    fn commands(&self) -> impl Iterator<Item = RenderCommand> + '_ {
        let triggers = self.notes.iter().map(|n| {
            RenderCommand::Trigger(VoiceTrigger {
                pitch: n.pitch,
                velocity: n.velocity,
                beat: n.beat,
                duration_beats: n.duration_beats,
            })
        });
        std::iter::once(RenderCommand::Reset)
            .chain(triggers)
            .chain(self.genre.map(RenderCommand::StartBeatLoop))
    }

    fn command_count(&self) -> usize {
        1 + self.notes.len() + usize::from(self.genre.is_some())
    }
}

/// Compute trigger times for `phrase` at `bpm` without queueing anything
pub fn plan(phrase: &Phrase, bpm: f64, genre: Option<Genre>) -> Result<Schedule> {
    if phrase.is_empty() {
        return Err(TrainerError::EmptyPhrase);
    }
    let tempo = Tempo::new(bpm)?;

    let notes = phrase
        .notes()
        .iter()
        .map(|note| ScheduledNote {
            pitch: note.pitch(),
            velocity: note.velocity(),
            beat: note.start(),
            duration_beats: note.duration(),
            trigger_time: tempo.beats_to_seconds(note.start()),
            duration: tempo.beats_to_seconds(note.duration()),
        })
        .collect();

    let duration_beats = phrase.duration_beats();
    let hits = genre
        .map(|g| {
            g.pattern()
                .hits_between(0.0, duration_beats)
                .into_iter()
                .map(|(beat, sound)| ScheduledHit {
                    sound,
                    beat,
                    trigger_time: tempo.beats_to_seconds(beat),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Schedule {
        notes,
        hits,
        tempo,
        genre,
        duration_beats,
        duration_seconds: tempo.beats_to_seconds(duration_beats),
    })
}

/// Producer side of the trigger queue
pub struct PhraseScheduler {
    producer: RenderProducer,
}

impl PhraseScheduler {
    pub fn new(producer: RenderProducer) -> Self {
        Self { producer }
    }

    /// Plan `phrase` and queue it for the renderer. All or nothing: if the
    /// queue cannot take every command, nothing is pushed.
    pub fn schedule(&mut self, phrase: &Phrase, bpm: f64, genre: Option<Genre>) -> Result<Schedule> {
        let schedule = plan(phrase, bpm, genre)?;

        let needed = schedule.command_count();
        let available = self.producer.vacant_len();
        if available < needed {
            return Err(TrainerError::TriggerQueueFull { needed, available });
        }

        for command in schedule.commands() {
            // Only the consumer frees slots, so the check above holds
            if self.producer.try_push(command).is_err() {
                return Err(TrainerError::TriggerQueueFull {
                    needed,
                    available: self.producer.vacant_len(),
                });
            }
        }

        log::debug!(
            "Scheduled {} note(s) over {:.2} s at {}",
            schedule.notes.len(),
            schedule.duration_seconds,
            schedule.tempo
        );
        Ok(schedule)
    }

    /// Release every voice and stop the beat loop
    pub fn stop_all(&mut self) -> Result<()> {
        let commands = [RenderCommand::Reset, RenderCommand::StopBeatLoop];
        let available = self.producer.vacant_len();
        if available < commands.len() {
            return Err(TrainerError::TriggerQueueFull {
                needed: commands.len(),
                available,
            });
        }
        for command in commands {
            if self.producer.try_push(command).is_err() {
                return Err(TrainerError::TriggerQueueFull {
                    needed: 1,
                    available: 0,
                });
            }
        }
        Ok(())
    }

    /// Free slots in the trigger queue
    pub fn vacant(&self) -> usize {
        self.producer.vacant_len()
    }
}
