// Commands - Render commands (control context → audio callback) and
// control messages (capture monitor / evaluator worker → control context)

use crate::error::Result;
use crate::sequencer::beat_pattern::Genre;
use crate::session::evaluator::EvaluationResult;

/// One scheduled synthesizer note, in transport beats
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceTrigger {
    pub pitch: u8,
    pub velocity: u8,
    /// Transport beat at which the voice starts
    pub beat: f64,
    /// Held length in beats before release begins
    pub duration_beats: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderCommand {
    /// Drop pending triggers, release every sounding voice and stop the
    /// beat loop. Drum hits already sounding ring out.
    Reset,
    Trigger(VoiceTrigger),
    StartBeatLoop(Genre),
    StopBeatLoop,
}

/// Messages into the session control context from other threads
#[derive(Debug)]
pub enum ControlMessage {
    /// The capture monitor saw the connected port disappear
    DeviceLost { device: String },
    DeviceReconnected { device: String },
    /// Evaluator worker finished; `generation` identifies the session turn
    EvaluationFinished {
        generation: u64,
        result: Result<EvaluationResult>,
    },
}
