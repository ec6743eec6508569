// Music Trainer - Library exports for tests and benchmarks

pub mod audio;
pub mod config;
pub mod connection;
pub mod error;
pub mod messaging;
pub mod midi;
pub mod sequencer;
pub mod session;
pub mod synth;

// Re-export commonly used types for convenience
pub use audio::engine::AudioEngine;
pub use audio::renderer::{Renderer, RendererSettings};
pub use config::{SessionSettings, TrainerConfig};
pub use error::{Result, TrainerError};
pub use messaging::channels::{
    create_note_event_channel, create_notification_channel, create_render_channel,
};
pub use midi::capture::{MidiBackend, MidiCapture, MidirBackend};
pub use midi::event::{MidiEvent, RawMidiEvent};
pub use midi::simulated::SimulatedMidiBackend;
pub use sequencer::scheduler::PhraseScheduler;
pub use sequencer::{ManualClock, MonotonicClock, Note, Phrase, PhraseMetadata, Tempo, TransportClock};
pub use session::{SessionController, SessionOutcome, SessionState};
pub use synth::envelope::AdsrParams;
pub use synth::oscillator::WaveformType;
