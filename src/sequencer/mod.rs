// Sequencer module
// Musical time, the transport, phrase scheduling and response recording

pub mod beat_pattern;
pub mod clock;
pub mod note;
pub mod recorder;
pub mod scheduler;
pub mod timeline;
pub mod transport;

pub use beat_pattern::{BeatPattern, DrumSound, Genre};
pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use note::{Note, Phrase, PhraseMetadata, RecordedPhrase};
pub use timeline::{BEATS_PER_BAR, Tempo};
pub use transport::{TransportClock, TransportReader, TransportSnapshot};
