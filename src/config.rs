// Configuration - Engine settings loaded once per process, snapshotted per session
//
// Files are RON (default) or JSON, picked by extension. Every field has a default
// so partial files are accepted.

use crate::connection::reconnect::{ReconnectPolicy, ReconnectionStrategy};
use crate::error::{Result, TrainerError};
use crate::sequencer::beat_pattern::Genre;
use crate::synth::envelope::AdsrParams;
use crate::synth::oscillator::WaveformType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for the polyphony cap (the voice pool holds twice this many voices)
pub const MAX_POLYPHONY: usize = 32;

const CONFIG_DIR_NAME: &str = "music_trainer";
const CONFIG_FILE_NAME: &str = "config.ron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output buffer size requested from the device (frames)
    pub buffer_size: u32,
    pub master_volume: f32,
    /// Maximum number of held voices before the oldest is force-released
    pub polyphony: usize,
    pub waveform: WaveformType,
    pub adsr: AdsrParams,
    pub trigger_queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_size: 512,
            master_volume: 0.3,
            polyphony: 16,
            waveform: WaveformType::Sine,
            adsr: AdsrParams::default(),
            trigger_queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Port to open; `None` picks the first available port
    pub device_name: Option<String>,
    pub auto_connect: bool,
    /// MIDI channel filter (1-16); `None` accepts every channel
    pub input_channel: Option<u8>,
    pub note_queue_capacity: usize,
    pub monitor_interval_ms: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            auto_connect: true,
            input_channel: None,
            note_queue_capacity: 512,
            monitor_interval_ms: 500,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeConfig {
    pub min_tempo: f64,
    pub max_tempo: f64,
    /// Overrides the phrase tempo when set
    pub tempo_override: Option<f64>,
    /// Silence after the call before listening starts (seconds)
    pub grace_period: f64,
    /// Longest wait for the first note of a response (seconds)
    pub max_wait: f64,
    pub evaluation_timeout: f64,
    pub beat_enabled: bool,
    pub beat_genre: Genre,
    pub beat_volume: f32,
    /// Directory holding kick.wav / snare.wav / hihat.wav; synthesized kit when absent
    pub drum_samples_dir: Option<PathBuf>,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            min_tempo: 60.0,
            max_tempo: 180.0,
            tempo_override: None,
            grace_period: 0.5,
            max_wait: 10.0,
            evaluation_timeout: 10.0,
            beat_enabled: true,
            beat_genre: Genre::ModalJazz,
            beat_volume: 1.0,
            drum_samples_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub audio: AudioConfig,
    pub midi: MidiConfig,
    pub practice: PracticeConfig,
}

/// Per-session snapshot of the settings the control context needs.
/// Taken at `start_session`; later config edits do not reach a running session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub min_tempo: f64,
    pub max_tempo: f64,
    pub tempo_override: Option<f64>,
    pub grace_period: f64,
    pub max_wait: f64,
    pub evaluation_timeout: f64,
    pub beat_enabled: bool,
    pub beat_genre: Genre,
}

impl TrainerConfig {
    /// Default location: `<config dir>/music_trainer/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from a RON or JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: TrainerConfig = if is_json(path) {
            serde_json::from_str(&data).map_err(|e| {
                TrainerError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            ron::from_str(&data).map_err(|e| {
                TrainerError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults when the file
    /// is missing or unreadable
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            log::info!("No config directory available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save as RON (or JSON when the extension says so), creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| TrainerError::Config(format!("Failed to serialize to JSON: {}", e)))?
        } else {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| TrainerError::Config(format!("Failed to serialize to RON: {}", e)))?
        };

        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let practice = &self.practice;
        if !(1.0..=999.0).contains(&practice.min_tempo)
            || !(1.0..=999.0).contains(&practice.max_tempo)
            || practice.min_tempo > practice.max_tempo
        {
            return Err(TrainerError::Config(format!(
                "tempo range {}-{} is invalid",
                practice.min_tempo, practice.max_tempo
            )));
        }
        if let Some(tempo) = practice.tempo_override {
            if !(practice.min_tempo..=practice.max_tempo).contains(&tempo) {
                return Err(TrainerError::Config(format!(
                    "tempo override {} outside {}-{}",
                    tempo, practice.min_tempo, practice.max_tempo
                )));
            }
        }
        for (name, value) in [
            ("grace_period", practice.grace_period),
            ("max_wait", practice.max_wait),
            ("evaluation_timeout", practice.evaluation_timeout),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(TrainerError::Config(format!("{} must be >= 0", name)));
            }
        }

        if !(1..=MAX_POLYPHONY).contains(&self.audio.polyphony) {
            return Err(TrainerError::Config(format!(
                "polyphony must be between 1 and {}",
                MAX_POLYPHONY
            )));
        }
        if self.audio.trigger_queue_capacity == 0 || self.midi.note_queue_capacity == 0 {
            return Err(TrainerError::Config(
                "queue capacities must be > 0".to_string(),
            ));
        }
        if let Some(channel) = self.midi.input_channel {
            if !(1..=16).contains(&channel) {
                return Err(TrainerError::Config(format!(
                    "MIDI channel {} outside 1-16",
                    channel
                )));
            }
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        let practice = &self.practice;
        SessionSettings {
            min_tempo: practice.min_tempo,
            max_tempo: practice.max_tempo,
            tempo_override: practice.tempo_override,
            grace_period: practice.grace_period,
            max_wait: practice.max_wait,
            evaluation_timeout: practice.evaluation_timeout,
            beat_enabled: practice.beat_enabled,
            beat_genre: practice.beat_genre,
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.midi.monitor_interval_ms.max(10))
    }

    pub fn reconnection_strategy(&self) -> ReconnectionStrategy {
        self.midi.reconnect.strategy()
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
