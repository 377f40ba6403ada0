//! Configuration management for mbackd
//!
//! Handles loading and validation of the JSON daemon configuration.
//! Configuration is stored at `~/.config/mbackd/config.json`.
//!
//! The two feedback settings (vibration strength, touch sound volume) are
//! not part of this file; they live in the settings store so they can change
//! while the daemon runs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::RingerMode;
use crate::event::TARGET_SCAN_CODE;
use crate::haptic::DEFAULT_TIMED_OUTPUT_PATH;

// ============================================================================
// Constants
// ============================================================================

/// Default config directory name
const CONFIG_DIR: &str = "mbackd";

/// Default config file name
const CONFIG_FILE: &str = "config.json";

/// Default maximum volume of the music stream
const DEFAULT_MAX_VOLUME: i32 = 15;

// ============================================================================
// Input device
// ============================================================================

/// Which input device to listen on
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Explicit event device path (e.g. /dev/input/event3)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Device name as reported by the kernel (e.g. "gpio-keys")
    #[serde(default)]
    pub name: Option<String>,
}

// ============================================================================
// Vibrator
// ============================================================================

/// Vibration backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VibratorBackend {
    /// evdev device with FF_RUMBLE
    #[default]
    ForceFeedback,
    /// sysfs timed_output enable node
    TimedOutput,
    /// No vibration hardware
    None,
}

/// Vibration backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VibratorConfig {
    #[serde(default)]
    pub backend: VibratorBackend,

    /// Force feedback device path; discovered when unset
    #[serde(default)]
    pub device_path: Option<PathBuf>,

    /// timed_output enable node
    #[serde(default = "default_timed_output_path")]
    pub timed_output_path: PathBuf,
}

fn default_timed_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_TIMED_OUTPUT_PATH)
}

impl Default for VibratorConfig {
    fn default() -> Self {
        Self {
            backend: VibratorBackend::ForceFeedback,
            device_path: None,
            timed_output_path: default_timed_output_path(),
        }
    }
}

// ============================================================================
// Sound
// ============================================================================

/// Touch sound configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundConfig {
    /// Player executable, invoked as `<player> --volume=N <file>`
    #[serde(default = "default_player")]
    pub player: String,

    /// Sound file for the navigation cue
    #[serde(default = "default_effect_file")]
    pub effect_file: PathBuf,

    /// Number of volume steps on the music stream
    #[serde(default = "default_max_volume")]
    pub max_volume: i32,

    /// Ringer mode at startup (changeable over D-Bus)
    #[serde(default)]
    pub ringer_mode: RingerMode,
}

fn default_player() -> String {
    "paplay".to_string()
}

fn default_effect_file() -> PathBuf {
    PathBuf::from("/usr/share/sounds/freedesktop/stereo/audio-volume-change.oga")
}

fn default_max_volume() -> i32 {
    DEFAULT_MAX_VOLUME
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            player: default_player(),
            effect_file: default_effect_file(),
            max_volume: DEFAULT_MAX_VOLUME,
            ringer_mode: RingerMode::Normal,
        }
    }
}

impl SoundConfig {
    /// Validate values that would make every cue fail
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_volume <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "sound.max_volume must be positive, got {}",
                self.max_volume
            )));
        }
        if self.player.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "sound.player must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Main Configuration
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scan code of the key to watch
    #[serde(default = "default_scan_code")]
    pub scan_code: u16,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub vibrator: VibratorConfig,

    #[serde(default)]
    pub sound: SoundConfig,

    /// Settings store path; `~/.config/mbackd/settings.json` when unset
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
}

fn default_scan_code() -> u16 {
    TARGET_SCAN_CODE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_code: TARGET_SCAN_CODE,
            device: DeviceConfig::default(),
            vibrator: VibratorConfig::default(),
            sound: SoundConfig::default(),
            settings_path: None,
        }
    }
}

impl Config {
    /// Get the default config directory path
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(CONFIG_DIR))
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load configuration from the default location
    ///
    /// Returns default config if file doesn't exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_config_path() {
            Some(path) => Self::load(&path),
            None => {
                tracing::warn!("Could not determine config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from file path
    ///
    /// Returns default config if file doesn't exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        let config: Config = serde_json::from_str(&contents).map_err(ConfigError::ParseError)?;

        config.sound.validate()?;

        tracing::info!(
            path = %path.display(),
            scan_code = config.scan_code,
            vibrator = ?config.vibrator.backend,
            ringer_mode = %config.sound.ringer_mode,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Settings store location: configured path or the per-user default
    pub fn settings_path(&self) -> Option<PathBuf> {
        self.settings_path
            .clone()
            .or_else(crate::settings::JsonSettingsStore::default_path)
    }
}

/// Expand a leading `~/` against the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration error type
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading/writing file
    IoError(std::io::Error),
    /// JSON parsing error
    ParseError(serde_json::Error),
    /// Validation error
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "I/O error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(e) => Some(e),
            ConfigError::ValidationError(_) => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
