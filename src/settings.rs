//! Persisted user settings
//!
//! Two integer settings drive the feedback actions:
//! - `vibration_strength`: pulse length in milliseconds (<= 0 disables vibration)
//! - `touch_sound_volume`: cue volume on the output stream's volume scale
//!
//! Values are read through a [`SettingsStore`] on every trigger, so edits
//! made by another process take effect on the next key press.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;

// ============================================================================
// Constants
// ============================================================================

/// Key for the vibration pulse duration
pub const KEY_VIBRATION_STRENGTH: &str = "vibration_strength";

/// Key for the touch sound volume
pub const KEY_TOUCH_SOUND_VOLUME: &str = "touch_sound_volume";

/// Default vibration pulse duration in milliseconds
pub const DEFAULT_VIBRATION_STRENGTH: i32 = 110;

/// Default touch sound volume level
pub const DEFAULT_TOUCH_SOUND_VOLUME: i32 = 10;

/// Settings directory name
const SETTINGS_DIR: &str = "mbackd";

/// Settings file name
const SETTINGS_FILE: &str = "settings.json";

// ============================================================================
// Store trait
// ============================================================================

/// Key-value store of integer settings
pub trait SettingsStore: Send + Sync {
    /// Read a value; `Ok(None)` means the key has never been set
    fn get_int(&self, key: &str) -> Result<Option<i32>, SettingsError>;

    /// Write a value
    fn put_int(&self, key: &str, value: i32) -> Result<(), SettingsError>;
}

/// In-memory store, used by tests and `--no-persist` runs
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<BTreeMap<String, i32>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_int(&self, key: &str) -> Result<Option<i32>, SettingsError> {
        let values = self.values.lock().map_err(|_| SettingsError::Poisoned)?;
        Ok(values.get(key).copied())
    }

    fn put_int(&self, key: &str, value: i32) -> Result<(), SettingsError> {
        let mut values = self.values.lock().map_err(|_| SettingsError::Poisoned)?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// File-backed store holding a flat JSON object of integers
///
/// The file is re-read on every lookup. A missing file reads as empty, and a
/// value that is not a 32-bit integer reads as unset. Writes go through a
/// temporary file renamed over the target.
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonSettingsStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Default settings path (`~/.config/mbackd/settings.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(SETTINGS_DIR).join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the file as a JSON object; values are checked per key
    fn read_all(&self) -> Result<Map<String, Value>, SettingsError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let contents = fs::read_to_string(&self.path).map_err(SettingsError::IoError)?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&contents).map_err(SettingsError::ParseError)
    }

    /// Replace the file in one rename so readers never see a partial write
    fn write_all(&self, values: &Map<String, Value>) -> Result<(), SettingsError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(SettingsError::IoError)?;

        let contents = serde_json::to_string_pretty(values).map_err(SettingsError::ParseError)?;
        let mut temp = NamedTempFile::new_in(dir).map_err(SettingsError::IoError)?;
        temp.write_all(contents.as_bytes()).map_err(SettingsError::IoError)?;
        temp.persist(&self.path)
            .map_err(|e| SettingsError::IoError(e.error))?;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get_int(&self, key: &str) -> Result<Option<i32>, SettingsError> {
        let values = self.read_all()?;
        let value = match values.get(key) {
            Some(value) => value,
            None => return Ok(None),
        };

        match value.as_i64().and_then(|v| i32::try_from(v).ok()) {
            Some(v) => Ok(Some(v)),
            None => {
                tracing::warn!(key, value = %value, "Setting is not a 32-bit integer, treating as unset");
                Ok(None)
            }
        }
    }

    fn put_int(&self, key: &str, value: i32) -> Result<(), SettingsError> {
        let _guard = self.write_lock.lock().map_err(|_| SettingsError::Poisoned)?;

        let mut values = self.read_all()?;
        values.insert(key.to_string(), Value::from(value));
        self.write_all(&values)?;

        tracing::debug!(path = %self.path.display(), key, value, "Setting saved");
        Ok(())
    }
}

// ============================================================================
// Typed accessor
// ============================================================================

/// Typed access to the two feedback settings with their defaults
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn SettingsStore>,
}

impl Settings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Settings backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySettingsStore::new()))
    }

    /// Vibration pulse duration in milliseconds (default 110)
    pub fn vibration_strength(&self) -> i32 {
        self.get_or_default(KEY_VIBRATION_STRENGTH, DEFAULT_VIBRATION_STRENGTH)
    }

    pub fn set_vibration_strength(&self, value: i32) -> Result<(), SettingsError> {
        self.store.put_int(KEY_VIBRATION_STRENGTH, value)
    }

    /// Touch sound volume level (default 10)
    pub fn touch_sound_volume(&self) -> i32 {
        self.get_or_default(KEY_TOUCH_SOUND_VOLUME, DEFAULT_TOUCH_SOUND_VOLUME)
    }

    pub fn set_touch_sound_volume(&self, value: i32) -> Result<(), SettingsError> {
        self.store.put_int(KEY_TOUCH_SOUND_VOLUME, value)
    }

    fn get_or_default(&self, key: &str, default: i32) -> i32 {
        match self.store.get_int(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key, error = %e, default, "Failed to read setting, using default");
                default
            }
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings").finish_non_exhaustive()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Settings store error type
#[derive(Debug)]
pub enum SettingsError {
    /// I/O error reading/writing the settings file
    IoError(std::io::Error),
    /// Settings file is not a JSON object of integers
    ParseError(serde_json::Error),
    /// A writer panicked while holding the store lock
    Poisoned,
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::IoError(e) => write!(f, "I/O error: {}", e),
            SettingsError::ParseError(e) => write!(f, "Parse error: {}", e),
            SettingsError::Poisoned => write!(f, "Settings lock poisoned"),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::IoError(e) => Some(e),
            SettingsError::ParseError(e) => Some(e),
            SettingsError::Poisoned => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
