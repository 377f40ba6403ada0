//! mbackd Library
//!
//! Public API for testing and integration.

pub mod audio;
pub mod config;
pub mod dbus;
pub mod event;
pub mod feedback;
pub mod haptic;
pub mod handler;
pub mod input;
pub mod settings;

/// Re-export commonly used types
pub use audio::{new_shared_ringer_mode, AudioOutput, AudioStream, CommandSoundPlayer, RingerMode, SharedRingerMode, SoundEffect};
pub use config::{Config, ConfigError, VibratorBackend};
pub use dbus::{init_dbus_service, MBackService, DBUS_INTERFACE, DBUS_NAME, DBUS_PATH};
pub use event::{EventTime, KeyAction, KeyEvent, TARGET_SCAN_CODE};
pub use feedback::{volume_fraction, FeedbackDispatcher, FeedbackError, FeedbackOutcome};
pub use haptic::{Amplitude, ForceFeedbackVibrator, TimedOutputVibrator, Vibrator};
pub use handler::KeyHandler;
pub use input::{DeviceInfo, DeviceSelector, InputError, InputHandler};
pub use settings::{JsonSettingsStore, MemorySettingsStore, Settings, SettingsError, SettingsStore};
