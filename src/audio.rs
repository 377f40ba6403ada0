//! Audio output for the touch sound cue
//!
//! The dispatcher needs three things from the audio side: the current
//! ringer mode, the maximum volume of an output stream, and a way to play a
//! short UI sound effect at a given volume fraction. [`CommandSoundPlayer`]
//! provides them on a desktop Linux session by handing a sound file to an
//! external player such as `paplay`.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::feedback::FeedbackError;

/// `paplay` expresses volume on a linear 0..=65536 scale
const PAPLAY_VOLUME_NORM: f32 = 65536.0;

/// Device-wide policy deciding whether UI sounds may play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RingerMode {
    #[default]
    Normal,
    Vibrate,
    Silent,
}

impl RingerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RingerMode::Normal => "normal",
            RingerMode::Vibrate => "vibrate",
            RingerMode::Silent => "silent",
        }
    }
}

impl std::fmt::Display for RingerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RingerMode {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(RingerMode::Normal),
            "vibrate" => Ok(RingerMode::Vibrate),
            "silent" => Ok(RingerMode::Silent),
            other => Err(FeedbackError::InvalidArgument(format!(
                "unknown ringer mode '{}'",
                other
            ))),
        }
    }
}

/// Output stream whose volume scale a cue is measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStream {
    Music,
}

/// UI sound effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEffect {
    /// Short "focus moved down" navigation click
    FocusNavigationDown,
}

/// Audio capabilities needed for the touch sound
pub trait AudioOutput: Send + Sync {
    fn ringer_mode(&self) -> RingerMode;

    fn max_volume(&self, stream: AudioStream) -> Result<i32, FeedbackError>;

    /// Start playing `effect` at `volume` (0.0..=1.0) without waiting for it
    fn play_effect(&self, effect: SoundEffect, volume: f32) -> Result<(), FeedbackError>;
}

// ============================================================================
// Shared ringer mode
// ============================================================================

/// Ringer mode shared between the D-Bus service and the sound player
pub type SharedRingerMode = Arc<RwLock<RingerMode>>;

/// Create a shared ringer mode with the given initial value
pub fn new_shared_ringer_mode(mode: RingerMode) -> SharedRingerMode {
    Arc::new(RwLock::new(mode))
}

// ============================================================================
// Command-based player
// ============================================================================

/// Plays sound effects by spawning an external player process
pub struct CommandSoundPlayer {
    player: String,
    effect_file: PathBuf,
    music_max_volume: i32,
    ringer_mode: SharedRingerMode,
    /// Players still running; reaped on the next play
    children: Mutex<Vec<Child>>,
}

impl CommandSoundPlayer {
    pub fn new(
        player: impl Into<String>,
        effect_file: impl Into<PathBuf>,
        music_max_volume: i32,
        ringer_mode: SharedRingerMode,
    ) -> Self {
        Self {
            player: player.into(),
            effect_file: effect_file.into(),
            music_max_volume,
            ringer_mode,
            children: Mutex::new(Vec::new()),
        }
    }

    /// Build from the `sound` section of the daemon config
    pub fn from_config(config: &crate::config::SoundConfig, ringer_mode: SharedRingerMode) -> Self {
        Self::new(
            config.player.clone(),
            config.effect_file.clone(),
            config.max_volume,
            ringer_mode,
        )
    }

    fn effect_path(&self, effect: SoundEffect) -> &PathBuf {
        match effect {
            SoundEffect::FocusNavigationDown => &self.effect_file,
        }
    }

    /// Arguments for the player process
    pub fn player_args(&self, effect: SoundEffect, volume: f32) -> Vec<String> {
        let level = (volume.clamp(0.0, 1.0) * PAPLAY_VOLUME_NORM).round() as u32;
        vec![
            format!("--volume={}", level),
            self.effect_path(effect).to_string_lossy().into_owned(),
        ]
    }

    fn reap_finished(children: &mut Vec<Child>) {
        children.retain_mut(|child| match child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping unpollable sound player");
                false
            }
        });
    }
}

impl AudioOutput for CommandSoundPlayer {
    fn ringer_mode(&self) -> RingerMode {
        // A poisoned lock still holds the last written mode
        match self.ringer_mode.read() {
            Ok(mode) => *mode,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn max_volume(&self, stream: AudioStream) -> Result<i32, FeedbackError> {
        match stream {
            AudioStream::Music => Ok(self.music_max_volume),
        }
    }

    fn play_effect(&self, effect: SoundEffect, volume: f32) -> Result<(), FeedbackError> {
        let path = self.effect_path(effect);
        if !path.exists() {
            return Err(FeedbackError::Unavailable(format!(
                "sound file {} not found",
                path.display()
            )));
        }

        let child = Command::new(&self.player)
            .args(self.player_args(effect, volume))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(FeedbackError::from_io)?;

        tracing::debug!(player = %self.player, pid = child.id(), volume, "Sound effect started");

        let mut children = self
            .children
            .lock()
            .map_err(|_| FeedbackError::Unavailable("player lock poisoned".to_string()))?;
        Self::reap_finished(&mut children);
        children.push(child);

        Ok(())
    }
}
