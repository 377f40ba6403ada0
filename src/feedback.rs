//! Feedback dispatch for mBack presses
//!
//! Two independent, best-effort actions run on every accepted press:
//! a vibration pulse and a short touch sound. Each reads its setting fresh,
//! checks live device state, and swallows its own failures. Nothing here
//! returns an error to the key handler.

use std::fmt;
use std::sync::Arc;

use crate::audio::{AudioOutput, AudioStream, RingerMode, SoundEffect};
use crate::haptic::{Amplitude, Vibrator};
use crate::settings::Settings;

/// What a single feedback action ended up doing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedbackOutcome {
    /// Vibration pulse submitted
    Vibrated { duration_ms: u32 },
    /// Sound cue submitted at the given volume fraction
    Played { volume: f32 },
    /// Vibration turned off by its setting
    Disabled,
    /// Ringer mode does not allow UI sounds
    Suppressed(RingerMode),
    /// The backing service was missing or failed; already logged
    Failed,
}

/// Runs the vibration and sound actions
pub struct FeedbackDispatcher {
    settings: Settings,
    vibrator: Option<Arc<dyn Vibrator>>,
    audio: Arc<dyn AudioOutput>,
}

impl FeedbackDispatcher {
    /// Create a dispatcher; `vibrator` is `None` when no vibration device exists
    pub fn new(
        settings: Settings,
        vibrator: Option<Arc<dyn Vibrator>>,
        audio: Arc<dyn AudioOutput>,
    ) -> Self {
        Self {
            settings,
            vibrator,
            audio,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run both actions: vibration first, then sound
    pub fn fire(&self) -> (FeedbackOutcome, FeedbackOutcome) {
        let vibration = self.fire_vibration();
        let sound = self.fire_sound();
        (vibration, sound)
    }

    /// Emit a one-shot pulse of `vibration_strength` milliseconds
    pub fn fire_vibration(&self) -> FeedbackOutcome {
        let duration = self.settings.vibration_strength();
        if duration <= 0 {
            tracing::info!("mBack vibration is disabled");
            return FeedbackOutcome::Disabled;
        }
        let duration_ms = duration as u32;

        let vibrator = match &self.vibrator {
            Some(v) => v,
            None => {
                tracing::error!("No vibrator available, skipping vibration");
                return FeedbackOutcome::Failed;
            }
        };

        match vibrator.emit_one_shot(duration_ms, Amplitude::DEFAULT) {
            Ok(()) => {
                tracing::debug!(duration_ms, "Vibration pulse sent");
                FeedbackOutcome::Vibrated { duration_ms }
            }
            Err(e) => {
                tracing::error!(error = %e, duration_ms, "Vibration failed");
                FeedbackOutcome::Failed
            }
        }
    }

    /// Play the navigation cue, only in normal ringer mode
    pub fn fire_sound(&self) -> FeedbackOutcome {
        let mode = self.audio.ringer_mode();
        if mode != RingerMode::Normal {
            tracing::debug!(ringer_mode = %mode, "Touch sound suppressed by ringer mode");
            return FeedbackOutcome::Suppressed(mode);
        }

        let level = self.settings.touch_sound_volume();
        let max_volume = match self.audio.max_volume(AudioStream::Music) {
            Ok(max) => max,
            Err(e) => {
                tracing::error!(error = %e, "Could not query music stream volume");
                return FeedbackOutcome::Failed;
            }
        };

        let volume = match volume_fraction(level, max_volume) {
            Some(volume) => volume,
            None => {
                tracing::error!(max_volume, "Music stream reports no volume range");
                return FeedbackOutcome::Failed;
            }
        };

        match self.audio.play_effect(SoundEffect::FocusNavigationDown, volume) {
            Ok(()) => {
                tracing::debug!(level, max_volume, volume, "Touch sound played");
                FeedbackOutcome::Played { volume }
            }
            Err(e) => {
                tracing::error!(error = %e, "Touch sound failed");
                FeedbackOutcome::Failed
            }
        }
    }
}

/// Fraction of the stream's range, in floating point and clamped to 0..=1
///
/// Returns `None` when the stream has no usable maximum.
pub fn volume_fraction(level: i32, max_volume: i32) -> Option<f32> {
    if max_volume <= 0 {
        return None;
    }
    Some((level as f32 / max_volume as f32).clamp(0.0, 1.0))
}

// ============================================================================
// Error Types
// ============================================================================

/// Failure of a vibration or audio backend
#[derive(Debug)]
pub enum FeedbackError {
    /// Backend device or service is not present
    Unavailable(String),
    /// Device exists but cannot do what was asked
    Unsupported(String),
    /// Permission denied accessing the device
    PermissionDenied,
    /// Caller passed a value the backend does not accept
    InvalidArgument(String),
    /// I/O error talking to the backend
    IoError(std::io::Error),
}

impl FeedbackError {
    /// Classify an I/O error from opening or writing a device
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FeedbackError::Unavailable(err.to_string()),
            std::io::ErrorKind::PermissionDenied => FeedbackError::PermissionDenied,
            _ => FeedbackError::IoError(err),
        }
    }
}

impl fmt::Display for FeedbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
            FeedbackError::Unsupported(msg) => write!(f, "Not supported: {}", msg),
            FeedbackError::PermissionDenied => write!(
                f,
                "Permission denied. Ensure udev rules are installed and user is in 'input' group."
            ),
            FeedbackError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            FeedbackError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for FeedbackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FeedbackError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================================
// Test doubles
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::fakes::{FakeAudio, FakeVibrator};
    use super::*;

    fn dispatcher(
        vibrator: Option<Arc<FakeVibrator>>,
        audio: Arc<FakeAudio>,
    ) -> (FeedbackDispatcher, Settings) {
        let settings = Settings::in_memory();
        let vibrator = vibrator.map(|v| v as Arc<dyn Vibrator>);
        let dispatcher = FeedbackDispatcher::new(settings.clone(), vibrator, audio);
        (dispatcher, settings)
    }

    #[test]
    fn test_defaults_scenario() {
        let vibrator = Arc::new(FakeVibrator::default());
        let audio = Arc::new(FakeAudio::new(RingerMode::Normal, 15));
        let (dispatcher, _) = dispatcher(Some(vibrator.clone()), audio.clone());

        let (vibration, sound) = dispatcher.fire();

        assert_eq!(vibration, FeedbackOutcome::Vibrated { duration_ms: 110 });
        assert_eq!(vibrator.pulses(), vec![110]);

        let played = audio.played();
        assert_eq!(played.len(), 1);
        assert!((played[0] - 0.6667).abs() < 0.001);
        assert!(matches!(sound, FeedbackOutcome::Played { .. }));
    }

    #[test]
    fn test_zero_strength_skips_vibration_but_plays_sound() {
        let vibrator = Arc::new(FakeVibrator::default());
        let audio = Arc::new(FakeAudio::new(RingerMode::Normal, 15));
        let (dispatcher, settings) = dispatcher(Some(vibrator.clone()), audio.clone());
        settings.set_vibration_strength(0).unwrap();

        let (vibration, _) = dispatcher.fire();

        assert_eq!(vibration, FeedbackOutcome::Disabled);
        assert!(vibrator.pulses().is_empty());
        assert_eq!(audio.played().len(), 1);
    }

    #[test]
    fn test_negative_strength_is_disabled() {
        let vibrator = Arc::new(FakeVibrator::default());
        let audio = Arc::new(FakeAudio::new(RingerMode::Normal, 15));
        let (dispatcher, settings) = dispatcher(Some(vibrator.clone()), audio);
        settings.set_vibration_strength(-5).unwrap();

        assert_eq!(dispatcher.fire_vibration(), FeedbackOutcome::Disabled);
        assert!(vibrator.pulses().is_empty());
    }

    #[test]
    fn test_non_normal_ringer_skips_sound_but_vibrates() {
        for mode in [RingerMode::Silent, RingerMode::Vibrate] {
            let vibrator = Arc::new(FakeVibrator::default());
            let audio = Arc::new(FakeAudio::new(mode, 15));
            let (dispatcher, _) = dispatcher(Some(vibrator.clone()), audio.clone());

            let (_, sound) = dispatcher.fire();

            assert_eq!(sound, FeedbackOutcome::Suppressed(mode));
            assert!(audio.played().is_empty());
            assert_eq!(vibrator.pulses(), vec![110]);
        }
    }

    #[test]
    fn test_missing_vibrator_still_plays_sound() {
        let audio = Arc::new(FakeAudio::new(RingerMode::Normal, 15));
        let (dispatcher, _) = dispatcher(None, audio.clone());

        let (vibration, sound) = dispatcher.fire();

        assert_eq!(vibration, FeedbackOutcome::Failed);
        assert!(matches!(sound, FeedbackOutcome::Played { .. }));
    }

    #[test]
    fn test_failing_vibrator_still_plays_sound() {
        let vibrator = Arc::new(FakeVibrator::failing());
        let audio = Arc::new(FakeAudio::new(RingerMode::Normal, 15));
        let (dispatcher, _) = dispatcher(Some(vibrator), audio.clone());

        let (vibration, _) = dispatcher.fire();

        assert_eq!(vibration, FeedbackOutcome::Failed);
        assert_eq!(audio.played().len(), 1);
    }

    #[test]
    fn test_failing_playback_is_swallowed() {
        let vibrator = Arc::new(FakeVibrator::default());
        let mut audio = FakeAudio::new(RingerMode::Normal, 15);
        audio.fail_play = true;
        let (dispatcher, _) = dispatcher(Some(vibrator.clone()), Arc::new(audio));

        let (vibration, sound) = dispatcher.fire();

        assert_eq!(vibration, FeedbackOutcome::Vibrated { duration_ms: 110 });
        assert_eq!(sound, FeedbackOutcome::Failed);
    }

    #[test]
    fn test_zero_max_volume_is_invalid_stream() {
        let audio = Arc::new(FakeAudio::new(RingerMode::Normal, 0));
        let (dispatcher, _) = dispatcher(None, audio.clone());

        assert_eq!(dispatcher.fire_sound(), FeedbackOutcome::Failed);
        assert!(audio.played().is_empty());
    }

    #[test]
    fn test_settings_changes_apply_immediately() {
        let vibrator = Arc::new(FakeVibrator::default());
        let audio = Arc::new(FakeAudio::new(RingerMode::Normal, 15));
        let (dispatcher, settings) = dispatcher(Some(vibrator.clone()), audio.clone());

        dispatcher.fire();
        settings.set_vibration_strength(30).unwrap();
        settings.set_touch_sound_volume(15).unwrap();
        dispatcher.fire();

        assert_eq!(vibrator.pulses(), vec![110, 30]);
        assert_eq!(audio.played()[1], 1.0);
    }

    #[test]
    fn test_volume_fraction_uses_float_division() {
        assert!((volume_fraction(10, 15).unwrap() - 0.6667).abs() < 0.001);
        assert_eq!(volume_fraction(15, 15), Some(1.0));
        assert_eq!(volume_fraction(0, 15), Some(0.0));
    }

    #[test]
    fn test_volume_fraction_clamps() {
        assert_eq!(volume_fraction(30, 15), Some(1.0));
        assert_eq!(volume_fraction(-3, 15), Some(0.0));
        assert_eq!(volume_fraction(10, 0), None);
        assert_eq!(volume_fraction(10, -1), None);
    }

    #[test]
    fn test_from_io_classification() {
        let err = FeedbackError::from_io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(err, FeedbackError::Unavailable(_)));

        let err = FeedbackError::from_io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(matches!(err, FeedbackError::PermissionDenied));

        let err = FeedbackError::from_io(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(matches!(err, FeedbackError::IoError(_)));
    }
}
