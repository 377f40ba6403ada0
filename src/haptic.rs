//! Vibration backends
//!
//! The feedback dispatcher only needs "emit a one-shot pulse of N ms".
//! Two Linux backends provide it:
//!
//! - [`ForceFeedbackVibrator`]: an evdev device advertising `FF_RUMBLE`
//!   (phones running mainline kernels expose the vibra motor this way)
//! - [`TimedOutputVibrator`]: the legacy sysfs `timed_output` class, where
//!   writing a millisecond count to `enable` runs the motor for that long

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::feedback::FeedbackError;

/// Default sysfs node for timed-output vibrators
pub const DEFAULT_TIMED_OUTPUT_PATH: &str = "/sys/class/timed_output/vibrator/enable";

/// Rumble magnitude used for [`Amplitude::Default`]
const DEFAULT_RUMBLE_MAGNITUDE: u16 = 0xC000;

/// Longest pulse a single rumble effect can describe
const MAX_FF_DURATION_MS: u32 = u16::MAX as u32;

/// Pulse strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Amplitude {
    /// Whatever the hardware considers its normal strength
    #[default]
    Default,
    /// Explicit level, 1 (weakest) to 255 (strongest)
    Level(u8),
}

impl Amplitude {
    /// Platform default amplitude
    pub const DEFAULT: Amplitude = Amplitude::Default;

    /// Scale to a 16-bit rumble magnitude
    pub fn rumble_magnitude(self) -> u16 {
        match self {
            Amplitude::Default => DEFAULT_RUMBLE_MAGNITUDE,
            Amplitude::Level(level) => u16::from(level) * 257,
        }
    }
}

/// Something that can emit a single timed vibration pulse
pub trait Vibrator: Send + Sync {
    /// Start a one-shot pulse and return without waiting for it to finish
    fn emit_one_shot(&self, duration_ms: u32, amplitude: Amplitude) -> Result<(), FeedbackError>;
}

// ============================================================================
// evdev force feedback
// ============================================================================

struct FfState {
    device: evdev::Device,
    /// Last uploaded effect; dropping it erases the effect from the device
    effect: Option<evdev::FFEffect>,
}

/// Vibrator driven through the evdev force-feedback interface
pub struct ForceFeedbackVibrator {
    path: PathBuf,
    name: String,
    state: Mutex<FfState>,
}

impl ForceFeedbackVibrator {
    /// Open a specific event device, checking that it can rumble
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FeedbackError> {
        let path = path.as_ref();
        let device = evdev::Device::open(path).map_err(FeedbackError::from_io)?;

        if !Self::supports_rumble(&device) {
            return Err(FeedbackError::Unsupported(format!(
                "{} has no FF_RUMBLE capability",
                path.display()
            )));
        }

        let name = device.name().unwrap_or("Unknown").to_string();
        tracing::info!(path = %path.display(), name = %name, "Force feedback vibrator opened");

        Ok(Self {
            path: path.to_path_buf(),
            name,
            state: Mutex::new(FfState {
                device,
                effect: None,
            }),
        })
    }

    /// Scan /dev/input for the first device that supports rumble effects
    pub fn discover() -> Result<Self, FeedbackError> {
        let entries = std::fs::read_dir("/dev/input").map_err(FeedbackError::from_io)?;

        for entry in entries.flatten() {
            let path = entry.path();
            let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !filename.starts_with("event") {
                continue;
            }

            match evdev::Device::open(&path) {
                Ok(device) if Self::supports_rumble(&device) => {
                    drop(device);
                    return Self::open(&path);
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("Could not check device {:?}: {:?}", path, e);
                    continue;
                }
            }
        }

        Err(FeedbackError::Unavailable(
            "no force feedback device found".to_string(),
        ))
    }

    fn supports_rumble(device: &evdev::Device) -> bool {
        device
            .supported_ff()
            .map(|ff| ff.contains(evdev::FFEffectCode::FF_RUMBLE))
            .unwrap_or(false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Force-feedback replay length for a requested duration
///
/// The kernel field is 16 bits wide; longer requests are cut to its maximum.
fn ff_replay_length(duration_ms: u32) -> u16 {
    match u16::try_from(duration_ms) {
        Ok(length) => length,
        Err(_) => {
            tracing::debug!(
                requested_ms = duration_ms,
                max_ms = MAX_FF_DURATION_MS,
                "Vibration duration exceeds force-feedback limit, clamping"
            );
            u16::MAX
        }
    }
}

impl Vibrator for ForceFeedbackVibrator {
    fn emit_one_shot(&self, duration_ms: u32, amplitude: Amplitude) -> Result<(), FeedbackError> {
        let length = ff_replay_length(duration_ms);
        let magnitude = amplitude.rumble_magnitude();

        let data = evdev::FFEffectData {
            direction: 0,
            trigger: evdev::FFTrigger {
                button: 0,
                interval: 0,
            },
            replay: evdev::FFReplay { length, delay: 0 },
            kind: evdev::FFEffectKind::Rumble {
                strong_magnitude: magnitude,
                weak_magnitude: magnitude,
            },
        };

        let mut state = self
            .state
            .lock()
            .map_err(|_| FeedbackError::Unavailable("vibrator lock poisoned".to_string()))?;

        // Erase the previous effect before uploading so effect slots don't run out
        state.effect = None;

        let mut effect = state
            .device
            .upload_ff_effect(data)
            .map_err(FeedbackError::from_io)?;
        effect.play(1).map_err(FeedbackError::from_io)?;
        state.effect = Some(effect);

        tracing::debug!(duration_ms = length, magnitude, "Rumble effect played");
        Ok(())
    }
}

// ============================================================================
// sysfs timed_output
// ============================================================================

/// Vibrator driven through a sysfs `timed_output` enable node
#[derive(Debug, Clone)]
pub struct TimedOutputVibrator {
    enable_path: PathBuf,
}

impl TimedOutputVibrator {
    /// Use the given enable node; fails if it does not exist
    pub fn open<P: AsRef<Path>>(enable_path: P) -> Result<Self, FeedbackError> {
        let enable_path = enable_path.as_ref();
        if !enable_path.exists() {
            return Err(FeedbackError::Unavailable(format!(
                "{} does not exist",
                enable_path.display()
            )));
        }

        Ok(Self {
            enable_path: enable_path.to_path_buf(),
        })
    }

    pub fn enable_path(&self) -> &Path {
        &self.enable_path
    }
}

impl Vibrator for TimedOutputVibrator {
    fn emit_one_shot(&self, duration_ms: u32, _amplitude: Amplitude) -> Result<(), FeedbackError> {
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.enable_path)
            .map_err(FeedbackError::from_io)?;

        write!(file, "{}", duration_ms).map_err(FeedbackError::from_io)?;

        tracing::debug!(duration_ms, path = %self.enable_path.display(), "Timed output enabled");
        Ok(())
    }
}
