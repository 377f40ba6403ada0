//! D-Bus IPC server for mbackd
//!
//! Lets a settings panel or script adjust the feedback settings and the
//! ringer mode without restarting the daemon.
//!
//! ## Interface: io.github.mbackd.Daemon
//!
//! ### Methods:
//! - `GetVibrationStrength() -> i32` / `SetVibrationStrength(ms: i32)`
//! - `GetTouchSoundVolume() -> i32` / `SetTouchSoundVolume(level: i32)`
//! - `GetRingerMode() -> s` / `SetRingerMode(mode: s)` (normal, vibrate, silent)
//! - `TestFeedback()` - Fire both feedback actions once
//!
//! ### Signals:
//! - `SettingChanged(key: s, value: i32)`
//! - `RingerModeChanged(mode: s)`

use std::sync::Arc;

use zbus::{fdo, interface, object_server::SignalEmitter};

use crate::audio::{RingerMode, SharedRingerMode};
use crate::feedback::FeedbackDispatcher;
use crate::handler::KeyHandler;
use crate::settings::{Settings, KEY_TOUCH_SOUND_VOLUME, KEY_VIBRATION_STRENGTH};

/// D-Bus interface name
pub const DBUS_INTERFACE: &str = "io.github.mbackd.Daemon";

/// D-Bus object path
pub const DBUS_PATH: &str = "/io/github/mbackd/Daemon";

/// D-Bus bus name
pub const DBUS_NAME: &str = "io.github.mbackd";

/// mbackd D-Bus service
pub struct MBackService {
    /// Daemon version
    version: String,
    /// Key handler, for its settings and feedback dispatcher
    handler: Arc<KeyHandler>,
    /// Ringer mode read by the sound player
    ringer_mode: SharedRingerMode,
}

impl MBackService {
    pub fn new(handler: Arc<KeyHandler>, ringer_mode: SharedRingerMode) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            handler,
            ringer_mode,
        }
    }

    fn dispatcher(&self) -> &FeedbackDispatcher {
        self.handler.dispatcher()
    }

    fn settings(&self) -> &Settings {
        self.dispatcher().settings()
    }

    fn current_ringer_mode(&self) -> RingerMode {
        match self.ringer_mode.read() {
            Ok(mode) => *mode,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Parse and store a new ringer mode
    fn apply_ringer_mode(&self, mode: &str) -> fdo::Result<RingerMode> {
        let mode: RingerMode = mode
            .parse()
            .map_err(|e: crate::feedback::FeedbackError| fdo::Error::InvalidArgs(e.to_string()))?;

        match self.ringer_mode.write() {
            Ok(mut current) => *current = mode,
            Err(poisoned) => *poisoned.into_inner() = mode,
        }

        tracing::info!(ringer_mode = %mode, "Ringer mode changed");
        Ok(mode)
    }
}

#[interface(name = "io.github.mbackd.Daemon")]
impl MBackService {
    // =========================================================================
    // METHODS
    // =========================================================================

    /// Vibration pulse length in milliseconds (<= 0 means disabled)
    async fn get_vibration_strength(&self) -> i32 {
        self.settings().vibration_strength()
    }

    async fn set_vibration_strength(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
        value: i32,
    ) -> fdo::Result<()> {
        self.settings()
            .set_vibration_strength(value)
            .map_err(|e| fdo::Error::Failed(e.to_string()))?;
        tracing::info!(value, "Vibration strength updated");
        Self::setting_changed(&emitter, KEY_VIBRATION_STRENGTH, value).await?;
        Ok(())
    }

    /// Touch sound volume level
    async fn get_touch_sound_volume(&self) -> i32 {
        self.settings().touch_sound_volume()
    }

    async fn set_touch_sound_volume(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
        value: i32,
    ) -> fdo::Result<()> {
        self.settings()
            .set_touch_sound_volume(value)
            .map_err(|e| fdo::Error::Failed(e.to_string()))?;
        tracing::info!(value, "Touch sound volume updated");
        Self::setting_changed(&emitter, KEY_TOUCH_SOUND_VOLUME, value).await?;
        Ok(())
    }

    async fn get_ringer_mode(&self) -> String {
        self.current_ringer_mode().to_string()
    }

    async fn set_ringer_mode(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
        mode: &str,
    ) -> fdo::Result<()> {
        let mode = self.apply_ringer_mode(mode)?;
        Self::ringer_mode_changed(&emitter, mode.as_str()).await?;
        Ok(())
    }

    /// Fire vibration and sound once, bypassing the key filter
    async fn test_feedback(&self) {
        tracing::info!("TestFeedback called");
        let (vibration, sound) = self.dispatcher().fire();
        tracing::debug!(?vibration, ?sound, "Test feedback finished");
    }

    // =========================================================================
    // SIGNALS
    // =========================================================================

    /// Emitted after a setting is written through this interface
    #[zbus(signal)]
    async fn setting_changed(emitter: &SignalEmitter<'_>, key: &str, value: i32) -> zbus::Result<()>;

    /// Emitted after the ringer mode changes
    #[zbus(signal)]
    async fn ringer_mode_changed(emitter: &SignalEmitter<'_>, mode: &str) -> zbus::Result<()>;

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    /// Scan code being watched
    #[zbus(property)]
    async fn scan_code(&self) -> u16 {
        self.handler.scan_code()
    }

    /// Daemon version, exported as `Version`
    #[zbus(property)]
    async fn version(&self) -> &str {
        &self.version
    }
}

/// Initialize and run the D-Bus service
///
/// Connects to the session bus, registers the service name, and exports
/// the daemon object.
pub async fn init_dbus_service(
    handler: Arc<KeyHandler>,
    ringer_mode: SharedRingerMode,
) -> zbus::Result<zbus::Connection> {
    let service = MBackService::new(handler, ringer_mode);

    let connection = zbus::connection::Builder::session()?
        .name(DBUS_NAME)?
        .serve_at(DBUS_PATH, service)?
        .build()
        .await?;

    tracing::info!(
        name = DBUS_NAME,
        path = DBUS_PATH,
        "D-Bus service registered"
    );

    Ok(connection)
}
