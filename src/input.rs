//! evdev input handling for the mBack key
//!
//! Listens to Linux input events via the evdev subsystem without grabbing
//! the device, so every event still reaches the rest of the input stack.
//!
//! ## Device Detection
//! Uses the configured device path, else the configured device name, else
//! the first `/dev/input/event*` device that reports the watched key.
//!
//! ## Event Handling
//! Every EV_KEY event is converted to a [`KeyEvent`] and passed through
//! [`KeyHandler::handle`]; everything else is ignored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::DeviceConfig;
use crate::event::KeyEvent;
use crate::handler::KeyHandler;

/// Which device to listen on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSelector {
    pub path: Option<PathBuf>,
    pub name: Option<String>,
    pub scan_code: u16,
}

impl DeviceSelector {
    pub fn from_config(device: &DeviceConfig, scan_code: u16) -> Self {
        Self {
            path: device.path.clone(),
            name: device.name.clone(),
            scan_code,
        }
    }

    /// Decide whether a scanned device is the one to listen on
    ///
    /// A configured name must match exactly; otherwise any device that
    /// reports the watched key qualifies. Configured paths are opened
    /// directly and never reach the scan.
    pub fn matches(&self, name: &str, has_key: bool) -> bool {
        if let Some(wanted) = &self.name {
            return wanted == name;
        }
        has_key
    }
}

/// Information about a detected input device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Path to the event device (e.g., /dev/input/event5)
    pub path: PathBuf,
    /// Device name as reported by the kernel
    pub name: String,
    /// Whether the device reports the watched scan code
    pub has_key: bool,
}

/// evdev listener feeding the key handler
pub struct InputHandler {
    selector: DeviceSelector,
    handler: Arc<KeyHandler>,
}

impl InputHandler {
    pub fn new(selector: DeviceSelector, handler: Arc<KeyHandler>) -> Self {
        Self {
            selector,
            handler,
        }
    }

    /// Resolve the device to listen on
    ///
    /// A configured path (including /dev/input/by-id and by-path symlinks)
    /// is opened as is; otherwise /dev/input/ is scanned.
    pub fn find_device(selector: &DeviceSelector) -> Result<DeviceInfo, InputError> {
        if let Some(path) = &selector.path {
            let info = Self::check_device(path, selector.scan_code)?;
            if !info.has_key {
                tracing::warn!(
                    path = %path.display(),
                    scan_code = selector.scan_code,
                    "Configured device does not report the watched key"
                );
            }
            tracing::info!(path = %path.display(), name = %info.name, "Using configured key device");
            return Ok(info);
        }

        let input_dir = PathBuf::from("/dev/input");
        if !input_dir.exists() {
            tracing::error!("Input directory does not exist: {:?}", input_dir);
            return Err(InputError::DeviceNotFound);
        }

        let mut permission_denied = false;
        let entries = std::fs::read_dir(&input_dir).map_err(InputError::IoError)?;

        for entry in entries.flatten() {
            let path = entry.path();
            let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

            if !filename.starts_with("event") {
                continue;
            }

            match Self::check_device(&path, selector.scan_code) {
                Ok(info) => {
                    if selector.matches(&info.name, info.has_key) {
                        tracing::info!(
                            path = %info.path.display(),
                            name = %info.name,
                            "Found key device"
                        );
                        return Ok(info);
                    }
                }
                Err(InputError::PermissionDenied) => {
                    permission_denied = true;
                }
                Err(e) => {
                    tracing::debug!("Could not check device {:?}: {:?}", path, e);
                }
            }
        }

        if permission_denied {
            tracing::warn!("Some input devices could not be opened (permission denied)");
        }
        Err(InputError::DeviceNotFound)
    }

    /// Open a device and read its name and key capabilities
    fn check_device(path: &Path, scan_code: u16) -> Result<DeviceInfo, InputError> {
        let device = evdev::Device::open(path).map_err(InputError::from_io)?;

        let name = device.name().unwrap_or("Unknown").to_string();
        let has_key = device
            .supported_keys()
            .map(|keys| keys.contains(evdev::KeyCode::new(scan_code)))
            .unwrap_or(false);

        Ok(DeviceInfo {
            path: path.to_path_buf(),
            name,
            has_key,
        })
    }

    /// All readable input devices, for `--list-devices`
    pub fn list_devices(scan_code: u16) -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        if let Ok(entries) = std::fs::read_dir("/dev/input") {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_event = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("event"))
                    .unwrap_or(false);
                if !is_event {
                    continue;
                }
                if let Ok(info) = Self::check_device(&path, scan_code) {
                    devices.push(info);
                }
            }
        }

        devices.sort_by(|a, b| a.path.cmp(&b.path));
        devices
    }

    /// Listen until the device disconnects or an error occurs
    pub async fn start(&self) -> Result<(), InputError> {
        let device_info = Self::find_device(&self.selector)?;
        self.run_event_loop(&device_info).await
    }

    async fn run_event_loop(&self, device_info: &DeviceInfo) -> Result<(), InputError> {
        let device = evdev::Device::open(&device_info.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                tracing::error!(
                    "Permission denied opening {:?}. Make sure udev rules are installed \
                     and user is in 'input' group.",
                    device_info.path
                );
            }
            InputError::from_io(e)
        })?;

        tracing::info!(
            "Listening for scan code {} on {} ({:?})",
            self.selector.scan_code,
            device_info.name,
            device_info.path
        );

        let mut events = device.into_event_stream().map_err(InputError::IoError)?;

        loop {
            match events.next_event().await {
                Ok(event) => {
                    if let Some(key) = KeyEvent::from_input_event(&event) {
                        let passed = self.handler.handle(key);
                        tracing::trace!(
                            scan_code = passed.scan_code,
                            action = ?passed.action,
                            "Key event passed through"
                        );
                    }
                }
                Err(e) => {
                    if e.kind() == std::io::ErrorKind::WouldBlock {
                        continue;
                    }
                    tracing::error!("Error reading event: {:?}", e);
                    return Err(InputError::from_io(e));
                }
            }
        }
    }
}

/// Input error type
#[derive(Debug)]
pub enum InputError {
    /// No matching device found (or it went away)
    DeviceNotFound,
    /// Permission denied accessing device
    PermissionDenied,
    /// I/O error
    IoError(std::io::Error),
}

impl InputError {
    fn from_io(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => InputError::PermissionDenied,
            std::io::ErrorKind::NotFound => InputError::DeviceNotFound,
            _ => match e.raw_os_error() {
                // ENODEV: device unplugged while reading
                Some(19) => InputError::DeviceNotFound,
                _ => InputError::IoError(e),
            },
        }
    }
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputError::DeviceNotFound => write!(f, "Key device not found"),
            InputError::PermissionDenied => write!(
                f,
                "Permission denied. Ensure udev rules are installed and user is in 'input' group."
            ),
            InputError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for InputError {}
