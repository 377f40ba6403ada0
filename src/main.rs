//! mbackd
//!
//! A daemon for Linux that gives the physical back key (mBack) a haptic
//! pulse and a short touch sound on every press.

use std::sync::Arc;

use clap::Parser;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use mbackd::{
    config::{expand_home, Config, ConfigError, VibratorBackend, VibratorConfig},
    dbus::init_dbus_service,
    input::{DeviceSelector, InputError, InputHandler},
    new_shared_ringer_mode, CommandSoundPlayer, FeedbackDispatcher, ForceFeedbackVibrator,
    JsonSettingsStore, KeyHandler, MemorySettingsStore, Settings, SettingsStore,
    TimedOutputVibrator, Vibrator,
};

/// Device polling interval when device is not found (2 seconds)
const DEVICE_POLL_INTERVAL_SECS: u64 = 2;

/// mbackd - haptic and audio feedback for the back key
#[derive(Parser, Debug)]
#[command(name = "mbackd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path [default: ~/.config/mbackd/config.json]
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Override the watched scan code
    #[arg(long)]
    scan_code: Option<u16>,

    /// Keep settings in memory instead of the settings file
    #[arg(long)]
    no_persist: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("mbackd starting...");

    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }
    };
    if let Some(scan_code) = args.scan_code {
        config.scan_code = scan_code;
    }

    if args.list_devices {
        list_devices(config.scan_code);
        return Ok(());
    }

    let settings = Settings::new(open_settings_store(&config, args.no_persist));
    let vibrator = open_vibrator(&config.vibrator);
    let ringer_mode = new_shared_ringer_mode(config.sound.ringer_mode);
    let audio = Arc::new(CommandSoundPlayer::from_config(&config.sound, ringer_mode.clone()));

    info!(
        vibration_strength = settings.vibration_strength(),
        touch_sound_volume = settings.touch_sound_volume(),
        ringer_mode = %config.sound.ringer_mode,
        "Feedback settings"
    );

    let dispatcher = FeedbackDispatcher::new(settings, vibrator, audio);
    let handler = Arc::new(KeyHandler::with_scan_code(config.scan_code, dispatcher));

    // D-Bus is optional; key handling works without a session bus
    let _dbus_connection = match init_dbus_service(handler.clone(), ringer_mode).await {
        Ok(conn) => {
            info!("D-Bus service initialized successfully");
            Some(conn)
        }
        Err(e) => {
            warn!("D-Bus service unavailable (non-fatal): {}", e);
            None
        }
    };

    let selector = DeviceSelector::from_config(&config.device, config.scan_code);
    let input_handle = tokio::spawn(async move { run_input_loop(selector, handler).await });

    info!("mbackd ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting...");
        }
        result = input_handle => {
            if let Err(e) = result {
                error!("Input task panicked: {:?}", e);
            }
        }
    }

    Ok(())
}

/// Pick the settings store: in-memory, or the JSON file
/// Load the config named on the command line, else the per-user default
fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load(expand_home(path)),
        None => Config::load_default(),
    }
}

fn open_settings_store(config: &Config, no_persist: bool) -> Arc<dyn SettingsStore> {
    if no_persist {
        info!("Settings kept in memory (--no-persist)");
        return Arc::new(MemorySettingsStore::new());
    }

    match config.settings_path() {
        Some(path) => {
            info!(path = %path.display(), "Using settings file");
            Arc::new(JsonSettingsStore::new(path))
        }
        None => {
            warn!("Could not determine settings path, keeping settings in memory");
            Arc::new(MemorySettingsStore::new())
        }
    }
}

/// Open the configured vibration backend; `None` if it is missing
fn open_vibrator(config: &VibratorConfig) -> Option<Arc<dyn Vibrator>> {
    let result: Result<Arc<dyn Vibrator>, _> = match config.backend {
        VibratorBackend::None => {
            info!("Vibration backend disabled in config");
            return None;
        }
        VibratorBackend::ForceFeedback => {
            let opened = match &config.device_path {
                Some(path) => ForceFeedbackVibrator::open(path),
                None => ForceFeedbackVibrator::discover(),
            };
            opened.map(|v| Arc::new(v) as Arc<dyn Vibrator>)
        }
        VibratorBackend::TimedOutput => TimedOutputVibrator::open(&config.timed_output_path)
            .map(|v| Arc::new(v) as Arc<dyn Vibrator>),
    };

    match result {
        Ok(vibrator) => Some(vibrator),
        Err(e) => {
            warn!(backend = ?config.backend, "Vibrator unavailable (non-fatal): {}", e);
            None
        }
    }
}

/// List all readable input devices
fn list_devices(scan_code: u16) {
    println!("Scanning input devices for scan code {}...\n", scan_code);

    let devices = InputHandler::list_devices(scan_code);

    if devices.is_empty() {
        println!("No input devices found.");
        println!("\nTroubleshooting:");
        println!("  - Check that udev rules are installed");
        println!("  - Verify user is in 'input' group");
        return;
    }

    for (i, device) in devices.iter().enumerate() {
        let marker = if device.has_key { " [has key]" } else { "" };
        println!("{}. {}{}", i + 1, device.name, marker);
        println!("   Path: {:?}", device.path);
    }
}

/// Run device detection and the event loop, reconnecting forever
async fn run_input_loop(selector: DeviceSelector, handler: Arc<KeyHandler>) {
    let input = InputHandler::new(selector, handler);

    loop {
        match input.start().await {
            Ok(()) => {
                info!("Event loop ended normally");
            }
            Err(InputError::DeviceNotFound) => {
                info!("Waiting for key device... (polling every {}s)", DEVICE_POLL_INTERVAL_SECS);
            }
            Err(InputError::PermissionDenied) => {
                error!("Permission denied. Ensure udev rules are installed.");
                error!("Run: sudo usermod -aG input $USER && logout");
            }
            Err(InputError::IoError(e)) => {
                error!("I/O error: {}. Will retry...", e);
            }
        }

        sleep(Duration::from_secs(DEVICE_POLL_INTERVAL_SECS)).await;
    }
}
