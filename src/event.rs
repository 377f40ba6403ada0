//! Key event model
//!
//! A `KeyEvent` is the read-only view of one EV_KEY report from the kernel.
//! Scan codes are the raw Linux key codes, independent of any keymap.

use std::time::{SystemTime, UNIX_EPOCH};

/// Scan code of the physical mBack key (KEY_BACK)
pub const TARGET_SCAN_CODE: u16 = 158;

/// Key transition reported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Key went down (evdev value 1)
    Down,
    /// Key went up (evdev value 0)
    Up,
    /// Kernel autorepeat while held (evdev value 2)
    Repeat,
}

impl KeyAction {
    /// Map an evdev EV_KEY value to an action
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            1 => Some(KeyAction::Down),
            0 => Some(KeyAction::Up),
            2 => Some(KeyAction::Repeat),
            _ => None,
        }
    }
}

/// Event timestamp in microseconds since the UNIX epoch
///
/// Two deliveries of the same physical report carry the same timestamp,
/// which is what the key handler compares on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventTime(u64);

impl EventTime {
    pub const fn from_micros(micros: u64) -> Self {
        EventTime(micros)
    }

    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Convert a kernel timestamp; times before the epoch collapse to zero
    pub fn from_system_time(time: SystemTime) -> Self {
        let micros = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        EventTime(micros)
    }
}

/// A single key report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub scan_code: u16,
    pub action: KeyAction,
    pub event_time: EventTime,
}

impl KeyEvent {
    pub fn new(scan_code: u16, action: KeyAction, event_time: EventTime) -> Self {
        Self {
            scan_code,
            action,
            event_time,
        }
    }

    /// Build from raw EV_KEY fields
    ///
    /// Returns `None` for values the kernel does not define for keys.
    pub fn from_raw(code: u16, value: i32, timestamp: SystemTime) -> Option<Self> {
        let action = KeyAction::from_value(value)?;
        Some(Self::new(code, action, EventTime::from_system_time(timestamp)))
    }

    /// Build from an evdev input event, ignoring anything that is not EV_KEY
    pub fn from_input_event(event: &evdev::InputEvent) -> Option<Self> {
        if event.event_type() != evdev::EventType::KEY {
            return None;
        }
        Self::from_raw(event.code(), event.value(), event.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_target_scan_code_is_key_back() {
        assert_eq!(TARGET_SCAN_CODE, evdev::KeyCode::KEY_BACK.code());
    }

    #[test]
    fn test_action_from_value() {
        assert_eq!(KeyAction::from_value(1), Some(KeyAction::Down));
        assert_eq!(KeyAction::from_value(0), Some(KeyAction::Up));
        assert_eq!(KeyAction::from_value(2), Some(KeyAction::Repeat));
        assert_eq!(KeyAction::from_value(7), None);
    }

    #[test]
    fn test_from_raw_keeps_kernel_timestamp() {
        let ts = UNIX_EPOCH + Duration::from_micros(1_700_000_123_456);
        let event = KeyEvent::from_raw(158, 1, ts).unwrap();

        assert_eq!(event.scan_code, 158);
        assert_eq!(event.action, KeyAction::Down);
        assert_eq!(event.event_time.as_micros(), 1_700_000_123_456);
    }

    #[test]
    fn test_from_raw_rejects_unknown_value() {
        assert!(KeyEvent::from_raw(158, -1, SystemTime::now()).is_none());
    }

    #[test]
    fn test_pre_epoch_time_is_zero() {
        let ts = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(EventTime::from_system_time(ts), EventTime::from_micros(0));
    }

    #[test]
    fn test_non_key_input_event_ignored() {
        let event = evdev::InputEvent::new(evdev::EventType::RELATIVE.0, 0, 5);
        assert!(KeyEvent::from_input_event(&event).is_none());
    }

    #[test]
    fn test_key_input_event_converted() {
        let event = evdev::InputEvent::new(evdev::EventType::KEY.0, 158, 0);
        let key = KeyEvent::from_input_event(&event).unwrap();
        assert_eq!(key.scan_code, 158);
        assert_eq!(key.action, KeyAction::Up);
    }
}
