//! mBack key handler
//!
//! Observes every key event and returns it unchanged. A DOWN report of the
//! target scan code fires feedback once per distinct kernel timestamp; a
//! repeated delivery with the same timestamp is ignored.

use std::sync::Mutex;

use crate::event::{EventTime, KeyAction, KeyEvent, TARGET_SCAN_CODE};
use crate::feedback::FeedbackDispatcher;

pub struct KeyHandler {
    scan_code: u16,
    dispatcher: FeedbackDispatcher,
    /// Timestamp of the last press that fired feedback
    last_handled: Mutex<Option<EventTime>>,
}

impl KeyHandler {
    /// Handler for the mBack key
    pub fn new(dispatcher: FeedbackDispatcher) -> Self {
        Self::with_scan_code(TARGET_SCAN_CODE, dispatcher)
    }

    /// Handler for an arbitrary scan code
    pub fn with_scan_code(scan_code: u16, dispatcher: FeedbackDispatcher) -> Self {
        Self {
            scan_code,
            dispatcher,
            last_handled: Mutex::new(None),
        }
    }

    pub fn scan_code(&self) -> u16 {
        self.scan_code
    }

    pub fn dispatcher(&self) -> &FeedbackDispatcher {
        &self.dispatcher
    }

    /// Inspect `event`, fire feedback if it is a new press, and hand it back
    pub fn handle(&self, event: KeyEvent) -> KeyEvent {
        if event.scan_code != self.scan_code || event.action != KeyAction::Down {
            return event;
        }

        if !self.claim(event.event_time) {
            tracing::trace!(
                event_time = event.event_time.as_micros(),
                "Duplicate mBack press ignored"
            );
            return event;
        }

        tracing::debug!(event_time = event.event_time.as_micros(), "mBack pressed");
        self.dispatcher.fire();

        event
    }

    /// Record `time` as handled; false if it already was
    ///
    /// The compare and the store happen under one lock, and the lock is
    /// released before feedback runs.
    fn claim(&self, time: EventTime) -> bool {
        let mut last = match self.last_handled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if *last == Some(time) {
            return false;
        }
        *last = Some(time);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RingerMode;
    use crate::feedback::fakes::{FakeAudio, FakeVibrator};
    use crate::haptic::Vibrator;
    use crate::settings::Settings;
    use std::sync::Arc;

    struct Harness {
        handler: KeyHandler,
        vibrator: Arc<FakeVibrator>,
        audio: Arc<FakeAudio>,
        settings: Settings,
    }

    fn harness() -> Harness {
        let vibrator = Arc::new(FakeVibrator::default());
        let audio = Arc::new(FakeAudio::new(RingerMode::Normal, 15));
        let settings = Settings::in_memory();
        let dispatcher = FeedbackDispatcher::new(
            settings.clone(),
            Some(vibrator.clone() as Arc<dyn Vibrator>),
            audio.clone(),
        );

        Harness {
            handler: KeyHandler::new(dispatcher),
            vibrator,
            audio,
            settings,
        }
    }

    fn key(scan_code: u16, action: KeyAction, micros: u64) -> KeyEvent {
        KeyEvent::new(scan_code, action, EventTime::from_micros(micros))
    }

    #[test]
    fn test_other_scan_codes_pass_through() {
        let h = harness();
        for code in [0, 1, 28, 139, 157, 159, 0x116] {
            let event = key(code, KeyAction::Down, 1000 + code as u64);
            assert_eq!(h.handler.handle(event), event);
        }
        assert!(h.vibrator.pulses().is_empty());
        assert!(h.audio.played().is_empty());
    }

    #[test]
    fn test_up_and_repeat_pass_through() {
        let h = harness();
        for (i, action) in [KeyAction::Up, KeyAction::Repeat].into_iter().enumerate() {
            let event = key(TARGET_SCAN_CODE, action, 500 + i as u64);
            assert_eq!(h.handler.handle(event), event);
        }
        assert!(h.vibrator.pulses().is_empty());
        assert!(h.audio.played().is_empty());
    }

    #[test]
    fn test_press_triggers_feedback_and_returns_event() {
        let h = harness();
        let event = key(TARGET_SCAN_CODE, KeyAction::Down, 42);

        assert_eq!(h.handler.handle(event), event);
        assert_eq!(h.vibrator.pulses(), vec![110]);
        assert_eq!(h.audio.played().len(), 1);
    }

    #[test]
    fn test_duplicate_timestamp_triggers_once() {
        let h = harness();
        let event = key(TARGET_SCAN_CODE, KeyAction::Down, 1_000);

        h.handler.handle(event);
        h.handler.handle(event);

        assert_eq!(h.vibrator.pulses().len(), 1);
        assert_eq!(h.audio.played().len(), 1);
    }

    #[test]
    fn test_distinct_timestamps_trigger_twice() {
        let h = harness();

        h.handler.handle(key(TARGET_SCAN_CODE, KeyAction::Down, 1_000));
        h.handler.handle(key(TARGET_SCAN_CODE, KeyAction::Down, 2_000));

        assert_eq!(h.vibrator.pulses().len(), 2);
        assert_eq!(h.audio.played().len(), 2);
    }

    #[test]
    fn test_only_exact_timestamp_is_deduplicated() {
        let h = harness();

        h.handler.handle(key(TARGET_SCAN_CODE, KeyAction::Down, 1_000));
        h.handler.handle(key(TARGET_SCAN_CODE, KeyAction::Down, 1_001));
        // An older timestamp is still a different press
        h.handler.handle(key(TARGET_SCAN_CODE, KeyAction::Down, 1_000));

        assert_eq!(h.vibrator.pulses().len(), 3);
    }

    #[test]
    fn test_up_between_duplicates_does_not_reset() {
        let h = harness();

        h.handler.handle(key(TARGET_SCAN_CODE, KeyAction::Down, 7));
        h.handler.handle(key(TARGET_SCAN_CODE, KeyAction::Up, 8));
        h.handler.handle(key(TARGET_SCAN_CODE, KeyAction::Down, 7));

        assert_eq!(h.vibrator.pulses().len(), 1);
    }

    #[test]
    fn test_first_press_at_time_zero_fires() {
        let h = harness();
        h.handler.handle(key(TARGET_SCAN_CODE, KeyAction::Down, 0));
        assert_eq!(h.vibrator.pulses().len(), 1);
    }

    #[test]
    fn test_disabled_vibration_still_returns_event() {
        let h = harness();
        h.settings.set_vibration_strength(0).unwrap();
        let event = key(TARGET_SCAN_CODE, KeyAction::Down, 9);

        assert_eq!(h.handler.handle(event), event);
        assert!(h.vibrator.pulses().is_empty());
        assert_eq!(h.audio.played().len(), 1);
    }

    #[test]
    fn test_unavailable_services_never_fail_handle() {
        let mut audio = FakeAudio::new(RingerMode::Normal, 15);
        audio.fail_play = true;
        let dispatcher = FeedbackDispatcher::new(Settings::in_memory(), None, Arc::new(audio));
        let handler = KeyHandler::new(dispatcher);

        let event = key(TARGET_SCAN_CODE, KeyAction::Down, 3);
        assert_eq!(handler.handle(event), event);
    }

    #[test]
    fn test_custom_scan_code() {
        let vibrator = Arc::new(FakeVibrator::default());
        let dispatcher = FeedbackDispatcher::new(
            Settings::in_memory(),
            Some(vibrator.clone() as Arc<dyn Vibrator>),
            Arc::new(FakeAudio::new(RingerMode::Silent, 15)),
        );
        let handler = KeyHandler::with_scan_code(0x116, dispatcher);

        handler.handle(key(TARGET_SCAN_CODE, KeyAction::Down, 1));
        handler.handle(key(0x116, KeyAction::Down, 2));

        assert_eq!(vibrator.pulses(), vec![110]);
    }

    #[test]
    fn test_concurrent_duplicates_fire_once() {
        let h = Arc::new(harness());
        let event = key(TARGET_SCAN_CODE, KeyAction::Down, 123_456);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let h = h.clone();
                std::thread::spawn(move || h.handler.handle(event))
            })
            .collect();

        for t in threads {
            assert_eq!(t.join().unwrap(), event);
        }
        assert_eq!(h.vibrator.pulses().len(), 1);
    }
}
