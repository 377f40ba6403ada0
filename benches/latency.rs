//! Key handling latency
//!
//! `handle` runs inline on the input loop for every key event, so the
//! pass-through path for unrelated keys and the duplicate path must stay
//! cheap.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mbackd::{
    Amplitude, AudioOutput, AudioStream, EventTime, FeedbackDispatcher, FeedbackError, KeyAction,
    KeyEvent, KeyHandler, RingerMode, Settings, SoundEffect, Vibrator, TARGET_SCAN_CODE,
};

struct NullVibrator;

impl Vibrator for NullVibrator {
    fn emit_one_shot(&self, _duration_ms: u32, _amplitude: Amplitude) -> Result<(), FeedbackError> {
        Ok(())
    }
}

struct NullAudio;

impl AudioOutput for NullAudio {
    fn ringer_mode(&self) -> RingerMode {
        RingerMode::Normal
    }

    fn max_volume(&self, _stream: AudioStream) -> Result<i32, FeedbackError> {
        Ok(15)
    }

    fn play_effect(&self, _effect: SoundEffect, _volume: f32) -> Result<(), FeedbackError> {
        Ok(())
    }
}

fn handler() -> KeyHandler {
    let dispatcher = FeedbackDispatcher::new(
        Settings::in_memory(),
        Some(Arc::new(NullVibrator)),
        Arc::new(NullAudio),
    );
    KeyHandler::new(dispatcher)
}

fn bench_handle(c: &mut Criterion) {
    let handler = handler();

    let other_key = KeyEvent::new(28, KeyAction::Down, EventTime::from_micros(1));
    c.bench_function("handle_other_key", |b| {
        b.iter(|| handler.handle(black_box(other_key)))
    });

    let duplicate = KeyEvent::new(TARGET_SCAN_CODE, KeyAction::Down, EventTime::from_micros(2));
    handler.handle(duplicate);
    c.bench_function("handle_duplicate_press", |b| {
        b.iter(|| handler.handle(black_box(duplicate)))
    });

    let mut time = 10u64;
    c.bench_function("handle_new_press", |b| {
        b.iter(|| {
            time += 1;
            let event = KeyEvent::new(TARGET_SCAN_CODE, KeyAction::Down, EventTime::from_micros(time));
            handler.handle(black_box(event))
        })
    });
}

criterion_group!(benches, bench_handle);
criterion_main!(benches);
