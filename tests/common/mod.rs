#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use keytest::config::{Preferences, TestConfig};
use keytest::language::FixedWordSource;
use keytest::runtime::ManualClock;
use keytest::Engine;

pub const SETTLE: Duration = Duration::from_secs(5);

// Init logger for tests
pub fn init_log() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

pub fn words(word_count: usize) -> TestConfig {
    TestConfig::Words {
        word_count,
        punctuation: false,
        numbers: false,
    }
}

pub fn timed(duration: u64) -> TestConfig {
    TestConfig::Time {
        duration,
        punctuation: false,
        numbers: false,
    }
}

pub fn engine(source: FixedWordSource, config: TestConfig) -> (Engine, ManualClock) {
    init_log();
    let clock = ManualClock::default();
    let prefs = Preferences {
        test: config,
        ..Preferences::default()
    };
    let engine = Engine::new(Arc::new(source), Arc::new(clock.clone()), &prefs);
    (engine, clock)
}

pub fn type_str(engine: &mut Engine, text: &str) {
    for c in text.chars() {
        engine.process_key_event(&c.to_string(), false, false, false);
    }
}
