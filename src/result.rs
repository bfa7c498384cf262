use crate::config::{Mode, TestConfig};
use crate::metrics::{accuracy, consistency, raw_wpm};
use crate::session::TestState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// A finished test, ready to hand to whoever stores history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub wpm: f64,
    pub raw_wpm: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub correct_chars: usize,
    pub incorrect_chars: usize,
    pub mode: Mode,
    pub mode2: String,
    pub language: String,
    pub punctuation: bool,
    pub numbers: bool,
    pub test_duration_secs: f64,
    pub timestamp: DateTime<Utc>,
    pub wpm_history: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<u32>,
}

/// Milliseconds between `start` and `end`, zero if unset or out of order.
pub fn elapsed_ms(start: Option<SystemTime>, end: SystemTime) -> f64 {
    start
        .and_then(|s| end.duration_since(s).ok())
        .map_or(0.0, |d| d.as_secs_f64() * 1000.0)
}

/// Assemble the result record for `state`. `now` stands in for the end
/// time when the run has not stamped one.
pub fn build_result(
    state: &TestState,
    config: &TestConfig,
    language: &str,
    now: SystemTime,
) -> TestResult {
    let end = state.end_time.unwrap_or(now);
    let duration_ms = elapsed_ms(state.start_time, end);
    let options = config.options();

    TestResult {
        wpm: raw_wpm(state.correct_chars, duration_ms),
        raw_wpm: raw_wpm(state.correct_chars + state.incorrect_chars, duration_ms),
        accuracy: accuracy(state.correct_chars, state.incorrect_chars),
        consistency: consistency(&state.wpm_history),
        correct_chars: state.correct_chars,
        incorrect_chars: state.incorrect_chars,
        mode: config.mode(),
        mode2: config.mode2(),
        language: language.to_string(),
        punctuation: options.punctuation,
        numbers: options.numbers,
        test_duration_secs: duration_ms / 1000.0,
        timestamp: DateTime::<Utc>::from(end),
        wpm_history: state.wpm_history.clone(),
        quote_id: state.current_quote.as_ref().map(|q| q.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuoteLength;
    use crate::language::Quote;
    use crate::session::Status;
    use std::time::Duration;

    fn finished_state(secs: u64) -> TestState {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut state = TestState::new(vec!["cat".into(), "dog".into()], None);
        state.status = Status::Finished;
        state.start_time = Some(start);
        state.end_time = Some(start + Duration::from_secs(secs));
        state.correct_chars = 50;
        state.incorrect_chars = 10;
        state.wpm_history = vec![60.0, 60.0];
        state
    }

    #[test]
    fn builds_words_mode_result() {
        let config = TestConfig::Words {
            word_count: 2,
            punctuation: true,
            numbers: false,
        };
        let result = build_result(&finished_state(60), &config, "english", SystemTime::now());

        assert_eq!(result.wpm, 10.0);
        assert_eq!(result.raw_wpm, 12.0);
        assert_eq!(result.accuracy, 83.0);
        assert_eq!(result.consistency, 100.0);
        assert_eq!(result.mode, Mode::Words);
        assert_eq!(result.mode2, "2");
        assert!(result.punctuation);
        assert!(!result.numbers);
        assert_eq!(result.test_duration_secs, 60.0);
        assert_eq!(result.timestamp.timestamp(), 1_060);
        assert_eq!(result.quote_id, None);
    }

    #[test]
    fn quote_mode_records_quote_and_bucket() {
        let mut state = finished_state(30);
        state.current_quote = Some(Quote {
            id: 42,
            text: "cat dog".into(),
            source: "test".into(),
            length: 7,
        });
        let config = TestConfig::Quote {
            quote_length: QuoteLength::Short,
        };
        let result = build_result(&state, &config, "english", SystemTime::now());

        assert_eq!(result.mode2, "short");
        assert_eq!(result.quote_id, Some(42));
        assert!(!result.punctuation);
    }

    #[test]
    fn unstarted_state_scores_zero() {
        let state = TestState::new(vec!["cat".into()], None);
        let result = build_result(&state, &TestConfig::default(), "english", SystemTime::now());
        assert_eq!(result.wpm, 0.0);
        assert_eq!(result.test_duration_secs, 0.0);
        assert_eq!(result.accuracy, 100.0);
    }

    #[test]
    fn serializes_camel_case() {
        let config = TestConfig::default();
        let result = build_result(&finished_state(10), &config, "english", SystemTime::now());
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("rawWpm").is_some());
        assert!(json.get("wpmHistory").is_some());
        assert!(json.get("quoteId").is_none());
        assert_eq!(json["mode"], "words");
    }
}
