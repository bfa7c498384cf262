//! Pure scoring functions shared by the engine and the result builder.

use crate::result::TestResult;

/// Words per minute for `total_chars` typed over `duration_ms`, rounded.
pub fn raw_wpm(total_chars: usize, duration_ms: f64) -> f64 {
    if duration_ms <= 0.0 {
        return 0.0;
    }
    ((total_chars as f64 / 5.0) / (duration_ms / 60_000.0)).round()
}

/// Percentage of scored characters that were correct, rounded.
pub fn accuracy(correct_chars: usize, incorrect_chars: usize) -> f64 {
    let total = correct_chars + incorrect_chars;
    if total == 0 {
        return 100.0;
    }
    (correct_chars as f64 / total as f64 * 100.0).round()
}

/// 100 minus the coefficient of variation of the WPM snapshots, in `[0, 100]`.
///
/// A series that is not perfectly flat never scores a full 100.
pub fn consistency(wpm_history: &[f64]) -> f64 {
    if wpm_history.len() <= 1 {
        return 100.0;
    }
    let (Some(avg), Some(sd)) = (mean(wpm_history), std_dev(wpm_history)) else {
        return 100.0;
    };
    if avg == 0.0 {
        return 100.0;
    }
    if sd == 0.0 {
        return 100.0;
    }
    (100.0 - 100.0 * sd / avg).round().clamp(0.0, 99.0)
}

/// Identity of a test configuration for personal-best bucketing.
pub fn config_key(result: &TestResult) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        result.mode, result.mode2, result.language, result.punctuation, result.numbers
    )
}

/// True when nothing in `history` shares the result's configuration, or
/// the result beats the best WPM among those that do.
pub fn is_personal_best(result: &TestResult, history: &[TestResult]) -> bool {
    let key = config_key(result);
    history
        .iter()
        .filter(|r| config_key(r) == key)
        .map(|r| r.wpm)
        .max_by(f64::total_cmp)
        .map_or(true, |best| result.wpm > best)
}

/// Keep the first `max` results; callers store newest first.
pub fn trim_results<T>(results: &mut Vec<T>, max: usize) {
    results.truncate(max);
}

fn mean(data: &[f64]) -> Option<f64> {
    match data.len() {
        0 => None,
        count => Some(data.iter().sum::<f64>() / count as f64),
    }
}

fn std_dev(data: &[f64]) -> Option<f64> {
    let data_mean = mean(data)?;
    let variance = data
        .iter()
        .map(|value| {
            let diff = data_mean - *value;
            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use chrono::Utc;

    fn result(wpm: f64) -> TestResult {
        TestResult {
            wpm,
            raw_wpm: wpm,
            accuracy: 100.0,
            consistency: 100.0,
            correct_chars: 0,
            incorrect_chars: 0,
            mode: Mode::Words,
            mode2: "25".into(),
            language: "english".into(),
            punctuation: false,
            numbers: false,
            test_duration_secs: 10.0,
            timestamp: Utc::now(),
            wpm_history: Vec::new(),
            quote_id: None,
        }
    }

    #[test]
    fn test_raw_wpm() {
        assert_eq!(raw_wpm(300, 60_000.0), 60.0);
        assert_eq!(raw_wpm(150, 30_000.0), 60.0);
        assert_eq!(raw_wpm(52, 60_000.0), 10.0);
        assert_eq!(raw_wpm(100, 0.0), 0.0);
        assert_eq!(raw_wpm(100, -5.0), 0.0);
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(90, 10), 90.0);
        assert_eq!(accuracy(2, 1), 67.0);
        assert_eq!(accuracy(0, 0), 100.0);
    }

    #[test]
    fn consistency_degenerate_series() {
        assert_eq!(consistency(&[]), 100.0);
        assert_eq!(consistency(&[42.0]), 100.0);
        assert_eq!(consistency(&[60.0, 60.0, 60.0]), 100.0);
        assert_eq!(consistency(&[0.0, 0.0]), 100.0);
    }

    #[test]
    fn consistency_varied_series() {
        // mean 101.2, population sd 10.32 -> 89.8
        assert_eq!(consistency(&[100., 120., 90., 102., 94.]), 90.0);
        assert_eq!(consistency(&[0.0, 100.0]), 0.0);
        let nearly_flat = consistency(&[1000.0, 1001.0]);
        assert!((0.0..100.0).contains(&nearly_flat));
        // sd larger than the mean clamps at zero
        assert_eq!(consistency(&[0.0, 0.0, 0.0, 90.0]), 0.0);
    }

    #[test]
    fn personal_best_against_empty_history() {
        assert!(is_personal_best(&result(40.0), &[]));
    }

    #[test]
    fn personal_best_compares_same_config_only() {
        let history = vec![result(80.0), result(55.0)];
        assert!(!is_personal_best(&result(70.0), &history));
        assert!(!is_personal_best(&result(80.0), &history));
        assert!(is_personal_best(&result(81.0), &history));

        let mut other = result(200.0);
        other.mode2 = "50".into();
        assert!(is_personal_best(&result(70.0), &[other.clone()]));

        other.mode2 = "25".into();
        other.language = "german".into();
        assert!(is_personal_best(&result(70.0), &[other.clone()]));

        other.language = "english".into();
        other.punctuation = true;
        assert!(is_personal_best(&result(70.0), &[other.clone()]));

        other.punctuation = false;
        other.numbers = true;
        assert!(is_personal_best(&result(70.0), &[other]));
    }

    #[test]
    fn config_key_covers_all_parts() {
        let mut r = result(1.0);
        r.punctuation = true;
        assert_eq!(config_key(&r), "words|25|english|true|false");
    }

    #[test]
    fn trim_keeps_newest_prefix() {
        let mut results = vec![5, 4, 3, 2, 1];
        trim_results(&mut results, 3);
        assert_eq!(results, vec![5, 4, 3]);
        trim_results(&mut results, 10);
        assert_eq!(results.len(), 3);
    }
}
