//! How input events turn one [`TestState`] into the next.
//!
//! Everything here is pure: functions take the current snapshot and return
//! a new one, leaving gating, timers and word generation to the engine.

use crate::metrics::raw_wpm;
use crate::result::elapsed_ms;
use crate::session::{Status, TestState, WordResult};
use std::time::SystemTime;

pub const IDEOGRAPHIC_SPACE: char = '\u{3000}';

/// What a key event means to the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Char(char),
    Submit,
    Backspace,
    Ignored,
}

/// Classify a DOM-style key name with its modifier state.
///
/// Ctrl+Alt is AltGr on several international layouts and is allowed
/// through for single printable characters; any other modifier use drops
/// the event.
pub fn classify_key(key: &str, ctrl: bool, alt: bool, meta: bool) -> KeyClass {
    if key == "Dead" || key == "Unidentified" || meta {
        return KeyClass::Ignored;
    }

    let mut chars = key.chars();
    let single = match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_control() => Some(c),
        _ => None,
    };

    let altgr = ctrl && alt && single.is_some();
    if (ctrl || alt) && !altgr {
        return KeyClass::Ignored;
    }

    match (key, single) {
        ("Backspace", _) => KeyClass::Backspace,
        (_, Some(c)) if is_submit(c) => KeyClass::Submit,
        (_, Some(c)) => KeyClass::Char(c),
        _ => KeyClass::Ignored,
    }
}

/// Half-width or full-width space.
pub fn is_submit(c: char) -> bool {
    c == ' ' || c == IDEOGRAPHIC_SPACE
}

/// Event kinds for the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Char,
    Submit,
    Backspace,
    CompositionStart,
    CompositionUpdate,
    CompositionCommit,
    CompositionCancel,
    Tick,
    CountdownElapsed,
    WordsCompleted,
    TimeUp,
    Restart,
    RestartWithCountdown,
}

/// The status an event leads to, or `None` when the event is not allowed
/// in `status` and must be dropped without touching state.
pub fn transition(status: Status, event: EventKind) -> Option<Status> {
    use EventKind::*;
    use Status::*;

    match (status, event) {
        (_, Restart) => Some(Waiting),
        (_, RestartWithCountdown) => Some(Countdown),
        (Countdown, CountdownElapsed) => Some(Waiting),

        (Waiting, Char | Submit | CompositionCommit) => Some(Running),
        (Waiting, Backspace | CompositionStart | CompositionUpdate | CompositionCancel) => {
            Some(Waiting)
        }

        (
            Running,
            Char | Submit | Backspace | CompositionStart | CompositionUpdate | CompositionCommit
            | CompositionCancel | Tick,
        ) => Some(Running),
        (Running, WordsCompleted | TimeUp) => Some(Finished),

        _ => None,
    }
}

/// Per-position comparison over the longer of the two strings.
/// Returns `(correct, incorrect)`.
pub fn score_word(typed: &str, word: &str) -> (usize, usize) {
    let typed: Vec<char> = typed.chars().collect();
    let word: Vec<char> = word.chars().collect();
    let len = typed.len().max(word.len());

    let correct = (0..len)
        .filter(|&i| matches!((typed.get(i), word.get(i)), (Some(a), Some(b)) if a == b))
        .count();
    (correct, len - correct)
}

fn begin_if_waiting(state: &mut TestState, now: SystemTime) {
    if state.status == Status::Waiting {
        state.status = Status::Running;
        state.start_time = Some(now);
    }
}

/// End the run through the transition table; a state that cannot take
/// `event` is left as it is.
fn finish(state: &mut TestState, event: EventKind, now: SystemTime) {
    if let Some(status) = transition(state.status, event) {
        state.status = status;
        state.end_time = Some(now);
    }
}

/// Append typed text (a character or a committed composition).
///
/// With `auto_finish`, completing the last word exactly ends the test
/// without a submit key and without the separator bonus.
pub fn append_input(state: &TestState, text: &str, auto_finish: bool, now: SystemTime) -> TestState {
    let mut next = state.clone();
    begin_if_waiting(&mut next, now);
    next.current_input.push_str(text);

    if auto_finish && next.is_last_word() && next.current_word() == Some(next.current_input.as_str()) {
        let word = next.current_input.clone();
        next.correct_chars += word.chars().count();
        next.word_results.push(WordResult {
            typed: word.clone(),
            word,
            correct: true,
        });
        next.current_word_index = next.words.len();
        next.current_input.clear();
        finish(&mut next, EventKind::WordsCompleted, now);
    }
    next
}

/// Drop the last typed character. `None` when there is nothing to delete;
/// submitted words are never reopened.
pub fn apply_backspace(state: &TestState) -> Option<TestState> {
    if state.current_input.is_empty() {
        return None;
    }
    let mut next = state.clone();
    next.current_input.pop();
    Some(next)
}

/// Submit the current input against the current word.
///
/// `finish_when_exhausted` ends the test once the last word is submitted;
/// time mode passes `false` and extends the list instead.
pub fn apply_submit(state: &TestState, finish_when_exhausted: bool, now: SystemTime) -> TestState {
    let mut next = state.clone();
    let Some(word) = next.current_word().map(String::from) else {
        return next;
    };
    begin_if_waiting(&mut next, now);

    let typed = std::mem::take(&mut next.current_input);
    let (correct, incorrect) = score_word(&typed, &word);
    // one extra unit for the separator itself
    next.correct_chars += correct + 1;
    next.incorrect_chars += incorrect;
    next.word_results.push(WordResult {
        correct: typed == word,
        typed,
        word,
    });
    next.current_word_index += 1;

    if finish_when_exhausted && next.current_word_index >= next.words.len() {
        finish(&mut next, EventKind::WordsCompleted, now);
    }
    next
}

pub fn apply_composition_start(state: &TestState) -> TestState {
    let mut next = state.clone();
    next.composition_text.clear();
    next
}

pub fn apply_composition_update(state: &TestState, data: &str) -> TestState {
    let mut next = state.clone();
    next.composition_text = data.to_string();
    next
}

/// Commit a finished composition. An empty commit is a cancellation and
/// only clears the pending buffer.
pub fn apply_composition_end(
    state: &TestState,
    data: &str,
    auto_finish: bool,
    now: SystemTime,
) -> TestState {
    let mut cleared = state.clone();
    cleared.composition_text.clear();
    if data.is_empty() {
        return cleared;
    }
    append_input(&cleared, data, auto_finish, now)
}

/// One-second snapshot: record live WPM (up to `history_cap` entries) and
/// end a timed test whose duration has elapsed.
pub fn apply_tick(
    state: &TestState,
    now: SystemTime,
    history_cap: usize,
    duration_secs: Option<u64>,
) -> TestState {
    let mut next = state.clone();
    let elapsed = elapsed_ms(next.start_time, now);

    if next.wpm_history.len() < history_cap {
        next.wpm_history.push(raw_wpm(next.correct_chars, elapsed));
    }
    if let Some(duration) = duration_secs {
        if elapsed >= duration as f64 * 1000.0 {
            finish(&mut next, EventKind::TimeUp, now);
        }
    }
    next
}
