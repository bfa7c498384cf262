use crate::language::Quote;
use serde::Serialize;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Countdown,
    Waiting,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordResult {
    pub word: String,
    pub typed: String,
    pub correct: bool,
}

/// One immutable snapshot of a test run. The engine never edits a published
/// snapshot; every transition builds a new one and swaps it in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestState {
    pub status: Status,
    pub words: Vec<String>,
    pub current_word_index: usize,
    pub current_input: String,
    pub composition_text: String,
    pub word_results: Vec<WordResult>,
    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
    pub correct_chars: usize,
    pub incorrect_chars: usize,
    pub current_quote: Option<Quote>,
    pub wpm_history: Vec<f64>,
}

impl TestState {
    pub fn new(words: Vec<String>, current_quote: Option<Quote>) -> Self {
        Self::with_status(Status::Waiting, words, current_quote)
    }

    pub fn with_status(status: Status, words: Vec<String>, current_quote: Option<Quote>) -> Self {
        Self {
            status,
            words,
            current_word_index: 0,
            current_input: String::new(),
            composition_text: String::new(),
            word_results: Vec::new(),
            start_time: None,
            end_time: None,
            correct_chars: 0,
            incorrect_chars: 0,
            current_quote,
            wpm_history: Vec::new(),
        }
    }

    pub fn current_word(&self) -> Option<&str> {
        self.words.get(self.current_word_index).map(String::as_str)
    }

    pub fn is_last_word(&self) -> bool {
        !self.words.is_empty() && self.current_word_index == self.words.len() - 1
    }

    pub fn remaining_words(&self) -> usize {
        self.words.len().saturating_sub(self.current_word_index)
    }

    pub fn has_finished(&self) -> bool {
        self.status == Status::Finished
    }
}
