use crate::config::QuoteLength;
use thiserror::Error;

/// Failures reported by word/quote sources and the config store.
///
/// None of these ever escape an [`crate::engine::Engine`] command: the
/// engine logs them and degrades to ignoring the request or falling back
/// to the default language.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("language `{0}` is not available")]
    LanguageUnavailable(String),

    #[error("word list for `{0}` is empty")]
    EmptyWordList(String),

    #[error("no {length} quotes for language `{language}`")]
    NoQuotes {
        length: QuoteLength,
        language: String,
    },

    #[error("unable to parse language data for `{language}`")]
    LanguageData {
        language: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
