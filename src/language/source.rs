use super::core::Language;
use super::formatter::CompositeFormatter;
use super::quotes::{Quote, QuoteBank};
use crate::config::{QuoteLength, WordOptions};
use crate::error::EngineError;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Where test words and quotes come from.
///
/// `generate_words` and `select_quote` may be slow (they can load a language
/// on first use), so the engine calls them from worker threads unless
/// `is_loaded` says the language is already resident.
pub trait WordSource: Send + Sync {
    fn load_language(&self, language: &str) -> Result<(), EngineError>;

    fn is_loaded(&self, language: &str) -> bool;

    fn generate_words(
        &self,
        count: usize,
        options: WordOptions,
        language: &str,
    ) -> Result<Vec<String>, EngineError>;

    fn select_quote(&self, length: QuoteLength, language: &str) -> Result<Quote, EngineError>;
}

#[derive(Default)]
struct LoadedLanguage {
    words: Option<Arc<Language>>,
    quotes: Option<Arc<QuoteBank>>,
}

/// Word lists and quote banks compiled into the binary, parsed lazily and
/// cached per language.
#[derive(Default)]
pub struct BundledWordSource {
    cache: Mutex<HashMap<String, LoadedLanguage>>,
}

impl BundledWordSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn words(&self, language: &str) -> Result<Arc<Language>, EngineError> {
        if let Some(lang) = self.cached(language, |l| l.words.clone()) {
            return Ok(lang);
        }
        let lang = Arc::new(Language::load(language)?);
        debug!("loaded word list `{language}` ({} words)", lang.words.len());
        self.store(language, |l| l.words = Some(lang.clone()));
        Ok(lang)
    }

    fn quotes(&self, language: &str) -> Result<Arc<QuoteBank>, EngineError> {
        if let Some(bank) = self.cached(language, |l| l.quotes.clone()) {
            return Ok(bank);
        }
        let bank = Arc::new(QuoteBank::load(language)?);
        debug!("loaded quote bank `{language}` ({} quotes)", bank.quotes.len());
        self.store(language, |l| l.quotes = Some(bank.clone()));
        Ok(bank)
    }

    fn cached<T>(&self, language: &str, f: impl FnOnce(&LoadedLanguage) -> Option<T>) -> Option<T> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(language).and_then(f)
    }

    fn store(&self, language: &str, f: impl FnOnce(&mut LoadedLanguage)) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        f(cache.entry(language.to_string()).or_default());
    }
}

impl WordSource for BundledWordSource {
    fn load_language(&self, language: &str) -> Result<(), EngineError> {
        self.words(language)?;
        // Some languages ship without quotes; quote mode reports that on use.
        if let Err(e) = self.quotes(language) {
            debug!("no quotes for `{language}`: {e}");
        }
        Ok(())
    }

    fn is_loaded(&self, language: &str) -> bool {
        self.cached(language, |l| l.words.as_ref().map(|_| ()))
            .is_some()
    }

    fn generate_words(
        &self,
        count: usize,
        options: WordOptions,
        language: &str,
    ) -> Result<Vec<String>, EngineError> {
        let lang = self.words(language)?;
        let formatter = CompositeFormatter::build_from_flags(options.punctuation, options.numbers);
        Ok(formatter.format(lang.get_random(count)))
    }

    fn select_quote(&self, length: QuoteLength, language: &str) -> Result<Quote, EngineError> {
        self.quotes(language)?.select(length)
    }
}

/// Caller-supplied word lists keyed by language. Lists are cycled to the
/// requested count and returned undecorated; options are ignored.
///
/// Loading a language can be slowed with [`FixedWordSource::with_delay`],
/// which makes the source handy for driving the engine deterministically.
#[derive(Default)]
pub struct FixedWordSource {
    languages: HashMap<String, Vec<String>>,
    quotes: HashMap<String, Vec<Quote>>,
    delays: HashMap<String, Duration>,
    loaded: Mutex<HashSet<String>>,
}

impl FixedWordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, language: &str, words: &[&str]) -> Self {
        self.languages.insert(
            language.to_string(),
            words.iter().map(|w| w.to_string()).collect(),
        );
        self
    }

    pub fn with_quote(mut self, language: &str, id: u32, text: &str) -> Self {
        self.quotes.entry(language.to_string()).or_default().push(Quote {
            id,
            text: text.to_string(),
            source: "fixed".to_string(),
            length: text.chars().count(),
        });
        self
    }

    pub fn with_delay(mut self, language: &str, delay: Duration) -> Self {
        self.delays.insert(language.to_string(), delay);
        self
    }

    fn list(&self, language: &str) -> Result<&[String], EngineError> {
        let words = self
            .languages
            .get(language)
            .ok_or_else(|| EngineError::LanguageUnavailable(language.to_string()))?;
        if words.is_empty() {
            return Err(EngineError::EmptyWordList(language.to_string()));
        }
        Ok(words)
    }
}

impl WordSource for FixedWordSource {
    fn load_language(&self, language: &str) -> Result<(), EngineError> {
        if let Some(delay) = self.delays.get(language) {
            std::thread::sleep(*delay);
        }
        self.list(language)?;
        self.loaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(language.to_string());
        Ok(())
    }

    fn is_loaded(&self, language: &str) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(language)
    }

    fn generate_words(
        &self,
        count: usize,
        _options: WordOptions,
        language: &str,
    ) -> Result<Vec<String>, EngineError> {
        let words = self.list(language)?;
        Ok(words.iter().cycle().take(count).cloned().collect())
    }

    fn select_quote(&self, length: QuoteLength, language: &str) -> Result<Quote, EngineError> {
        self.list(language)?;
        self.quotes
            .get(language)
            .and_then(|quotes| quotes.iter().find(|q| length.contains(q.length)))
            .cloned()
            .ok_or_else(|| EngineError::NoQuotes {
                length,
                language: language.to_string(),
            })
    }
}
