use super::core::bundled_file;
use crate::config::QuoteLength;
use crate::error::EngineError;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: u32,
    pub text: String,
    pub source: String,
    /// Character count of `text`.
    #[serde(default)]
    pub length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteBank {
    pub language: String,
    pub quotes: Vec<Quote>,
}

impl QuoteBank {
    pub fn load(language: &str) -> Result<Self, EngineError> {
        let contents = bundled_file(&format!("quotes/{language}.json"))
            .ok_or_else(|| EngineError::LanguageUnavailable(language.to_string()))?;

        let mut bank: QuoteBank =
            serde_json::from_str(contents).map_err(|source| EngineError::LanguageData {
                language: language.to_string(),
                source,
            })?;

        // Stored lengths are advisory; bucket by what will actually be typed.
        for quote in &mut bank.quotes {
            quote.length = quote.text.chars().count();
        }
        Ok(bank)
    }

    pub fn select(&self, length: QuoteLength) -> Result<Quote, EngineError> {
        let candidates: Vec<&Quote> = self
            .quotes
            .iter()
            .filter(|q| length.contains(q.length))
            .collect();

        candidates
            .choose(&mut rand::thread_rng())
            .map(|q| (*q).clone())
            .ok_or_else(|| EngineError::NoQuotes {
                length,
                language: self.language.clone(),
            })
    }
}

pub fn quote_to_words(quote: &Quote) -> Vec<String> {
    quote.text.split_whitespace().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn bank() -> QuoteBank {
        QuoteBank {
            language: "test".into(),
            quotes: vec![Quote {
                id: 7,
                text: "short and sweet".into(),
                source: "nobody".into(),
                length: 15,
            }],
        }
    }

    #[test]
    fn bundled_english_has_every_bucket() {
        let bank = QuoteBank::load("english").unwrap();
        for length in [
            QuoteLength::Short,
            QuoteLength::Medium,
            QuoteLength::Long,
            QuoteLength::All,
        ] {
            let quote = bank.select(length).unwrap();
            assert!(length.contains(quote.length), "{length}: {}", quote.length);
        }
    }

    #[test]
    fn empty_bucket_is_an_error() {
        assert_matches!(
            bank().select(QuoteLength::Long),
            Err(EngineError::NoQuotes { length: QuoteLength::Long, .. })
        );
        assert_eq!(bank().select(QuoteLength::Short).unwrap().id, 7);
    }

    #[test]
    fn words_split_on_whitespace() {
        let quote = Quote {
            id: 1,
            text: "  one two\nthree  ".into(),
            source: String::new(),
            length: 0,
        };
        assert_eq!(quote_to_words(&quote), vec!["one", "two", "three"]);
    }
}
