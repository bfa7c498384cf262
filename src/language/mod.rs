pub mod core;
pub mod formatter;
pub mod quotes;
pub mod source;

// Re-export the main types for convenience
pub use self::core::{available_languages, Language};
pub use formatter::{
    CompositeFormatter, NumberFormatter, PlainFormatter, PunctuationFormatter, WordFormatter,
};
pub use quotes::{quote_to_words, Quote, QuoteBank};
pub use source::{BundledWordSource, FixedWordSource, WordSource};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WordOptions;

    #[test]
    fn test_integrated_generation() {
        let source = BundledWordSource::new();
        let words = source
            .generate_words(
                20,
                WordOptions {
                    punctuation: true,
                    numbers: true,
                },
                "english",
            )
            .unwrap();

        assert_eq!(words.len(), 20);
        assert!(words.iter().all(|w| !w.is_empty() && !w.contains(' ')));
        assert!(words[0].chars().next().unwrap().is_uppercase()
            || words[0].chars().all(|c| c.is_ascii_digit() || c.is_ascii_punctuation()));
    }
}
