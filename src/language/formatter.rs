use rand::seq::SliceRandom;
use rand::Rng;

/// Token-level decoration applied to a freshly selected word list.
///
/// Formatters keep one output token per input token so the engine can
/// compare typed words against targets one by one.
pub trait WordFormatter: Send + Sync {
    fn format(&self, words: Vec<String>) -> Vec<String>;
}

/// Leaves words untouched.
pub struct PlainFormatter;

impl WordFormatter for PlainFormatter {
    fn format(&self, words: Vec<String>) -> Vec<String> {
        words
    }
}

/// Sentence-style punctuation: capitalised sentence starts, commas and
/// terminal marks attached to the preceding word.
pub struct PunctuationFormatter;

impl WordFormatter for PunctuationFormatter {
    fn format(&self, words: Vec<String>) -> Vec<String> {
        if words.is_empty() {
            return words;
        }

        let rng = &mut rand::thread_rng();
        let last = words.len() - 1;
        let mut sentence_start = true;

        words
            .into_iter()
            .enumerate()
            .map(|(i, word)| {
                let mut formatted = if sentence_start {
                    capitalize_first_letter(&word)
                } else {
                    word
                };
                sentence_start = false;

                if i == last {
                    formatted.push(terminal_mark(rng));
                    return formatted;
                }

                match rng.gen_range(0..100) {
                    0..=9 => {
                        formatted.push(terminal_mark(rng));
                        sentence_start = true;
                    }
                    10..=21 => formatted.push(','),
                    22..=24 => formatted.push(*[';', ':'].choose(rng).unwrap_or(&';')),
                    _ => {}
                }
                formatted
            })
            .collect()
    }
}

fn terminal_mark<R: Rng>(rng: &mut R) -> char {
    match rng.gen_range(0..100) {
        0..=79 => '.',
        80..=91 => '?',
        _ => '!',
    }
}

/// Swaps roughly one word in ten for a short number.
pub struct NumberFormatter;

impl WordFormatter for NumberFormatter {
    fn format(&self, words: Vec<String>) -> Vec<String> {
        let rng = &mut rand::thread_rng();
        words
            .into_iter()
            .map(|word| {
                if rng.gen_bool(0.1) {
                    random_number(rng)
                } else {
                    word
                }
            })
            .collect()
    }
}

fn random_number<R: Rng>(rng: &mut R) -> String {
    let digits = rng.gen_range(1..=4);
    (0..digits)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Applies its formatters in sequence.
pub struct CompositeFormatter {
    formatters: Vec<Box<dyn WordFormatter>>,
}

impl Default for CompositeFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeFormatter {
    pub fn new() -> Self {
        Self {
            formatters: Vec::new(),
        }
    }

    pub fn add_formatter(mut self, formatter: Box<dyn WordFormatter>) -> Self {
        self.formatters.push(formatter);
        self
    }

    pub fn build_from_flags(punctuation: bool, numbers: bool) -> Box<dyn WordFormatter> {
        if !punctuation && !numbers {
            return Box::new(PlainFormatter);
        }

        // Numbers first so a number can still end a sentence.
        let mut composite = CompositeFormatter::new();
        if numbers {
            composite = composite.add_formatter(Box::new(NumberFormatter));
        }
        if punctuation {
            composite = composite.add_formatter(Box::new(PunctuationFormatter));
        }
        Box::new(composite)
    }
}

impl WordFormatter for CompositeFormatter {
    fn format(&self, words: Vec<String>) -> Vec<String> {
        self.formatters
            .iter()
            .fold(words, |current, formatter| formatter.format(current))
    }
}

pub fn capitalize_first_letter(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() => first.to_uppercase().chain(chars).collect(),
        _ => word.to_string(),
    }
}
