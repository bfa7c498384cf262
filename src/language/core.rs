use crate::error::EngineError;
use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

pub(crate) static LANG_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/lang");

#[derive(Deserialize, Clone, Debug)]
pub struct Language {
    pub name: String,
    pub words: Vec<String>,
}

impl Language {
    /// Load a bundled word list by language name.
    pub fn load(name: &str) -> Result<Self, EngineError> {
        let contents = bundled_file(&format!("{name}.json"))
            .ok_or_else(|| EngineError::LanguageUnavailable(name.to_string()))?;

        let lang: Language =
            serde_json::from_str(contents).map_err(|source| EngineError::LanguageData {
                language: name.to_string(),
                source,
            })?;

        if lang.words.is_empty() {
            return Err(EngineError::EmptyWordList(name.to_string()));
        }
        Ok(lang)
    }

    /// Draw `num` words. Unlike a plain sample this may repeat words, so a
    /// small list can still fill a long test; it never repeats the same
    /// word twice in a row when the list has more than one entry.
    pub fn get_random(&self, num: usize) -> Vec<String> {
        let rng = &mut rand::thread_rng();
        let mut out: Vec<String> = Vec::with_capacity(num);

        while out.len() < num {
            let word = if self.words.len() > 1 {
                let idx = rng.gen_range(0..self.words.len());
                match out.last() {
                    Some(prev) if *prev == self.words[idx] => continue,
                    _ => &self.words[idx],
                }
            } else {
                match self.words.choose(rng) {
                    Some(w) => w,
                    None => break,
                }
            };
            out.push(word.clone());
        }
        out
    }
}

pub(crate) fn bundled_file(path: &str) -> Option<&'static str> {
    LANG_DIR.get_file(path).and_then(|f| f.contents_utf8())
}

/// Names of every bundled word list.
pub fn available_languages() -> Vec<String> {
    let mut names: Vec<String> = LANG_DIR
        .files()
        .filter_map(|f| {
            let path = f.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some("json") => path.file_stem().and_then(|s| s.to_str()).map(String::from),
                _ => None,
            }
        })
        .collect();
    names.sort();
    names
}
