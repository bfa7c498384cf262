use directories::ProjectDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Quote length buckets, measured in characters of quote text.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QuoteLength {
    Short,
    Medium,
    Long,
    All,
}

impl QuoteLength {
    /// Whether a quote of `chars` characters belongs in this bucket.
    pub fn contains(&self, chars: usize) -> bool {
        match self {
            QuoteLength::Short => chars <= 100,
            QuoteLength::Medium => (101..=300).contains(&chars),
            QuoteLength::Long => chars > 300,
            QuoteLength::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WordOptions {
    pub punctuation: bool,
    pub numbers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Words,
    Time,
    Quote,
}

/// Active test configuration. Exactly one variant is live at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TestConfig {
    Words {
        word_count: usize,
        #[serde(default)]
        punctuation: bool,
        #[serde(default)]
        numbers: bool,
    },
    Time {
        duration: u64,
        #[serde(default)]
        punctuation: bool,
        #[serde(default)]
        numbers: bool,
    },
    Quote {
        quote_length: QuoteLength,
    },
}

impl Default for TestConfig {
    fn default() -> Self {
        TestConfig::Words {
            word_count: 25,
            punctuation: false,
            numbers: false,
        }
    }
}

impl TestConfig {
    pub fn mode(&self) -> Mode {
        match self {
            TestConfig::Words { .. } => Mode::Words,
            TestConfig::Time { .. } => Mode::Time,
            TestConfig::Quote { .. } => Mode::Quote,
        }
    }

    /// The mode-specific parameter: word count, duration or quote length.
    pub fn mode2(&self) -> String {
        match self {
            TestConfig::Words { word_count, .. } => word_count.to_string(),
            TestConfig::Time { duration, .. } => duration.to_string(),
            TestConfig::Quote { quote_length } => quote_length.to_string(),
        }
    }

    pub fn options(&self) -> WordOptions {
        match *self {
            TestConfig::Words {
                punctuation,
                numbers,
                ..
            }
            | TestConfig::Time {
                punctuation,
                numbers,
                ..
            } => WordOptions {
                punctuation,
                numbers,
            },
            TestConfig::Quote { .. } => WordOptions::default(),
        }
    }

    pub fn duration_secs(&self) -> Option<u64> {
        match self {
            TestConfig::Time { duration, .. } => Some(*duration),
            _ => None,
        }
    }

    pub fn is_time(&self) -> bool {
        matches!(self, TestConfig::Time { .. })
    }
}

/// Policy constants for the engine. Every field falls back to its default
/// when missing from a stored config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginePolicy {
    pub countdown_ms: u64,
    pub wpm_history_cap: usize,
    /// Time mode extends the word list once fewer than this many words remain.
    pub low_water_mark: usize,
    pub extension_batch: usize,
    pub time_mode_initial_words: usize,
    pub raw_space_guard_ms: u64,
    pub default_language: String,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            countdown_ms: 3000,
            wpm_history_cap: 300,
            low_water_mark: 10,
            extension_batch: 60,
            time_mode_initial_words: 100,
            raw_space_guard_ms: 50,
            default_language: "english".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub test: TestConfig,
    pub language: String,
    pub policy: EnginePolicy,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            test: TestConfig::default(),
            language: "english".to_string(),
            policy: EnginePolicy::default(),
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Preferences;
    fn save(&self, prefs: &Preferences) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "keytest") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("keytest_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Preferences {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return Preferences::default(),
        };
        match serde_json::from_slice::<Preferences>(&bytes) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!("ignoring unreadable config {}: {e}", self.path.display());
                Preferences::default()
            }
        }
    }

    fn save(&self, prefs: &Preferences) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(prefs)?;
        fs::write(&self.path, data)
    }
}
