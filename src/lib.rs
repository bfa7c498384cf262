// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod config;
pub mod engine;
pub mod error;
pub mod language;
pub mod layer;
pub mod metrics;
pub mod result;
pub mod runtime;
pub mod session;
pub mod typing_policy;

pub use config::{EnginePolicy, Preferences, QuoteLength, TestConfig};
pub use engine::{Engine, LanguageHandle};
pub use error::EngineError;
pub use layer::{resolve_effective_layer, Keycode, Keymap};
pub use result::TestResult;
pub use session::{Status, TestState};
