//! libpredict-core
//!
//! Predictive continuation for input-method sessions. After the user commits
//! or selects text, the predictor asks a predict engine for a continuation,
//! shows it as a trailing composition segment, and interprets the following
//! keystrokes as accepting, extending or dismissing it.
//!
//! Public API:
//! - `Predictor` - key interception and the select/update/option reactions
//! - `PredictEngine` - the prediction backend interface, with a table-backed
//!   implementation in `TablePredictEngine`
//! - `Context` - input, composition, commit history and notification channels
//! - `Session` - host glue wiring a context, a predictor and a small editor
//! - `Config` - schema settings (page size, selector keys, speller letters)

use serde::{Deserialize, Serialize};

pub mod candidate;
pub use candidate::{Candidate, CandidateKind};

pub mod composition;
pub use composition::{Composition, Segment, SegmentStatus, SegmentTag};

pub mod commit;
pub use commit::{CommitHistory, CommitRecord};

pub mod key_event;
pub use key_event::{KeyEvent, KeyParseError, Modifiers};

pub mod context;
pub use context::{Connection, Context, Notifier};

pub mod predict_engine;
pub use predict_engine::{
    PredictEngine, PredictEngineComponent, PredictEngineFactory, PredictTable,
    SharedPredictEngine, TablePredictEngine,
};

pub mod predictor;
pub use predictor::{LastAction, ProcessResult, Predictor, PredictorComponent};

pub mod session;
pub use session::Session;

/// Speller settings: which letters start a new syllable.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SpellerConfig {
    /// Letters that may begin input; falls back to `alphabet` when unset
    pub initials: Option<String>,
    /// Letters accepted by the speller
    pub alphabet: String,
}

impl Default for SpellerConfig {
    fn default() -> Self {
        Self {
            initials: None,
            alphabet: "zyxwvutsrqponmlkjihgfedcba".to_string(),
        }
    }
}

/// Predict engine settings.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Maximum candidates offered per prediction (0 = unlimited)
    pub max_candidates: usize,
    /// Maximum consecutive accepted predictions (0 = unlimited)
    pub max_iterations: usize,
}

/// Schema configuration read once when a session is created.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Candidates per menu page
    pub page_size: usize,
    /// Keys selecting candidates by page position (e.g. "asdf");
    /// empty means digits select
    pub select_keys: String,
    /// Commit confirmed selections immediately
    pub auto_commit: bool,
    /// Initial value of the `prediction` option
    pub prediction: bool,
    pub speller: SpellerConfig,
    pub predictor: PredictorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: 5,
            select_keys: String::new(),
            auto_commit: true,
            prediction: true,
            speller: SpellerConfig::default(),
            predictor: PredictorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context as _;
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.page_size > 0, "page_size must be positive");
        anyhow::ensure!(
            self.select_keys.chars().all(|c| c.is_ascii_graphic()),
            "select_keys must be printable ASCII, got {:?}",
            self.select_keys
        );
        Ok(())
    }

    /// Letters that start new input after a prediction.
    pub fn initials(&self) -> &str {
        self.speller
            .initials
            .as_deref()
            .unwrap_or(&self.speller.alphabet)
    }
}

/// Utility helpers.
pub mod utils {
    /// Normalize input strings (NFC) and trim whitespace.
    pub fn normalize(s: &str) -> String {
        use unicode_normalization::UnicodeNormalization;
        s.nfc().collect::<String>().trim().to_string()
    }
}
