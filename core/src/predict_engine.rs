//! Prediction backend.
//!
//! The predictor only talks to the [`PredictEngine`] trait: compute a
//! prediction for a query, turn the cached result into a composition segment,
//! forget it, and report the iteration cap. [`TablePredictEngine`] is the
//! bundled implementation, backed by a [`PredictTable`] that maps a committed
//! text to its likely continuations.
//!
//! Table files are TOML or JSON with a single `entries` map:
//!
//! ```toml
//! [entries]
//! "你好" = ["吗", "世界"]
//! "世界" = ["和平"]
//! ```

use crate::candidate::Candidate;
use crate::composition::{Segment, SegmentTag};
use crate::context::Context;
use crate::utils::normalize;
use crate::PredictorConfig;
use ahash::AHashMap;
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

/// Computes continuations and materializes them as composition segments.
pub trait PredictEngine {
    /// Compute and cache a prediction for `query`.
    ///
    /// Returns false, dropping any cached prediction, when nothing fits.
    fn predict(&mut self, ctx: &Context, query: &str) -> bool;

    /// Append the cached prediction to the composition as a segment tagged
    /// [`SegmentTag::Prediction`].
    fn create_predict_segment(&self, ctx: &mut Context);

    /// Forget the cached prediction.
    fn clear(&mut self);

    /// Consecutive accepted predictions allowed (0 = unlimited).
    fn max_iterations(&self) -> usize;
}

/// Predict engine shared between a session's predictor and its owner.
pub type SharedPredictEngine = Rc<RefCell<dyn PredictEngine>>;

/// Creates a predict engine for a session.
pub trait PredictEngineFactory {
    fn instance(&self, config: &PredictorConfig) -> Option<SharedPredictEngine>;
}

impl<F> PredictEngineFactory for F
where
    F: Fn(&PredictorConfig) -> Option<SharedPredictEngine>,
{
    fn instance(&self, config: &PredictorConfig) -> Option<SharedPredictEngine> {
        self(config)
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct TableFile {
    #[serde(default)]
    entries: BTreeMap<String, Vec<String>>,
}

/// Query -> ranked continuations.
#[derive(Debug, Clone, Default)]
pub struct PredictTable {
    entries: AHashMap<String, Vec<String>>,
}

impl PredictTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append continuations for `query`. Empty queries and texts are ignored.
    pub fn insert<I, S>(&mut self, query: &str, continuations: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = normalize(query);
        if key.is_empty() {
            return;
        }
        let list: Vec<String> = continuations
            .into_iter()
            .map(Into::into)
            .filter(|text: &String| !text.is_empty())
            .collect();
        if list.is_empty() {
            return;
        }
        self.entries.entry(key).or_default().extend(list);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact lookup of a normalized query.
    pub fn get(&self, query: &str) -> Option<&[String]> {
        self.entries.get(query).map(Vec::as_slice)
    }

    /// Look up `query`, then progressively shorter trailing suffixes of it.
    ///
    /// Returns the key that matched together with its continuations.
    pub fn lookup(&self, query: &str) -> Option<(&str, &[String])> {
        let query = normalize(query);
        query.char_indices().find_map(|(pos, _)| {
            self.entries
                .get_key_value(&query[pos..])
                .map(|(key, list)| (key.as_str(), list.as_slice()))
        })
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let file: TableFile = toml::from_str(content)?;
        Ok(Self::from_file(file))
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        let file: TableFile = serde_json::from_str(content)?;
        Ok(Self::from_file(file))
    }

    /// Load a table from disk; `.json` files are JSON, anything else TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading predict table {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let table = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        };
        let table = table.with_context(|| format!("parsing predict table {}", path.display()))?;
        tracing::info!(path = %path.display(), entries = table.len(), "loaded predict table");
        Ok(table)
    }

    fn from_file(file: TableFile) -> Self {
        let mut table = Self::new();
        for (query, list) in file.entries {
            table.insert(&query, list);
        }
        table
    }
}

/// Table-backed predict engine; one instance per session.
#[derive(Debug)]
pub struct TablePredictEngine {
    table: Rc<PredictTable>,
    max_candidates: usize,
    max_iterations: usize,
    /// Key of the cached prediction
    query: String,
    candidates: Vec<String>,
}

impl TablePredictEngine {
    pub fn new(table: Rc<PredictTable>, config: &PredictorConfig) -> Self {
        Self {
            table,
            max_candidates: config.max_candidates,
            max_iterations: config.max_iterations,
            query: String::new(),
            candidates: Vec::new(),
        }
    }

    /// Wrap the engine for sharing with a predictor.
    pub fn shared(self) -> SharedPredictEngine {
        Rc::new(RefCell::new(self))
    }

    /// Key of the cached prediction, empty when none.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }
}

impl PredictEngine for TablePredictEngine {
    fn predict(&mut self, _ctx: &Context, query: &str) -> bool {
        match self.table.lookup(query) {
            Some((key, list)) => {
                tracing::debug!(query, key, count = list.len(), "prediction found");
                self.query = key.to_string();
                self.candidates = list.to_vec();
                true
            }
            None => {
                tracing::debug!(query, "no prediction");
                self.clear();
                false
            }
        }
    }

    fn create_predict_segment(&self, ctx: &mut Context) {
        let end = ctx.input().len();
        let limit = match self.max_candidates {
            0 => usize::MAX,
            n => n,
        };
        let total = self.candidates.len();
        let menu: Vec<Candidate> = self
            .candidates
            .iter()
            .take(limit)
            .enumerate()
            .map(|(rank, text)| Candidate::prediction(text.clone(), (total - rank) as f32))
            .collect();
        let mut segment = Segment::with_menu(end, end, menu);
        segment.tag = SegmentTag::Prediction;
        if !ctx.composition_mut().add_segment(segment) {
            tracing::warn!(end, "prediction segment does not start at the current position");
        }
    }

    fn clear(&mut self) {
        self.query.clear();
        self.candidates.clear();
    }

    fn max_iterations(&self) -> usize {
        self.max_iterations
    }
}

/// Hands out table engines that share one loaded table.
#[derive(Debug, Clone)]
pub struct PredictEngineComponent {
    table: Rc<PredictTable>,
}

impl PredictEngineComponent {
    pub fn new(table: PredictTable) -> Self {
        Self {
            table: Rc::new(table),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self::new(PredictTable::load(path)?))
    }

    pub fn table(&self) -> &PredictTable {
        &self.table
    }
}

impl PredictEngineFactory for PredictEngineComponent {
    fn instance(&self, config: &PredictorConfig) -> Option<SharedPredictEngine> {
        Some(TablePredictEngine::new(Rc::clone(&self.table), config).shared())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateKind;
    use crate::composition::SegmentStatus;

    fn sample_table() -> PredictTable {
        let mut table = PredictTable::new();
        table.insert("你好", ["吗", "世界", "啊"]);
        table.insert("世界", ["和平"]);
        table
    }

    #[test]
    fn test_insert_ignores_empty() {
        let mut table = PredictTable::new();
        table.insert("", ["x"]);
        table.insert("a", Vec::<String>::new());
        table.insert("b", [""]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_lookup_exact_and_suffix() {
        let table = sample_table();
        let (key, list) = table.lookup("你好").unwrap();
        assert_eq!(key, "你好");
        assert_eq!(list, ["吗", "世界", "啊"]);

        let (key, list) = table.lookup("我们的世界").unwrap();
        assert_eq!(key, "世界");
        assert_eq!(list, ["和平"]);

        assert!(table.lookup("再见").is_none());
        assert!(table.lookup("").is_none());
    }

    #[test]
    fn test_from_toml_and_json() {
        let toml_table = PredictTable::from_toml_str(
            r#"
            [entries]
            "你好" = ["吗"]
            "#,
        )
        .unwrap();
        assert_eq!(toml_table.get("你好").unwrap(), ["吗"]);

        let json_table = PredictTable::from_json_str(r#"{"entries": {"hi": ["there"]}}"#).unwrap();
        assert_eq!(json_table.get("hi").unwrap(), ["there"]);

        assert!(PredictTable::from_json_str("{\"entries\": 3}").is_err());
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("table.json");
        std::fs::write(&json_path, r#"{"entries": {"a": ["b"]}}"#).unwrap();
        assert_eq!(PredictTable::load(&json_path).unwrap().len(), 1);

        let toml_path = dir.path().join("table.toml");
        std::fs::write(&toml_path, "[entries]\na = [\"b\", \"c\"]\n").unwrap();
        assert_eq!(PredictTable::load(&toml_path).unwrap().get("a").unwrap().len(), 2);

        assert!(PredictTable::load(dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn test_predict_caches_and_clears() {
        let ctx = Context::new();
        let mut engine = TablePredictEngine::new(Rc::new(sample_table()), &PredictorConfig::default());

        assert!(engine.predict(&ctx, "你好"));
        assert_eq!(engine.query(), "你好");
        assert_eq!(engine.candidates().len(), 3);

        assert!(!engine.predict(&ctx, "再见"));
        assert_eq!(engine.query(), "");
        assert!(engine.candidates().is_empty());
    }

    #[test]
    fn test_create_predict_segment() {
        let mut ctx = Context::new();
        let config = PredictorConfig {
            max_candidates: 2,
            max_iterations: 0,
        };
        let mut engine = TablePredictEngine::new(Rc::new(sample_table()), &config);
        assert!(engine.predict(&ctx, "你好"));
        engine.create_predict_segment(&mut ctx);

        let seg = ctx.composition().back().unwrap();
        assert!(seg.is_prediction());
        assert_eq!((seg.start, seg.end), (0, 0));
        assert_eq!(seg.status, SegmentStatus::Guess);
        let texts: Vec<_> = seg.menu.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["吗", "世界"]);
        assert!(seg.menu.iter().all(|c| c.kind == CandidateKind::Prediction));
        assert!(seg.menu[0].score > seg.menu[1].score);
    }

    #[test]
    fn test_component_shares_table() {
        let component = PredictEngineComponent::new(sample_table());
        let config = PredictorConfig {
            max_candidates: 0,
            max_iterations: 4,
        };
        let a = component.instance(&config).unwrap();
        let b = component.instance(&config).unwrap();
        assert_eq!(a.borrow().max_iterations(), 4);

        let ctx = Context::new();
        assert!(a.borrow_mut().predict(&ctx, "世界"));
        // instances keep separate prediction caches
        b.borrow_mut().clear();
        let mut ctx = Context::new();
        a.borrow().create_predict_segment(&mut ctx);
        assert_eq!(ctx.composition().len(), 1);
        assert_eq!(component.table().len(), 2);
    }
}
