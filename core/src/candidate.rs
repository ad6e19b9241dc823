//! Candidate types carried by composition segments.
//!
//! This module provides:
//! - `CandidateKind`: where a candidate came from (phrase, punctuation, prediction, ...)
//! - `Candidate`: a single text candidate with its kind and score

use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a candidate or a commit record.
///
/// The serialized names match the type strings used in commit logs
/// (`"punct"`, `"raw"`, `"thru"`, `"prediction"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    /// Ordinary converted text
    Phrase,
    /// Punctuation
    Punct,
    /// Raw, unconverted input
    Raw,
    /// A key passed through to the application
    Thru,
    /// Text proposed by the predict engine
    Prediction,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::Phrase => "phrase",
            CandidateKind::Punct => "punct",
            CandidateKind::Raw => "raw",
            CandidateKind::Thru => "thru",
            CandidateKind::Prediction => "prediction",
        }
    }

    /// Kinds after which no continuation is predicted.
    pub fn breaks_prediction(&self) -> bool {
        matches!(
            self,
            CandidateKind::Punct | CandidateKind::Raw | CandidateKind::Thru
        )
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single text candidate with an associated score.
///
/// Scores are on a relative scale; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub text: String,
    pub score: f32,
}

impl Candidate {
    pub fn new<T: Into<String>>(kind: CandidateKind, text: T, score: f32) -> Self {
        Candidate {
            kind,
            text: text.into(),
            score,
        }
    }

    pub fn phrase<T: Into<String>>(text: T) -> Self {
        Self::new(CandidateKind::Phrase, text, 0.0)
    }

    pub fn punct<T: Into<String>>(text: T) -> Self {
        Self::new(CandidateKind::Punct, text, 0.0)
    }

    pub fn prediction<T: Into<String>>(text: T, score: f32) -> Self {
        Self::new(CandidateKind::Prediction, text, score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(CandidateKind::Punct.to_string(), "punct");
        assert_eq!(CandidateKind::Prediction.as_str(), "prediction");
        let json = serde_json::to_string(&CandidateKind::Thru).unwrap();
        assert_eq!(json, "\"thru\"");
        let kind: CandidateKind = serde_json::from_str("\"raw\"").unwrap();
        assert_eq!(kind, CandidateKind::Raw);
    }

    #[test]
    fn test_breaks_prediction() {
        assert!(CandidateKind::Punct.breaks_prediction());
        assert!(CandidateKind::Raw.breaks_prediction());
        assert!(CandidateKind::Thru.breaks_prediction());
        assert!(!CandidateKind::Phrase.breaks_prediction());
        assert!(!CandidateKind::Prediction.breaks_prediction());
    }

    #[test]
    fn test_constructors() {
        let c = Candidate::prediction("世界", 0.5);
        assert_eq!(c.kind, CandidateKind::Prediction);
        assert_eq!(c.text, "世界");
        assert_eq!(Candidate::punct("，").kind, CandidateKind::Punct);
    }
}
