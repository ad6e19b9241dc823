//! Commit history: a short log of what the session sent to the application.

use crate::candidate::CandidateKind;
use crate::composition::{Composition, SegmentStatus};
use crate::key_event::{keysym, KeyEvent};
use std::collections::VecDeque;

/// One committed piece of text and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Origin of the text
    pub kind: CandidateKind,
    /// Committed text
    pub text: String,
}

impl CommitRecord {
    /// Create a record of `text` committed from a `kind` source.
    pub fn new<T: Into<String>>(kind: CandidateKind, text: T) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Bounded, append-only log of commit records; oldest records fall off.
#[derive(Debug, Clone, Default)]
pub struct CommitHistory {
    records: VecDeque<CommitRecord>,
}

impl CommitHistory {
    /// Records kept before the oldest is dropped.
    pub const MAX_RECORDS: usize = 20;

    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Forget all records.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Get the most recent record.
    pub fn back(&self) -> Option<&CommitRecord> {
        self.records.back()
    }

    /// Iterate records from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &CommitRecord> {
        self.records.iter()
    }

    /// Append a record. Empty text is not recorded.
    pub fn push(&mut self, record: CommitRecord) {
        if record.text.is_empty() {
            return;
        }
        self.records.push_back(record);
        if self.records.len() > Self::MAX_RECORDS {
            self.records.pop_front();
        }
    }

    /// Record the commit of `composition` over `input`.
    ///
    /// Adjacent selections of the same kind are joined into one record
    /// until a confirmed segment closes it. Spans with no candidate and
    /// input beyond the last segment are logged as raw text.
    pub fn push_composition(&mut self, composition: &Composition, input: &str) {
        let mut open = false;
        let mut end = 0;
        for seg in composition {
            match seg.selected_candidate() {
                Some(cand) => {
                    let join = open && self.back().is_some_and(|last| last.kind == cand.kind);
                    if join {
                        if let Some(last) = self.records.back_mut() {
                            last.text.push_str(&cand.text);
                        }
                    } else {
                        self.push(CommitRecord::new(cand.kind, cand.text.clone()));
                        open = !cand.text.is_empty();
                    }
                    if seg.status >= SegmentStatus::Confirmed {
                        open = false;
                    }
                }
                None => {
                    self.push(CommitRecord::new(
                        CandidateKind::Raw,
                        input.get(seg.start..seg.end).unwrap_or(""),
                    ));
                    open = false;
                }
            }
            end = seg.end;
        }
        if let Some(rest) = input.get(end..) {
            self.push(CommitRecord::new(CandidateKind::Raw, rest));
        }
    }

    /// Record a key that went straight to the application.
    pub fn push_key_event(&mut self, key: &KeyEvent) {
        if key.has_modifiers() {
            return;
        }
        match key.keycode() {
            keysym::BACKSPACE | keysym::RETURN => self.clear(),
            _ => {
                if let Some(ch) = key.ascii() {
                    self.push(CommitRecord::new(CandidateKind::Thru, ch.to_string()));
                }
            }
        }
    }
}
