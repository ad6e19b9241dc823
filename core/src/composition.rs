//! Composition segments for the text being composed.
//!
//! The composition is the ordered list of segments covering the raw input.
//! Each segment spans a byte range of the input, carries a menu of
//! candidates and a selection state. Segments created by the predict engine
//! are tagged [`SegmentTag::Prediction`]; they are zero-width and sit at the
//! end of the input.

use crate::candidate::Candidate;

/// Selection state of a segment. Ordered: `Void < Guess < Selected < Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SegmentStatus {
    /// Nothing translated yet
    #[default]
    Void,
    /// Has a menu, nothing picked by the user
    Guess,
    /// The user picked a candidate
    Selected,
    /// The selection is final
    Confirmed,
}

/// Classification of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentTag {
    /// Typed by the user
    #[default]
    Input,
    /// Machine-suggested continuation
    Prediction,
}

/// A contiguous span of the composition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Segment {
    /// Byte offset where the segment starts in the input
    pub start: usize,
    /// Byte offset where the segment ends in the input
    pub end: usize,
    pub status: SegmentStatus,
    pub tag: SegmentTag,
    /// Candidates offered for this span
    pub menu: Vec<Candidate>,
    /// Index into `menu` of the current selection
    pub selected_index: usize,
}

impl Segment {
    /// Create an empty, untranslated segment.
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            ..Self::default()
        }
    }

    /// Create a segment with a menu; the status becomes `Guess`.
    pub fn with_menu(start: usize, end: usize, menu: Vec<Candidate>) -> Self {
        Self {
            start,
            end,
            status: SegmentStatus::Guess,
            menu,
            ..Self::default()
        }
    }

    /// Whether the segment carries the prediction tag.
    pub fn is_prediction(&self) -> bool {
        self.tag == SegmentTag::Prediction
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Reset the content of the segment, keeping its span.
    pub fn clear(&mut self) {
        self.status = SegmentStatus::Void;
        self.tag = SegmentTag::Input;
        self.menu.clear();
        self.selected_index = 0;
    }

    /// Get the menu entry at `index`.
    pub fn candidate_at(&self, index: usize) -> Option<&Candidate> {
        self.menu.get(index)
    }

    /// Get the candidate at `selected_index`.
    pub fn selected_candidate(&self) -> Option<&Candidate> {
        self.candidate_at(self.selected_index)
    }

    fn merge(&mut self, other: Segment) {
        if other.is_prediction() {
            self.tag = SegmentTag::Prediction;
        }
        if self.menu.is_empty() {
            self.menu = other.menu;
            self.selected_index = other.selected_index;
            self.status = self.status.max(other.status);
        }
    }
}

/// Ordered segments representing the uncommitted input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Composition {
    segments: Vec<Segment>,
}

impl Composition {
    /// Create a new empty composition.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Get the number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Remove all segments.
    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// Append a segment without any span checks.
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Remove and return the last segment.
    pub fn pop(&mut self) -> Option<Segment> {
        self.segments.pop()
    }

    /// Get the last segment.
    pub fn back(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Get a mutable reference to the last segment.
    pub fn back_mut(&mut self) -> Option<&mut Segment> {
        self.segments.last_mut()
    }

    /// Get the segment at `index`.
    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// The segment just before the last one.
    pub fn second_to_last(&self) -> Option<&Segment> {
        self.segments.iter().rev().nth(1)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    /// Where the next segment added by [`Composition::add_segment`] must start.
    pub fn current_start_position(&self) -> usize {
        self.back().map_or(0, |seg| seg.start)
    }

    /// End of the last segment that has a selection, or 0.
    pub fn selected_end(&self) -> usize {
        self.segments
            .iter()
            .rev()
            .find(|seg| seg.status >= SegmentStatus::Selected)
            .map_or(0, |seg| seg.end)
    }

    /// Open an empty segment after the last one.
    ///
    /// Returns false when the composition is empty or already ends with an
    /// empty segment.
    pub fn forward(&mut self) -> bool {
        let Some(last) = self.back() else {
            return false;
        };
        if last.is_empty() {
            return false;
        }
        let end = last.end;
        self.segments.push(Segment::new(end, end));
        true
    }

    /// Add a segment at the current start position.
    ///
    /// The longer of the last segment and the new one wins; segments of the
    /// same span merge (tags are combined and an empty menu is filled).
    pub fn add_segment(&mut self, segment: Segment) -> bool {
        if segment.start != self.current_start_position() {
            return false;
        }
        match self.segments.last_mut() {
            None => self.segments.push(segment),
            Some(last) if last.end > segment.end => {}
            Some(last) if last.end < segment.end => *last = segment,
            Some(last) => last.merge(segment),
        }
        true
    }

    /// Text produced by committing the composition over `input`.
    ///
    /// Segments contribute their selected candidate, or the raw input they
    /// cover when they have none. Input past the last segment is appended.
    pub fn commit_text(&self, input: &str) -> String {
        let mut text = String::new();
        let mut end = 0;
        for seg in &self.segments {
            match seg.selected_candidate() {
                Some(cand) => text.push_str(&cand.text),
                None => text.push_str(input.get(seg.start..seg.end).unwrap_or("")),
            }
            end = seg.end;
        }
        if let Some(rest) = input.get(end..) {
            text.push_str(rest);
        }
        text
    }
}

impl<'a> IntoIterator for &'a Composition {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let comp = Composition::new();
        assert!(comp.is_empty());
        assert!(comp.back().is_none());
        assert_eq!(comp.current_start_position(), 0);
    }

    #[test]
    fn test_segment_clear_drops_tag_and_menu() {
        let mut seg = Segment::with_menu(3, 3, vec![Candidate::prediction("吗", 1.0)]);
        seg.tag = SegmentTag::Prediction;
        seg.selected_index = 0;
        assert!(seg.is_prediction());
        assert_eq!(seg.status, SegmentStatus::Guess);

        seg.clear();
        assert!(!seg.is_prediction());
        assert_eq!(seg.status, SegmentStatus::Void);
        assert!(seg.selected_candidate().is_none());
        assert_eq!((seg.start, seg.end), (3, 3));
    }

    #[test]
    fn test_forward() {
        let mut comp = Composition::new();
        assert!(!comp.forward());

        comp.push(Segment::with_menu(0, 2, vec![Candidate::phrase("ni")]));
        assert!(comp.forward());
        assert_eq!(comp.len(), 2);
        assert_eq!(comp.back(), Some(&Segment::new(2, 2)));

        // already ends with an empty segment
        assert!(!comp.forward());
        assert_eq!(comp.len(), 2);
    }

    #[test]
    fn test_add_segment_merges_into_trailing_empty_segment() {
        let mut comp = Composition::new();
        comp.push(Segment::with_menu(0, 2, vec![Candidate::phrase("ni")]));
        comp.forward();

        let mut predicted = Segment::with_menu(2, 2, vec![Candidate::prediction("好", 1.0)]);
        predicted.tag = SegmentTag::Prediction;
        assert!(comp.add_segment(predicted));

        assert_eq!(comp.len(), 2);
        let back = comp.back().unwrap();
        assert!(back.is_prediction());
        assert_eq!(back.status, SegmentStatus::Guess);
        assert_eq!(back.selected_candidate().unwrap().text, "好");
    }

    #[test]
    fn test_add_segment_rejects_wrong_start() {
        let mut comp = Composition::new();
        comp.push(Segment::new(0, 2));
        assert!(!comp.add_segment(Segment::new(1, 2)));
        assert!(comp.add_segment(Segment::new(0, 4)));
        assert_eq!(comp.back().unwrap().end, 4);
        // shorter segment loses
        assert!(comp.add_segment(Segment::new(0, 1)));
        assert_eq!(comp.back().unwrap().end, 4);
    }

    #[test]
    fn test_second_to_last_and_selected_end() {
        let mut comp = Composition::new();
        comp.push(Segment::with_menu(0, 2, vec![Candidate::phrase("ni")]));
        assert!(comp.second_to_last().is_none());
        assert_eq!(comp.selected_end(), 0);

        comp.segments[0].status = SegmentStatus::Confirmed;
        comp.forward();
        assert_eq!(comp.second_to_last().unwrap().end, 2);
        assert_eq!(comp.selected_end(), 2);
    }

    #[test]
    fn test_commit_text() {
        let mut comp = Composition::new();
        comp.push(Segment::with_menu(0, 2, vec![Candidate::phrase("你")]));
        comp.push(Segment::new(2, 5));
        assert_eq!(comp.commit_text("nihao"), "你hao");

        comp.pop();
        assert_eq!(comp.commit_text("nihao"), "你hao");

        comp.clear();
        assert_eq!(comp.commit_text("abc"), "abc");
    }
}
