//! Input context shared by every component of a session.
//!
//! The `Context` owns the raw input, the composition, the commit history and
//! the named options. Components observe it through three notification
//! channels:
//!
//! - **select**: a candidate was selected or confirmed
//! - **update**: the composition changed (including being cleared)
//! - **option update**: a named option changed value
//!
//! Handlers receive `&mut Context` and may mutate it, including firing
//! nested notifications. Everything runs synchronously on the calling thread.

use crate::candidate::Candidate;
use crate::commit::CommitHistory;
use crate::composition::{Composition, SegmentStatus};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Well-known option names.
pub mod options {
    /// Enables the predictor.
    pub const PREDICTION: &str = "prediction";
    /// Confirmed selections are committed immediately (express editing).
    pub const AUTO_COMMIT: &str = "_auto_commit";
    /// Direct ASCII input; switching it invalidates predictions.
    pub const ASCII_MODE: &str = "ascii_mode";
}

type Handler<A> = Rc<dyn Fn(&mut Context, &A)>;
type Slots<A> = RefCell<Vec<(u64, Handler<A>)>>;

/// A list of handlers for one notification channel.
pub struct Notifier<A: ?Sized> {
    slots: Rc<Slots<A>>,
    next_id: Cell<u64>,
}

impl<A: ?Sized + 'static> Notifier<A> {
    fn new() -> Self {
        Self {
            slots: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(0),
        }
    }

    /// Register a handler. It stays registered until the returned
    /// [`Connection`] is dropped or disconnected.
    #[must_use = "dropping the connection unregisters the handler"]
    pub fn connect<F>(&self, handler: F) -> Connection
    where
        F: Fn(&mut Context, &A) + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.slots.borrow_mut().push((id, Rc::new(handler)));

        let slots: Weak<Slots<A>> = Rc::downgrade(&self.slots);
        Connection {
            release: Some(Box::new(move || {
                if let Some(slots) = slots.upgrade() {
                    slots.borrow_mut().retain(|(slot_id, _)| *slot_id != id);
                }
            })),
        }
    }

    /// Get the number of registered handlers.
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Handlers connected or disconnected during dispatch take effect on the
    // next notification.
    fn snapshot(&self) -> Vec<Handler<A>> {
        self.slots
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect()
    }
}

impl<A: ?Sized> fmt::Debug for Notifier<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("handlers", &self.slots.borrow().len())
            .finish()
    }
}

/// Handle to a registered handler; unregisters it when dropped.
pub struct Connection {
    release: Option<Box<dyn FnOnce()>>,
}

impl Connection {
    /// Unregister the handler. Calling it twice is harmless.
    pub fn disconnect(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// False once the connection has been disconnected.
    pub fn is_connected(&self) -> bool {
        self.release.is_some()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Session-wide input state and its notification channels.
#[derive(Debug)]
pub struct Context {
    input: String,
    composition: Composition,
    commit_history: CommitHistory,
    /// Text committed but not yet taken by the platform
    commit_text: String,
    options: HashMap<String, bool>,
    select_notifier: Notifier<()>,
    update_notifier: Notifier<()>,
    option_update_notifier: Notifier<str>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a context with no input and no options set.
    pub fn new() -> Self {
        Self {
            input: String::new(),
            composition: Composition::new(),
            commit_history: CommitHistory::new(),
            commit_text: String::new(),
            options: HashMap::new(),
            select_notifier: Notifier::new(),
            update_notifier: Notifier::new(),
            option_update_notifier: Notifier::new(),
        }
    }

    // ========== Notification channels ==========

    /// Get the channel fired after a candidate is selected.
    pub fn select_notifier(&self) -> &Notifier<()> {
        &self.select_notifier
    }

    /// Get the channel fired after the composition changes.
    pub fn update_notifier(&self) -> &Notifier<()> {
        &self.update_notifier
    }

    /// Get the channel fired with the name of a changed option.
    pub fn option_update_notifier(&self) -> &Notifier<str> {
        &self.option_update_notifier
    }

    /// Fire the update notification synchronously.
    pub fn notify_update(&mut self) {
        for handler in self.update_notifier.snapshot() {
            handler(self, &());
        }
    }

    fn notify_select(&mut self) {
        for handler in self.select_notifier.snapshot() {
            handler(self, &());
        }
    }

    fn notify_option_update(&mut self, option: &str) {
        for handler in self.option_update_notifier.snapshot() {
            handler(self, option);
        }
    }

    // ========== Options ==========

    /// Unset options read as false.
    pub fn get_option(&self, name: &str) -> bool {
        self.options.get(name).copied().unwrap_or(false)
    }

    /// Set an option, notifying observers when the value changes.
    pub fn set_option(&mut self, name: &str, value: bool) {
        if self.get_option(name) == value && self.options.contains_key(name) {
            return;
        }
        self.options.insert(name.to_string(), value);
        self.notify_option_update(name);
    }

    // ========== Input and composition ==========

    /// Get the input buffer.
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn push_input(&mut self, text: &str) {
        self.input.push_str(text);
    }

    pub fn pop_input(&mut self) -> Option<char> {
        self.input.pop()
    }

    /// Get the composition.
    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Get a mutable reference to the composition.
    pub fn composition_mut(&mut self) -> &mut Composition {
        &mut self.composition
    }

    /// Get the commit history.
    pub fn commit_history(&self) -> &CommitHistory {
        &self.commit_history
    }

    /// Get a mutable reference to the commit history.
    pub fn commit_history_mut(&mut self) -> &mut CommitHistory {
        &mut self.commit_history
    }

    pub fn is_composing(&self) -> bool {
        !self.input.is_empty() || !self.composition.is_empty()
    }

    /// Whether the last segment offers candidates.
    pub fn has_menu(&self) -> bool {
        self.composition
            .back()
            .is_some_and(|seg| !seg.menu.is_empty())
    }

    /// Selected candidate of the last segment.
    pub fn selected_candidate(&self) -> Option<&Candidate> {
        self.composition.back()?.selected_candidate()
    }

    /// Select the candidate at `index` in the last segment's menu.
    ///
    /// Returns false, without notifying, when there is no such candidate.
    pub fn select(&mut self, index: usize) -> bool {
        let Some(seg) = self.composition.back_mut() else {
            return false;
        };
        if seg.candidate_at(index).is_none() {
            return false;
        }
        seg.selected_index = index;
        seg.status = SegmentStatus::Selected;
        self.notify_select();
        true
    }

    /// Select position `index` on the menu page holding the current selection.
    pub fn select_on_page(&mut self, page_size: usize, index: usize) -> bool {
        if index >= page_size {
            return false;
        }
        let selected = self
            .composition
            .back()
            .map_or(0, |seg| seg.selected_index);
        self.select(selected / page_size * page_size + index)
    }

    /// Select whatever the last segment currently highlights.
    pub fn confirm_current_selection(&mut self) -> bool {
        let Some(seg) = self.composition.back_mut() else {
            return false;
        };
        if seg.selected_candidate().is_none() {
            return false;
        }
        seg.status = SegmentStatus::Selected;
        self.notify_select();
        true
    }

    /// Drop trailing segments that were never selected.
    pub fn clear_non_confirmed_composition(&mut self) -> bool {
        let mut reverted = false;
        while self
            .composition
            .back()
            .is_some_and(|seg| seg.status < SegmentStatus::Selected)
        {
            self.composition.pop();
            reverted = true;
        }
        if reverted {
            self.composition.forward();
        }
        reverted
    }

    /// Commit the composition: log it, hand its text to the platform and
    /// start over. Does nothing unless composing.
    pub fn commit(&mut self) -> bool {
        if !self.is_composing() {
            return false;
        }
        let text = self.composition.commit_text(&self.input);
        self.commit_history
            .push_composition(&self.composition, &self.input);
        tracing::debug!(%text, "commit");
        self.commit_text.push_str(&text);
        self.clear();
        true
    }

    /// Clear input and composition, then notify update observers.
    pub fn clear(&mut self) {
        self.input.clear();
        self.composition.clear();
        self.notify_update();
    }

    // ========== Platform output ==========

    pub fn commit_text(&self) -> &str {
        &self.commit_text
    }

    /// Take the committed text, leaving it empty.
    pub fn take_commit(&mut self) -> String {
        std::mem::take(&mut self.commit_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateKind;
    use crate::composition::Segment;

    fn counter(ctx: &Context) -> (Rc<Cell<usize>>, Connection) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let conn = ctx
            .update_notifier()
            .connect(move |_, _| h.set(h.get() + 1));
        (hits, conn)
    }

    #[test]
    fn test_connection_drop_unsubscribes() {
        let mut ctx = Context::new();
        let (hits, conn) = counter(&ctx);
        assert_eq!(ctx.update_notifier().len(), 1);

        ctx.notify_update();
        assert_eq!(hits.get(), 1);

        drop(conn);
        assert!(ctx.update_notifier().is_empty());
        ctx.notify_update();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_explicit_disconnect() {
        let mut ctx = Context::new();
        let (hits, mut conn) = counter(&ctx);
        assert!(conn.is_connected());
        conn.disconnect();
        assert!(!conn.is_connected());
        conn.disconnect();
        assert!(ctx.update_notifier().is_empty());
        ctx.clear();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_connection_outliving_context() {
        let ctx = Context::new();
        let (_hits, conn) = counter(&ctx);
        drop(ctx);
        drop(conn);
    }

    #[test]
    fn test_handlers_can_renotify() {
        let mut ctx = Context::new();
        let depth = Rc::new(Cell::new(0));
        let d = Rc::clone(&depth);
        let _conn = ctx.update_notifier().connect(move |ctx, _| {
            d.set(d.get() + 1);
            if d.get() < 3 {
                ctx.notify_update();
            }
        });
        ctx.notify_update();
        assert_eq!(depth.get(), 3);
    }

    #[test]
    fn test_option_update_only_on_change() {
        let mut ctx = Context::new();
        let seen = Rc::new(RefCell::new(Vec::<String>::new()));
        let s = Rc::clone(&seen);
        let _conn = ctx
            .option_update_notifier()
            .connect(move |_, name| s.borrow_mut().push(name.to_string()));

        assert!(!ctx.get_option(options::ASCII_MODE));
        ctx.set_option(options::ASCII_MODE, true);
        ctx.set_option(options::ASCII_MODE, true);
        ctx.set_option(options::ASCII_MODE, false);
        assert_eq!(*seen.borrow(), vec!["ascii_mode", "ascii_mode"]);
    }

    #[test]
    fn test_select() {
        let mut ctx = Context::new();
        let selects = Rc::new(Cell::new(0));
        let s = Rc::clone(&selects);
        let _conn = ctx
            .select_notifier()
            .connect(move |_, _| s.set(s.get() + 1));

        assert!(!ctx.select(0));
        ctx.push_input("ni");
        ctx.composition_mut().push(Segment::with_menu(
            0,
            2,
            vec![Candidate::phrase("你"), Candidate::phrase("泥")],
        ));
        assert!(!ctx.select(2));
        assert_eq!(selects.get(), 0);

        assert!(ctx.select(1));
        assert_eq!(selects.get(), 1);
        assert_eq!(ctx.selected_candidate().unwrap().text, "泥");
        assert_eq!(
            ctx.composition().back().unwrap().status,
            SegmentStatus::Selected
        );
    }

    #[test]
    fn test_select_on_page() {
        let mut ctx = Context::new();
        let menu = (0..7).map(|i| Candidate::phrase(i.to_string())).collect();
        ctx.composition_mut().push(Segment::with_menu(0, 0, menu));
        ctx.composition_mut().back_mut().unwrap().selected_index = 4;

        assert!(ctx.select_on_page(3, 1));
        assert_eq!(ctx.selected_candidate().unwrap().text, "4");
        assert!(!ctx.select_on_page(3, 3));
        assert!(ctx.select_on_page(3, 2));
        assert_eq!(ctx.selected_candidate().unwrap().text, "5");
        // page starting at 6 has one candidate
        ctx.composition_mut().back_mut().unwrap().selected_index = 6;
        assert!(!ctx.select_on_page(3, 1));
    }

    #[test]
    fn test_commit_records_history_and_clears() {
        let mut ctx = Context::new();
        let (hits, _conn) = counter(&ctx);
        assert!(!ctx.commit());

        ctx.push_input("nihao");
        ctx.composition_mut()
            .push(Segment::with_menu(0, 5, vec![Candidate::phrase("你好")]));
        assert!(ctx.commit());

        assert_eq!(ctx.take_commit(), "你好");
        assert_eq!(ctx.commit_text(), "");
        assert!(!ctx.is_composing());
        assert_eq!(hits.get(), 1);
        let last = ctx.commit_history().back().unwrap();
        assert_eq!(last.kind, CandidateKind::Phrase);
        assert_eq!(last.text, "你好");
    }

    #[test]
    fn test_clear_non_confirmed_composition() {
        let mut ctx = Context::new();
        ctx.push_input("nihao");
        let mut first = Segment::with_menu(0, 2, vec![Candidate::phrase("你")]);
        first.status = SegmentStatus::Confirmed;
        ctx.composition_mut().push(first);
        ctx.composition_mut()
            .push(Segment::with_menu(2, 5, vec![Candidate::phrase("好")]));

        assert!(ctx.clear_non_confirmed_composition());
        assert_eq!(ctx.composition().len(), 2);
        assert_eq!(ctx.composition().back(), Some(&Segment::new(2, 2)));
        assert!(!ctx.has_menu());
    }
}
