//! Predictive continuation driven by key events and context notifications.
//!
//! The `Predictor` sits in front of normal key processing. While a predicted
//! segment is showing it decides whether a keystroke accepts, extends or
//! dismisses the prediction. It also listens to the context:
//!
//! - **select**: a confirmed selection at the end of the input triggers the
//!   next prediction (fluid editing, auto-commit off)
//! - **update**: an emptied composition after a commit triggers a prediction
//!   from the last committed text (express editing, auto-commit on)
//! - **option update**: toggling `ascii_mode` drops an in-flight prediction
//!
//! Accepting a prediction predicts again, so the loop is bounded by the
//! engine's `max_iterations`. The predictor announces its own segment with a
//! nested update notification; `self_updating` turns that re-entry into a
//! no-op.

use crate::candidate::CandidateKind;
use crate::composition::{Segment, SegmentStatus};
use crate::context::{options, Connection, Context};
use crate::key_event::{keysym, KeyEvent};
use crate::predict_engine::{PredictEngineFactory, SharedPredictEngine};
use crate::Config;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, debug_span};

/// Classification of the last key event the predictor saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastAction {
    /// A key arrived on an empty composition
    Initiate,
    /// Backspace or Escape
    Delete,
    /// A candidate was selected or the composition committed
    Select,
    #[default]
    Unspecified,
}

/// Verdict on a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// The key was consumed; no further processing
    Accepted,
    /// Normal processing continues
    Noop,
}

/// Per-session predictor state shared by the predictor and its handlers.
#[derive(Debug, Default)]
pub struct PredictorState {
    last_action: Cell<LastAction>,
    iteration_count: Cell<usize>,
    self_updating: Cell<bool>,
}

impl PredictorState {
    /// Get the classification of the last key event.
    pub fn last_action(&self) -> LastAction {
        self.last_action.get()
    }

    /// Accepted predictions since the last reset.
    pub fn iteration_count(&self) -> usize {
        self.iteration_count.get()
    }

    /// True only while the predictor's own update notification is running.
    pub fn is_self_updating(&self) -> bool {
        self.self_updating.get()
    }

    fn set_last_action(&self, action: LastAction) {
        self.last_action.set(action);
    }

    fn advance(&self) -> usize {
        let count = self.iteration_count.get() + 1;
        self.iteration_count.set(count);
        count
    }

    fn retreat(&self) {
        self.iteration_count
            .set(self.iteration_count.get().saturating_sub(1));
    }

    fn reset_iterations(&self) {
        self.iteration_count.set(0);
    }
}

/// Raises `self_updating` for its lifetime.
struct SelfUpdate<'a>(&'a Cell<bool>);

impl<'a> SelfUpdate<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for SelfUpdate<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

struct Core {
    engine: Option<SharedPredictEngine>,
    state: PredictorState,
    selector_keys: String,
    initials: String,
    page_size: usize,
}

impl Core {
    fn process_key_event(&self, ctx: &mut Context, key: &KeyEvent) -> ProcessResult {
        let Some(engine) = self.engine.as_ref() else {
            return ProcessResult::Noop;
        };
        if !ctx.get_option(options::PREDICTION) {
            return ProcessResult::Noop;
        }
        let _span = debug_span!("predictor_key", %key).entered();
        let state = &self.state;

        let Some(back_is_prediction) = ctx.composition().back().map(Segment::is_prediction) else {
            state.set_last_action(LastAction::Initiate);
            if state.iteration_count() > 0 {
                self.clear_prediction(engine);
            }
            return ProcessResult::Noop;
        };

        match key.keycode() {
            keysym::BACKSPACE => {
                state.set_last_action(LastAction::Delete);
                if !back_is_prediction {
                    return ProcessResult::Noop;
                }
                engine.borrow_mut().clear();
                ctx.composition_mut().pop();
                state.retreat();
                debug!(iterations = state.iteration_count(), "prediction withdrawn");
                return ProcessResult::Accepted;
            }
            keysym::ESCAPE => {
                state.set_last_action(LastAction::Delete);
                if !back_is_prediction {
                    return ProcessResult::Noop;
                }
                self.clear_prediction(engine);
                if ctx.has_menu() && !ctx.input().is_empty() {
                    if let Some(seg) = ctx.composition_mut().back_mut() {
                        seg.clear();
                    }
                } else {
                    ctx.clear();
                }
                debug!("prediction dismissed");
                return ProcessResult::Accepted;
            }
            _ => {}
        }

        if key.is_return() && !key.has_modifiers() && !ctx.get_option(options::AUTO_COMMIT) {
            state.set_last_action(LastAction::Select);
            if back_is_prediction {
                if let Some(seg) = ctx.composition_mut().back_mut() {
                    seg.clear();
                }
            }
            self.clear_prediction(engine);
            ctx.commit();
            return ProcessResult::Accepted;
        }

        if let Some(index) = self.selector_index(key) {
            return self.select_prediction(ctx, back_is_prediction, index);
        }

        if self.selector_keys.is_empty() && !key.has_modifiers() {
            if let Some(index) = key.digit_page_index() {
                return self.select_prediction(ctx, back_is_prediction, index);
            }
        }

        state.set_last_action(LastAction::Unspecified);
        let starts_input = key
            .graphic_ascii()
            .is_some_and(|ch| self.initials.contains(ch));
        if back_is_prediction && starts_input {
            // typing past the prediction
            if let Some(seg) = ctx.composition_mut().back_mut() {
                seg.clear();
            }
            if ctx
                .composition()
                .second_to_last()
                .is_some_and(Segment::is_prediction)
            {
                debug!("committing accepted predictions");
                self.clear_prediction(engine);
                ctx.commit();
            }
        }
        ProcessResult::Noop
    }

    fn selector_index(&self, key: &KeyEvent) -> Option<usize> {
        if self.selector_keys.is_empty() || key.has_modifiers() {
            return None;
        }
        let ch = key.ascii()?;
        self.selector_keys.find(ch)
    }

    fn select_prediction(
        &self,
        ctx: &mut Context,
        back_is_prediction: bool,
        index: usize,
    ) -> ProcessResult {
        if !back_is_prediction {
            return ProcessResult::Noop;
        }
        if ctx.select_on_page(self.page_size, index) {
            self.state.set_last_action(LastAction::Select);
            ProcessResult::Accepted
        } else {
            ProcessResult::Noop
        }
    }

    fn on_select(&self, ctx: &mut Context) {
        self.state.set_last_action(LastAction::Select);
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        if !ctx.get_option(options::PREDICTION) || ctx.get_option(options::AUTO_COMMIT) {
            return;
        }
        let end = ctx.input().len();
        let Some(last) = ctx.composition().back() else {
            return;
        };
        if last.start != end || last.end != end {
            return;
        }

        if last.status == SegmentStatus::Confirmed && last.is_prediction() {
            let Some(text) = ctx.selected_candidate().map(|cand| cand.text.clone()) else {
                return;
            };
            let count = self.state.advance();
            ctx.composition_mut().push(Segment::new(end, end));
            if self.cap_reached(engine, count) {
                debug!(count, "prediction limit reached");
                self.clear_prediction(engine);
                return;
            }
            self.predict_and_update(engine, ctx, &text);
            return;
        }

        let Some(previous) = ctx
            .composition()
            .second_to_last()
            .filter(|seg| seg.status == SegmentStatus::Confirmed)
        else {
            return;
        };
        let query = previous
            .selected_candidate()
            .filter(|cand| cand.kind != CandidateKind::Punct)
            .map(|cand| cand.text.clone());
        match query {
            Some(query) => self.predict_and_update(engine, ctx, &query),
            // no prediction after punctuation
            None => self.clear_prediction(engine),
        }
    }

    fn on_option_update(&self, ctx: &mut Context, option: &str) {
        if option != options::ASCII_MODE || !ctx.get_option(options::PREDICTION) {
            return;
        }
        self.state.reset_iterations();
        if ctx
            .composition()
            .back()
            .is_some_and(Segment::is_prediction)
        {
            if ctx.get_option(options::AUTO_COMMIT) {
                ctx.composition_mut().clear();
            } else {
                ctx.composition_mut().pop();
            }
        }
    }

    fn on_context_update(&self, ctx: &mut Context) {
        if self.state.is_self_updating() {
            return;
        }
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        if !ctx.get_option(options::PREDICTION)
            || !ctx.get_option(options::AUTO_COMMIT)
            || !ctx.composition().is_empty()
            || matches!(
                self.state.last_action(),
                LastAction::Delete | LastAction::Initiate
            )
        {
            return;
        }
        let Some(last_commit) = ctx.commit_history().back().cloned() else {
            return;
        };
        debug!(kind = %last_commit.kind, text = %last_commit.text, "predicting after commit");

        if last_commit.kind.breaks_prediction() {
            self.clear_prediction(engine);
            return;
        }
        if last_commit.kind == CandidateKind::Prediction {
            let count = self.state.advance();
            if self.cap_reached(engine, count) {
                debug!(count, "prediction limit reached");
                self.clear_prediction(engine);
                return;
            }
        }
        self.predict_and_update(engine, ctx, &last_commit.text);
    }

    fn predict_and_update(&self, engine: &SharedPredictEngine, ctx: &mut Context, query: &str) {
        let predicted = engine.borrow_mut().predict(ctx, query);
        if !predicted {
            return;
        }
        engine.borrow().create_predict_segment(ctx);
        let _updating = SelfUpdate::enter(&self.state.self_updating);
        ctx.notify_update();
    }

    fn cap_reached(&self, engine: &SharedPredictEngine, count: usize) -> bool {
        let max = engine.borrow().max_iterations();
        max > 0 && count >= max
    }

    fn clear_prediction(&self, engine: &SharedPredictEngine) {
        engine.borrow_mut().clear();
        self.state.reset_iterations();
    }
}

/// Predictive continuation for one input session.
///
/// Construction subscribes to the context's select, update and option
/// channels; dropping the predictor unsubscribes all three.
pub struct Predictor {
    core: Rc<Core>,
    connections: [Connection; 3],
}

impl Predictor {
    /// Create a predictor observing `ctx`.
    ///
    /// Selector keys, initials and page size are read from `config` once.
    /// Without an engine every entry point is a no-op.
    pub fn new(ctx: &Context, config: &Config, engine: Option<SharedPredictEngine>) -> Self {
        let core = Rc::new(Core {
            engine,
            state: PredictorState::default(),
            selector_keys: config.select_keys.clone(),
            initials: config.initials().to_string(),
            page_size: config.page_size.max(1),
        });

        let on_select = Rc::clone(&core);
        let on_update = Rc::clone(&core);
        let on_option = Rc::clone(&core);
        let connections = [
            ctx.select_notifier()
                .connect(move |ctx, _| on_select.on_select(ctx)),
            ctx.update_notifier()
                .connect(move |ctx, _| on_update.on_context_update(ctx)),
            ctx.option_update_notifier()
                .connect(move |ctx, option| on_option.on_option_update(ctx, option)),
        ];

        Self { core, connections }
    }

    /// Intercept a key event before normal processing.
    pub fn process_key_event(&self, ctx: &mut Context, key: &KeyEvent) -> ProcessResult {
        self.core.process_key_event(ctx, key)
    }

    /// Reaction to a selection; normally invoked through the select channel.
    pub fn on_select(&self, ctx: &mut Context) {
        self.core.on_select(ctx);
    }

    /// Reaction to a composition change; normally invoked through the update channel.
    pub fn on_context_update(&self, ctx: &mut Context) {
        self.core.on_context_update(ctx);
    }

    /// Reaction to an option change; normally invoked through the option channel.
    pub fn on_option_update(&self, ctx: &mut Context, option: &str) {
        self.core.on_option_update(ctx, option);
    }

    /// Get the shared predictor state.
    pub fn state(&self) -> &PredictorState {
        &self.core.state
    }

    pub fn last_action(&self) -> LastAction {
        self.core.state.last_action()
    }

    pub fn iteration_count(&self) -> usize {
        self.core.state.iteration_count()
    }

    /// Get the engine, if any.
    pub fn engine(&self) -> Option<&SharedPredictEngine> {
        self.core.engine.as_ref()
    }
}

impl Drop for Predictor {
    fn drop(&mut self) {
        for connection in &mut self.connections {
            connection.disconnect();
        }
    }
}

impl fmt::Debug for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predictor")
            .field("state", &self.core.state)
            .field("selector_keys", &self.core.selector_keys)
            .field("page_size", &self.core.page_size)
            .field("has_engine", &self.core.engine.is_some())
            .finish()
    }
}

/// Builds a predictor per session, each with its own engine instance.
pub struct PredictorComponent {
    engine_factory: Option<Rc<dyn PredictEngineFactory>>,
}

impl PredictorComponent {
    /// Create a component that asks `engine_factory` for one engine per predictor.
    pub fn new<F: PredictEngineFactory + 'static>(engine_factory: F) -> Self {
        Self {
            engine_factory: Some(Rc::new(engine_factory)),
        }
    }

    /// A component whose predictors have no engine and never predict.
    pub fn without_engine() -> Self {
        Self {
            engine_factory: None,
        }
    }

    pub fn create(&self, ctx: &Context, config: &Config) -> Predictor {
        let engine = self
            .engine_factory
            .as_ref()
            .and_then(|factory| factory.instance(&config.predictor));
        Predictor::new(ctx, config, engine)
    }
}

impl fmt::Debug for PredictorComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictorComponent")
            .field("has_engine_factory", &self.engine_factory.is_some())
            .finish()
    }
}
