//! Input session: a context, its predictor and a minimal editor.
//!
//! `Session` is the host-side glue that feeds key events through the
//! predictor and, when the predictor declines, through a small editor that
//! echoes typed letters as a phrase candidate. It also owns the selection
//! handler that confirms selected segments, which must run before the
//! predictor's own reaction to the same notification.

use crate::candidate::Candidate;
use crate::composition::{Segment, SegmentStatus};
use crate::context::{options, Connection, Context};
use crate::key_event::{keysym, KeyEvent, KeyParseError, Modifiers};
use crate::predictor::{ProcessResult, Predictor, PredictorComponent};
use crate::Config;
use tracing::{debug, debug_span};

/// One input session.
///
/// Fields drop in declaration order: the predictor and the selection handler
/// unsubscribe before the context goes away.
pub struct Session {
    predictor: Predictor,
    _confirm: Connection,
    context: Context,
    config: Config,
}

impl Session {
    /// Create a session; the predictor gets its engine from `component`.
    pub fn new(config: Config, component: &PredictorComponent) -> Self {
        let mut context = Context::new();
        let confirm = context
            .select_notifier()
            .connect(|ctx, _| confirm_selection(ctx));
        context.set_option(options::PREDICTION, config.prediction);
        context.set_option(options::AUTO_COMMIT, config.auto_commit);
        let predictor = component.create(&context, &config);
        Self {
            predictor,
            _confirm: confirm,
            context,
            config,
        }
    }

    /// Process one key event. Returns false when the key should go to the
    /// application unchanged.
    pub fn process_key(&mut self, key: &KeyEvent) -> bool {
        let _span = debug_span!("process_key", %key).entered();
        if key.modifiers().contains(Modifiers::RELEASE) {
            return false;
        }
        if self.predictor.process_key_event(&mut self.context, key) == ProcessResult::Accepted {
            debug!("taken by predictor");
            return true;
        }
        let accepted = self.edit(key);
        if !accepted {
            self.context.commit_history_mut().push_key_event(key);
        }
        accepted
    }

    /// Process whitespace-separated key descriptions such as `"n i space"`.
    pub fn process_keys(&mut self, keys: &str) -> Result<(), KeyParseError> {
        for desc in keys.split_whitespace() {
            let key: KeyEvent = desc.parse()?;
            self.process_key(&key);
        }
        Ok(())
    }

    /// Text shown inline; predictions count once selected.
    pub fn preedit(&self) -> String {
        let input = self.context.input();
        self.context
            .composition()
            .iter()
            .filter(|seg| !(seg.is_prediction() && seg.status < SegmentStatus::Selected))
            .map(|seg| match seg.selected_candidate() {
                Some(cand) => cand.text.as_str(),
                None => input.get(seg.start..seg.end).unwrap_or(""),
            })
            .collect()
    }

    /// Candidates of the last segment.
    pub fn menu(&self) -> &[Candidate] {
        self.context
            .composition()
            .back()
            .map(|seg| seg.menu.as_slice())
            .unwrap_or(&[])
    }

    /// Take text committed since the last call.
    pub fn take_commit(&mut self) -> String {
        self.context.take_commit()
    }

    /// Set a context option, notifying the predictor when it changes.
    pub fn set_option(&mut self, name: &str, value: bool) {
        self.context.set_option(name, value);
    }

    /// Get a context option; unset options read as false.
    pub fn get_option(&self, name: &str) -> bool {
        self.context.get_option(name)
    }

    /// Get the session context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Get the predictor attached to this session.
    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Get the configuration the session was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn edit(&mut self, key: &KeyEvent) -> bool {
        if key.has_modifiers() || self.context.get_option(options::ASCII_MODE) {
            return false;
        }
        let ctx = &mut self.context;
        match key.keycode() {
            keysym::BACKSPACE => return backspace(ctx),
            keysym::ESCAPE => {
                if !ctx.is_composing() {
                    return false;
                }
                ctx.clear();
                return true;
            }
            keysym::SPACE => {
                if !ctx.is_composing() {
                    return false;
                }
                ctx.confirm_current_selection();
                return true;
            }
            _ => {}
        }
        if key.is_return() {
            if !ctx.is_composing() {
                return false;
            }
            if ctx.get_option(options::AUTO_COMMIT) {
                ctx.clear_non_confirmed_composition();
            }
            ctx.commit();
            return true;
        }

        if let Some(index) = self.select_index(key) {
            let ctx = &mut self.context;
            if ctx.has_menu() && ctx.select_on_page(self.config.page_size, index) {
                return true;
            }
        }

        let Some(ch) = key.graphic_ascii() else {
            return false;
        };
        let ctx = &mut self.context;
        if self.config.speller.alphabet.contains(ch) {
            ctx.push_input(&ch.to_string());
            compose(ctx);
            true
        } else if ch.is_ascii_punctuation() {
            punctuate(ctx, ch);
            true
        } else {
            drop_pending_prediction(ctx);
            ctx.commit();
            false
        }
    }

    fn select_index(&self, key: &KeyEvent) -> Option<usize> {
        if self.config.select_keys.is_empty() {
            key.digit_page_index()
        } else {
            self.config.select_keys.find(key.ascii()?)
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("predictor", &self.predictor)
            .field("context", &self.context)
            .finish()
    }
}

/// Confirm the selected segment. At the end of the input the composition is
/// committed (auto-commit) or extended with an empty segment; elsewhere the
/// remaining input is recomposed.
fn confirm_selection(ctx: &mut Context) {
    let end = ctx.input().len();
    let Some(seg) = ctx.composition_mut().back_mut() else {
        return;
    };
    if seg.end == end {
        seg.status = SegmentStatus::Confirmed;
        if ctx.get_option(options::AUTO_COMMIT) {
            ctx.commit();
        } else {
            ctx.composition_mut().forward();
        }
    } else {
        ctx.composition_mut().forward();
        compose(ctx);
    }
}

/// Re-segment the unselected tail of the input as one echoed phrase.
fn compose(ctx: &mut Context) {
    let len = ctx.input().len();
    while ctx
        .composition()
        .back()
        .is_some_and(|seg| seg.status < SegmentStatus::Selected || seg.end > len)
    {
        ctx.composition_mut().pop();
    }
    let start = ctx.composition().back().map_or(0, |seg| seg.end);
    let text = ctx
        .input()
        .get(start..)
        .filter(|rest| !rest.is_empty())
        .map(str::to_string);
    if let Some(text) = text {
        ctx.composition_mut()
            .push(Segment::with_menu(start, len, vec![Candidate::phrase(text)]));
    }
    ctx.notify_update();
}

fn backspace(ctx: &mut Context) -> bool {
    if ctx.input().is_empty() {
        if ctx.composition().is_empty() {
            return false;
        }
        ctx.clear();
        return true;
    }
    ctx.pop_input();
    compose(ctx);
    true
}

fn punctuate(ctx: &mut Context, ch: char) {
    drop_pending_prediction(ctx);
    ctx.commit();
    ctx.push_input(&ch.to_string());
    compose(ctx);
    if let Some(seg) = ctx.composition_mut().back_mut() {
        seg.menu = vec![Candidate::punct(full_width(ch))];
        seg.selected_index = 0;
    }
    debug!(%ch, "punctuation");
    ctx.confirm_current_selection();
}

/// Unaccepted predictions are never committed.
fn drop_pending_prediction(ctx: &mut Context) {
    while ctx
        .composition()
        .back()
        .is_some_and(|seg| seg.is_prediction() && seg.status < SegmentStatus::Selected)
    {
        ctx.composition_mut().pop();
    }
}

fn full_width(ch: char) -> String {
    match ch {
        ',' => "，".to_string(),
        '.' => "。".to_string(),
        ';' => "；".to_string(),
        ':' => "：".to_string(),
        '?' => "？".to_string(),
        '!' => "！".to_string(),
        '\\' => "、".to_string(),
        _ => ch.to_string(),
    }
}
