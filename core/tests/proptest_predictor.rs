// core/tests/proptest_predictor.rs
//
// Property-based tests for the predictor state machine.
//
// Random key sequences are fed to a Session in both editing modes and the
// structural invariants are checked after every action.

use libpredict_core::context::options;
use libpredict_core::{
    CandidateKind, Config, KeyEvent, PredictEngineComponent, PredictTable, PredictorComponent, SegmentStatus,
    Session,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Action {
    Type(char),
    Space,
    Backspace,
    Escape,
    Return,
    Digit(char),
    Punct(char),
    ToggleAscii,
    TogglePrediction,
    ToggleAutoCommit,
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        30 => prop::sample::select(vec!['h', 'e', 'l', 'o', 'w', 'r', 'd'])
            .prop_map(Action::Type),
        15 => Just(Action::Space),
        8 => Just(Action::Backspace),
        4 => Just(Action::Escape),
        6 => Just(Action::Return),
        8 => prop::sample::select(vec!['1', '2', '3', '0'])
            .prop_map(Action::Digit),
        4 => prop::sample::select(vec![',', '.', '?'])
            .prop_map(Action::Punct),
        2 => Just(Action::ToggleAscii),
        1 => Just(Action::TogglePrediction),
        1 => Just(Action::ToggleAutoCommit),
    ]
}

fn session(max_iterations: usize, fluid: bool) -> Session {
    let mut table = PredictTable::new();
    table.insert("hello", ["world", "there"]);
    table.insert("world", ["hello", "peace"]);
    table.insert("d", ["e"]);
    let mut config = Config {
        auto_commit: !fluid,
        ..Config::default()
    };
    config.predictor.max_iterations = max_iterations;
    Session::new(
        config,
        &PredictorComponent::new(PredictEngineComponent::new(table)),
    )
}

fn execute(session: &mut Session, action: &Action) {
    let key = match action {
        Action::Type(ch) | Action::Digit(ch) | Action::Punct(ch) => KeyEvent::from_char(*ch),
        Action::Space => "space".parse().unwrap(),
        Action::Backspace => "BackSpace".parse().unwrap(),
        Action::Escape => "Escape".parse().unwrap(),
        Action::Return => "Return".parse().unwrap(),
        Action::ToggleAscii => {
            let on = session.get_option(options::ASCII_MODE);
            session.set_option(options::ASCII_MODE, !on);
            return;
        }
        Action::TogglePrediction => {
            let on = session.get_option(options::PREDICTION);
            session.set_option(options::PREDICTION, !on);
            return;
        }
        Action::ToggleAutoCommit => {
            let on = session.get_option(options::AUTO_COMMIT);
            session.set_option(options::AUTO_COMMIT, !on);
            return;
        }
    };
    session.process_key(&key);
}

fn check_invariants(
    session: &Session,
    action: &Action,
    max_iterations: usize,
    accepted_seen: &mut bool,
) -> Result<(), TestCaseError> {
    let predictor = session.predictor();
    prop_assert!(!predictor.state().is_self_updating());
    if max_iterations > 0 {
        prop_assert!(predictor.iteration_count() < max_iterations);
    }

    let ctx = session.context();
    // a positive count needs an accepted prediction since the count last
    // dropped to zero; later edits may discard it without resetting
    let accepted_now = ctx
        .commit_history()
        .iter()
        .any(|r| r.kind == CandidateKind::Prediction)
        || ctx
            .composition()
            .iter()
            .any(|s| s.is_prediction() && s.status >= SegmentStatus::Selected);
    if predictor.iteration_count() > 0 {
        prop_assert!(
            *accepted_seen || accepted_now,
            "iteration count {} without an accepted prediction",
            predictor.iteration_count()
        );
        *accepted_seen = true;
    } else {
        *accepted_seen = false;
    }
    let segments: Vec<_> = ctx.composition().iter().collect();
    let input_len = ctx.input().len();
    for seg in &segments {
        prop_assert!(seg.start <= seg.end && seg.end <= input_len);
    }
    if let Some((_, earlier)) = segments.split_last() {
        for seg in earlier {
            prop_assert!(
                !(seg.is_prediction() && seg.status < SegmentStatus::Selected),
                "pending prediction before the last segment: {:?}",
                segments
            );
        }
    }
    // with prediction off a pass-through Escape leaves the composition alone
    if matches!(action, Action::Escape) && ctx.get_option(options::PREDICTION) {
        prop_assert!(!ctx.composition().back().is_some_and(|s| s.is_prediction()));
    }
    // preedit is always renderable
    let _ = session.preedit();
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn invariants_hold_for_random_keys(
        max_iterations in 0usize..4,
        fluid in any::<bool>(),
        actions in prop::collection::vec(arb_action(), 1..60),
    ) {
        let mut s = session(max_iterations, fluid);
        let mut accepted_seen = false;
        for action in &actions {
            execute(&mut s, action);
            check_invariants(&s, action, max_iterations, &mut accepted_seen)?;
        }
    }

    #[test]
    fn escape_always_leaves_no_prediction(
        fluid in any::<bool>(),
        prefix in prop::collection::vec(arb_action(), 0..30),
    ) {
        let mut s = session(0, fluid);
        for action in &prefix {
            execute(&mut s, action);
        }
        execute(&mut s, &Action::Escape);
        prop_assume!(s.get_option(options::PREDICTION));
        let back_is_prediction = s
            .context()
            .composition()
            .back()
            .is_some_and(|seg| seg.is_prediction());
        prop_assert!(!back_is_prediction);
    }
}
