mod common;

use std::collections::BTreeSet;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use keytest::language::FixedWordSource;
use keytest::runtime::{dispatch, EngineEvent, FixedTicker, Runner, TestEventSource};
use keytest::session::WordResult;
use keytest::{Keycode, Keymap, Status};

use common::{engine, timed, words};

// Headless integration using the runtime + Engine without a TTY.
// Verifies that a minimal typing flow completes via Runner/TestEventSource.
#[test]
fn headless_typing_flow_completes() {
    let (mut engine, _clock) = engine(
        FixedWordSource::new().with_language("english", &["cat", "dog"]),
        words(2),
    );

    let (tx, rx) = mpsc::channel();
    let es = TestEventSource::new(rx);
    let ticker = FixedTicker::new(Duration::from_millis(5));
    let runner = Runner::new(es, ticker);

    for c in "cat ".chars() {
        tx.send(EngineEvent::key(c.to_string())).unwrap();
    }
    for _ in 0..4 {
        dispatch(&mut engine, runner.step());
    }

    let state = engine.state();
    assert_eq!(
        state.word_results,
        vec![WordResult {
            word: "cat".into(),
            typed: "cat".into(),
            correct: true
        }]
    );
    assert_eq!(state.current_word_index, 1);
    assert_eq!(state.status, Status::Running);

    for c in "dog".chars() {
        tx.send(EngineEvent::key(c.to_string())).unwrap();
    }
    for _ in 0..100u32 {
        dispatch(&mut engine, runner.step());
        if engine.state().has_finished() {
            break;
        }
    }

    let state = engine.state();
    assert_eq!(state.status, Status::Finished);
    assert_eq!(state.word_results.len(), 2);
    assert_eq!(
        state.word_results[1],
        WordResult {
            word: "dog".into(),
            typed: "dog".into(),
            correct: true
        }
    );
    let result = engine.result().expect("finished engine has a result");
    assert_eq!(result.accuracy, 100.0);
}

#[test]
fn headless_timed_session_finishes_by_time() {
    let (mut engine, clock) = engine(
        FixedWordSource::new().with_language("english", &["hello"]),
        timed(2),
    );

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(1)),
    );
    tx.send(EngineEvent::key("h")).unwrap();

    for _ in 0..50u32 {
        dispatch(&mut engine, runner.step());
        clock.advance(Duration::from_millis(250));
        if engine.state().has_finished() {
            break;
        }
    }

    assert!(
        engine.state().has_finished(),
        "timed session should finish by timeout"
    );
    assert_eq!(engine.elapsed_seconds(), 2);
    assert_eq!(engine.remaining_seconds(), Some(0));
    assert_eq!(engine.state().wpm_history.len(), 2);
}

#[test]
fn headless_timed_session_finishes_while_typing_fast() {
    let (mut engine, clock) = engine(
        FixedWordSource::new().with_language("english", &["a"]),
        timed(1),
    );

    // queue every key up front so the runner never times out into a Tick
    let (tx, rx) = mpsc::channel();
    for i in 0..100 {
        let key = if i % 2 == 0 { "a" } else { " " };
        tx.send(EngineEvent::key(key)).unwrap();
    }
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(100)),
    );

    for _ in 0..100 {
        clock.advance(Duration::from_millis(20));
        let event = runner.step();
        assert!(!matches!(event, EngineEvent::Tick));
        dispatch(&mut engine, event);
    }

    let state = engine.state();
    assert_eq!(state.status, Status::Finished);
    assert_eq!(engine.elapsed_seconds(), 1);
    assert_eq!(state.wpm_history.len(), 1);
    // 25 words fit in the second; later keys are dropped
    assert_eq!(state.correct_chars, 50);
}

#[test]
fn headless_matrix_frames_update_layer_only() {
    let (mut engine, _clock) = engine(
        FixedWordSource::new().with_language("english", &["cat"]),
        words(1),
    );
    let keymap = Arc::new(Keymap::new().with(0, 3, 0, Keycode::mo(1)));
    let before = engine.state().clone();

    dispatch(
        &mut engine,
        EngineEvent::Matrix {
            pressed: BTreeSet::from([(3, 0)]),
            keymap: Arc::clone(&keymap),
        },
    );
    assert_eq!(engine.effective_layer(), 1);
    assert_eq!(engine.state(), &before);

    dispatch(
        &mut engine,
        EngineEvent::Matrix {
            pressed: BTreeSet::new(),
            keymap,
        },
    );
    assert_eq!(engine.effective_layer(), 0);
}

#[test]
fn headless_composition_and_focus_events() {
    let (mut engine, _clock) = engine(
        FixedWordSource::new().with_language("english", &["日本", "語"]),
        words(2),
    );

    dispatch(&mut engine, EngineEvent::Focus(false));
    dispatch(&mut engine, EngineEvent::CompositionStart);
    dispatch(&mut engine, EngineEvent::CompositionEnd("日本".into()));
    assert_eq!(engine.state().status, Status::Waiting);
    assert!(engine.state().current_input.is_empty());

    dispatch(&mut engine, EngineEvent::Focus(true));
    dispatch(&mut engine, EngineEvent::CompositionStart);
    dispatch(&mut engine, EngineEvent::CompositionUpdate("にほん".into()));
    assert_eq!(engine.state().composition_text, "にほん");
    dispatch(&mut engine, EngineEvent::CompositionEnd("日本".into()));
    dispatch(&mut engine, EngineEvent::RawSpace);
    assert_eq!(engine.state().current_word_index, 1);

    dispatch(&mut engine, EngineEvent::CompositionStart);
    dispatch(&mut engine, EngineEvent::CompositionEnd("語".into()));
    assert_eq!(engine.state().status, Status::Finished);
}
