use qed::{Feedback, LtacProfResults, MessageLevel, Point, Span, Status};

use super::*;

fn status_feedback(id: u64, status: Status) -> BackendEvent {
    BackendEvent::Feedback(Feedback::StateStatus {
        state_id: state(id),
        route: 0,
        status,
        worker: None,
    })
}

#[tokio::test]
async fn buffered_feedback_is_applied_after_the_add() {
    let Setup { mut stm, callbacks, events, .. } = setup();
    let mut source = ScriptSource::new([cmd("A.", "0:0..0:2"), cmd("B.", "0:2..0:4")]);
    stm.step_forward(&mut source, false).await.unwrap();

    // the prover streams status for state 3 before the add response names it
    events.send(status_feedback(3, Status::Processed)).unwrap();
    stm.step_forward(&mut source, false).await.unwrap();

    assert_eq!(
        stm.sentences().collect::<Vec<_>>(),
        [
            (range("0:0..0:2"), Status::ProcessingInput),
            (range("0:2..0:4"), Status::Processed),
        ]
    );

    let updates = callbacks
        .lock()
        .unwrap()
        .iter()
        .filter(|cb| matches!(cb, Callback::Status(r, Status::Processed) if *r == range("0:2..0:4")))
        .count();
    assert_eq!(updates, 1, "the buffered update fires exactly once");
}

#[tokio::test]
async fn status_for_known_states_applies_immediately() {
    let Setup { mut stm, callbacks, .. } = setup();
    let mut source = ScriptSource::new([cmd("A.", "0:0..0:2")]);
    stm.step_forward(&mut source, false).await.unwrap();

    stm.handle_event(status_feedback(2, Status::Complete));

    assert_eq!(stm.sentences().collect::<Vec<_>>(), [(range("0:0..0:2"), Status::Complete)]);
    assert!(
        callbacks.lock().unwrap().contains(&Callback::Status(range("0:0..0:2"), Status::Complete))
    );
}

#[tokio::test]
async fn buffered_feedback_for_states_that_never_appear_is_dropped() {
    let Setup { mut stm, callbacks, events, .. } = setup();
    let mut source = ScriptSource::new([cmd("A.", "0:0..0:2"), cmd("B.", "0:2..0:4")]);
    stm.step_forward(&mut source, false).await.unwrap();

    events.send(status_feedback(99, Status::Processed)).unwrap();
    stm.step_forward(&mut source, false).await.unwrap();

    assert!(
        !callbacks
            .lock()
            .unwrap()
            .iter()
            .any(|cb| matches!(cb, Callback::Status(_, Status::Processed))),
        "feedback for an id that never materialized must not surface"
    );
}

#[tokio::test]
async fn error_feedback_translates_and_records() {
    let Setup { mut stm, callbacks, .. } = setup();
    let mut source = ScriptSource::new([cmd("About nat.", "0:0..0:10")]);
    stm.step_forward(&mut source, false).await.unwrap();

    stm.handle_event(BackendEvent::Feedback(Feedback::StateError {
        state_id: state(2),
        route: 0,
        message: "not found".to_owned(),
        span: Some(Span { start: 6, stop: 9 }),
    }));

    assert_eq!(stm.sentences().collect::<Vec<_>>(), [(range("0:0..0:10"), Status::Error)]);
    let errors: Vec<_> = stm.sentence_errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].sentence_range, range("0:0..0:10"));
    assert_eq!(errors[0].error_range, range("0:6..0:9"));
    assert_eq!(errors[0].message, "not found");

    assert!(callbacks.lock().unwrap().contains(&Callback::Error(
        range("0:0..0:10"),
        range("0:6..0:9"),
        "not found".to_owned()
    )));
}

#[tokio::test]
async fn error_feedback_for_unknown_states_is_dropped() {
    let Setup { mut stm, callbacks, .. } = setup();
    let mut source = ScriptSource::new([cmd("A.", "0:0..0:2")]);
    stm.step_forward(&mut source, false).await.unwrap();

    stm.handle_event(BackendEvent::Feedback(Feedback::StateError {
        state_id: state(9),
        route: 0,
        message: "ghost".to_owned(),
        span: None,
    }));

    assert_eq!(stm.sentence_errors().count(), 0);
    assert!(!callbacks.lock().unwrap().iter().any(|cb| matches!(cb, Callback::Error(..))));
}

#[tokio::test]
async fn messages_are_forwarded() {
    let Setup { mut stm, callbacks, .. } = setup();
    let mut source = ScriptSource::new([]);
    stm.step_forward(&mut source, false).await.unwrap();

    stm.handle_event(BackendEvent::Feedback(Feedback::Message {
        level: MessageLevel::Notice,
        text: "nat : Set".to_owned(),
    }));

    assert_eq!(
        callbacks.lock().unwrap().last(),
        Some(&Callback::Message(MessageLevel::Notice, "nat : Set".to_owned()))
    );
}

#[tokio::test]
async fn ltac_prof_results_carry_the_sentence_range() {
    let Setup { mut stm, prover, callbacks, .. } = setup();
    let mut source = ScriptSource::new([cmd("tac.", "0:0..0:4")]);
    stm.step_forward(&mut source, false).await.unwrap();

    stm.ltac_profiling(Some(Point::new(0, 1))).await.unwrap();
    assert_eq!(
        prover.lock().unwrap().calls.last(),
        Some(&Call::LtacProfiling(Some(state(2))))
    );

    stm.handle_event(BackendEvent::Feedback(Feedback::LtacProf {
        state_id: state(2),
        route: 0,
        results: LtacProfResults::default(),
    }));
    assert_eq!(
        callbacks.lock().unwrap().last(),
        Some(&Callback::LtacProf(range("0:0..0:4"), LtacProfResults::default()))
    );
}

#[tokio::test]
async fn unconsumed_feedback_kinds_are_ignored() {
    let Setup { mut stm, callbacks, .. } = setup();
    let mut source = ScriptSource::new([]);
    stm.step_forward(&mut source, false).await.unwrap();

    stm.handle_event(BackendEvent::Feedback(Feedback::WorkerStatus {
        id: "proofworker:0".to_owned(),
        status: "Idle".to_owned(),
    }));
    stm.handle_event(BackendEvent::Feedback(Feedback::FileLoaded {
        module: "Top.Foo".to_owned(),
        file: "Foo.vo".to_owned(),
    }));
    stm.handle_event(BackendEvent::Feedback(Feedback::EditFeedback { edit_id: 1, error: None }));

    assert!(callbacks.lock().unwrap().is_empty());
}
