use qed::{CoqError, Fail, Span, StmError};

use super::*;

#[tokio::test]
async fn failed_add_rewinds_to_the_fallback_state() {
    let Setup { mut stm, prover, .. } = setup();
    let mut source = ScriptSource::new([cmd("A.", "0:0..0:2")]);
    stm.step_forward(&mut source, false).await.unwrap();

    prover.lock().unwrap().add.push_back(Err(CoqError::Fail(Fail {
        state_id: Some(state(2)),
        message: "syntax error".to_owned(),
        span: Some(Span { start: 0, stop: 3 }),
    })));

    let mut source = ScriptSource::new([cmd("Bad().", "0:2..0:8")]);
    let err = stm.step_forward(&mut source, false).await.unwrap_err();
    let StmError::Fail(fail) = err else { panic!("expected a fail value: {err}") };
    assert_eq!(fail.message, "syntax error");
    // chars 0..3 of the submitted text, anchored at the command start
    assert_eq!(fail.range, range("0:2..0:5"));

    assert_eq!(prover.lock().unwrap().calls.last(), Some(&Call::EditAt(state(2))));
    assert_eq!(stm.focus(), Some(state(2)));
    assert_eq!(stm.sentences().count(), 1);

    // the machine keeps running and the next add attaches to the fallback
    let mut source = ScriptSource::new([cmd("Ok.", "0:2..0:5")]);
    assert_eq!(stm.step_forward(&mut source, false).await.unwrap(), Some(state(3)));
}

#[tokio::test]
async fn failure_spans_translate_across_newlines() {
    let Setup { mut stm, prover, .. } = setup();
    let mut source = ScriptSource::new([cmd("Proof.\n", "0:0..1:0")]);
    stm.step_forward(&mut source, false).await.unwrap();

    prover.lock().unwrap().add.push_back(Err(CoqError::Fail(Fail {
        state_id: Some(state(2)),
        message: "unbound".to_owned(),
        span: Some(Span { start: 3, stop: 5 }),
    })));

    let mut source = ScriptSource::new([cmd("ab\ncd.", "1:0..2:3")]);
    let err = stm.step_forward(&mut source, false).await.unwrap_err();
    let StmError::Fail(fail) = err else { panic!("expected a fail value: {err}") };
    assert_eq!(fail.range, range("2:0..2:2"));
}

#[tokio::test]
async fn failure_without_a_fallback_keeps_the_tree() {
    let Setup { mut stm, prover, .. } = setup();
    let mut source = ScriptSource::new([cmd("A.", "0:0..0:2")]);
    stm.step_forward(&mut source, false).await.unwrap();

    prover.lock().unwrap().add.push_back(Err(CoqError::Fail(Fail {
        state_id: None,
        message: "nope".to_owned(),
        span: None,
    })));

    let mut source = ScriptSource::new([cmd("B.", "0:2..0:4")]);
    let err = stm.step_forward(&mut source, false).await.unwrap_err();
    let StmError::Fail(fail) = err else { panic!("expected a fail value: {err}") };
    // with no span, the whole submitted range is blamed
    assert_eq!(fail.range, range("0:2..0:4"));

    assert_eq!(stm.focus(), Some(state(2)));
    assert_eq!(stm.sentences().count(), 1);
    assert!(
        !prover.lock().unwrap().calls.iter().any(|c| matches!(c, Call::EditAt(_))),
        "no fallback, no edit-at"
    );
}
