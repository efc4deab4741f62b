use qed::Status;

use super::*;

#[tokio::test]
async fn boundary_edit_attaches_to_the_successor() {
    let Setup { mut stm, prover, .. } = setup();
    let mut source = ScriptSource::new([cmd("A.", "0:0..0:2"), cmd("B.", "0:2..0:4")]);
    stm.step_forward(&mut source, false).await.unwrap();
    stm.step_forward(&mut source, false).await.unwrap();
    let calls_before = prover.lock().unwrap().calls.len();

    // an insertion exactly on the boundary shifts B and leaves A alone
    stm.apply_changes(&[change("0:2..0:2", "X")], 1).await.unwrap();

    assert_eq!(
        stm.sentences().collect::<Vec<_>>(),
        [
            (range("0:0..0:2"), Status::ProcessingInput),
            (range("0:3..0:5"), Status::ProcessingInput),
        ]
    );
    assert_eq!(prover.lock().unwrap().calls.len(), calls_before, "pure shifts are client-side");
    assert_eq!(stm.version(), 1);
}

#[tokio::test]
async fn interior_edit_cancels_the_sentence_and_its_descendants() {
    let Setup { mut stm, prover, callbacks, .. } = setup();
    let mut source = ScriptSource::new([cmd("A.", "0:0..0:2"), cmd("B.", "0:2..0:4")]);
    stm.step_forward(&mut source, false).await.unwrap();
    stm.step_forward(&mut source, false).await.unwrap();

    stm.apply_changes(&[change("0:0..0:1", "XY")], 1).await.unwrap();

    // A's interior was touched, so the whole chain was cancelled
    assert_eq!(stm.sentences().count(), 0);
    assert_eq!(stm.focus(), Some(state(1)));
    assert_eq!(prover.lock().unwrap().calls.last(), Some(&Call::EditAt(state(1))));

    let callbacks = callbacks.lock().unwrap();
    assert!(callbacks.contains(&Callback::Clear(range("0:0..0:2"))));
    // B had already been shifted by the time the cascade removed it
    assert!(callbacks.contains(&Callback::Clear(range("0:3..0:5"))));
}

#[tokio::test]
async fn edits_before_everything_shift_the_whole_chain() {
    let Setup { mut stm, prover, .. } = setup();
    let mut source = ScriptSource::new([cmd("Proof.\n", "0:0..1:0"), cmd("tac.", "1:0..1:4")]);
    stm.step_forward(&mut source, false).await.unwrap();
    stm.step_forward(&mut source, false).await.unwrap();
    let calls_before = prover.lock().unwrap().calls.len();

    // prepend a comment line
    stm.apply_changes(&[change("0:0..0:0", "(* c *)\n")], 1).await.unwrap();

    assert_eq!(
        stm.sentences().map(|(range, _)| range).collect::<Vec<_>>(),
        [range("1:0..2:0"), range("2:0..2:4")]
    );
    assert_eq!(prover.lock().unwrap().calls.len(), calls_before);
}

#[tokio::test]
async fn apply_changes_before_initialization_only_records_the_version() {
    let Setup { mut stm, prover, .. } = setup();
    stm.apply_changes(&[change("0:0..0:1", "")], 7).await.unwrap();
    assert_eq!(stm.version(), 7);
    assert!(prover.lock().unwrap().calls.is_empty());
}

#[tokio::test]
async fn the_document_version_is_stamped_on_adds() {
    let Setup { mut stm, prover, .. } = setup();
    stm.apply_changes(&[], 5).await.unwrap();

    let mut source = ScriptSource::new([cmd("A.", "0:0..0:2")]);
    stm.step_forward(&mut source, false).await.unwrap();
    assert_eq!(
        prover.lock().unwrap().calls.last(),
        Some(&Call::Add { text: "A.".into(), version: 5, parent: state(1), verbose: false })
    );
}
