mod errors;

use std::time::Instant;

use qed_core::{position_at_relative, Point, ProofView, Range, Status, TextChange};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::command::{Command, CommandSource};
use crate::coqtop::{
    AddResponse, BackendEvent, CoqError, CoqTop, EditAtResponse, Fail, Feedback, NewFocus, Span,
    StateId,
};
use crate::feedback::{BufferedStatus, FeedbackBuffer};
use crate::sentence::SentenceError;
use crate::tree::{SentenceId, SentenceTree};
use crate::{CoqClient, Result};

pub use self::errors::{FailValue, StmError};

/// The sentence transactional machine.
///
/// Owns the prover transport and the editor callbacks, and keeps the sentence
/// tree consistent with both the document and the prover's notion of accepted
/// work. Every prover request is serialized behind `&mut self`; pushed
/// feedback is drained cooperatively at each suspension point, so none of the
/// internal state needs locking.
pub struct StateMachine {
    coqtop: Box<dyn CoqTop>,
    client: Box<dyn CoqClient>,
    events: UnboundedReceiver<BackendEvent>,
    phase: Phase,
    /// Latest document version reported by the editor, stamped on adds.
    version: u32,
}

enum Phase {
    /// No prover state yet; the first operation that needs the prover resets
    /// it and builds the root sentence.
    Uninitialized,
    Running(Doc),
    /// Terminal. A disposed machine refuses every operation.
    Disposed,
}

/// Prover-side state while running: the accepted sentence tree and the two
/// cursors into it.
struct Doc {
    tree: SentenceTree,
    /// The prover's execution tip; the next add attaches here. Not always the
    /// last sentence in document order (jumping into an open proof focuses an
    /// interior sentence while the closing stack remains).
    focus: SentenceId,
    /// The sentence with the greatest range end; seeds reconciliation walks.
    last: SentenceId,
    buffer: FeedbackBuffer,
}

/// Get the running [`Doc`] or bail out of the enclosing function.
/// This needs to be a macro so the borrow stays a plain field projection and
/// `client`/`coqtop` remain usable alongside it.
macro_rules! doc {
    ($self:ident) => {
        match &mut $self.phase {
            Phase::Running(doc) => doc,
            Phase::Disposed => return Err(StmError::Disposed),
            Phase::Uninitialized => {
                return Err(StmError::Backend(anyhow::anyhow!("prover is not initialized")))
            }
        }
    };
}

impl StateMachine {
    pub fn new(
        coqtop: Box<dyn CoqTop>,
        client: Box<dyn CoqClient>,
        events: UnboundedReceiver<BackendEvent>,
    ) -> Self {
        Self { coqtop, client, events, phase: Phase::Uninitialized, version: 0 }
    }

    /// Latest document version the editor reported.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running(_))
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        matches!(self.phase, Phase::Disposed)
    }

    /// The state the prover currently treats as its execution tip.
    pub fn focus(&self) -> Option<StateId> {
        let doc = self.running()?;
        Some(doc.tree[doc.focus].state_id())
    }

    /// Submit the next command the parser produces at the focus.
    ///
    /// Returns the new state on success, `None` when the parser has nothing
    /// left at the focus or the request was interrupted.
    pub async fn step_forward(
        &mut self,
        source: &mut dyn CommandSource,
        verbose: bool,
    ) -> Result<Option<StateId>> {
        self.validate().await?;
        let at = {
            let doc = doc!(self);
            doc.tree[doc.focus].range().end()
        };
        let Some(command) = source.commands(at, None).next() else {
            return Ok(None);
        };
        match self.submit(command, verbose).await {
            Ok(response) => Ok(Some(response.state_id)),
            Err(StmError::Interrupted) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Cancel the focused sentence by moving the focus to its parent.
    /// Returns the new focus, or `None` when already at the root.
    pub async fn step_backward(&mut self) -> Result<Option<StateId>> {
        self.validate().await?;
        let parent = {
            let doc = doc!(self);
            doc.tree[doc.focus].parent()
        };
        let Some(parent) = parent else {
            return Ok(None);
        };
        self.focus_sentence(parent).await?;
        let doc = doc!(self);
        Ok(Some(doc.tree[doc.focus].state_id()))
    }

    /// Advance (or retreat) the prover so that the focus ends as close to
    /// `pos` as the sentence boundaries allow.
    pub async fn interpret_to_point(
        &mut self,
        pos: Point,
        source: &mut dyn CommandSource,
    ) -> Result<StateId> {
        self.validate().await?;

        let anchor = {
            let doc = doc!(self);
            doc.tree[doc.focus].range().end()
        };
        let mut iter = source.commands(anchor, Some(pos));
        let mut lookahead = iter.next();
        while let Some(command) = lookahead.take() {
            if command.range.end() > pos {
                break;
            }
            // keep the parser one command ahead of the in-flight request
            lookahead = iter.next();
            let response = match self.submit(command, false).await {
                Ok(response) => response,
                Err(StmError::Interrupted) => break,
                Err(err) => return Err(err),
            };
            if response.unfocused_state_id.is_some() {
                // the focus jumped; restart the parser from the new anchor
                let anchor = {
                    let doc = doc!(self);
                    doc.tree[doc.focus].range().end()
                };
                drop(iter);
                iter = source.commands(anchor, Some(pos));
                lookahead = iter.next();
            }
        }
        drop(iter);

        // the last accepted sentence may overshoot `pos`; fall back to the
        // nearest sentence ending at or before it
        let target = {
            let doc = doc!(self);
            if doc.tree[doc.focus].range().end() <= pos {
                None
            } else {
                let root = doc.tree.root();
                std::iter::once(root)
                    .chain(doc.tree.descendants(root))
                    .filter(|&id| doc.tree[id].range().end() <= pos)
                    .last()
            }
        };
        if let Some(target) = target {
            self.focus_sentence(target).await?;
        }

        let doc = doc!(self);
        Ok(doc.tree[doc.focus].state_id())
    }

    /// Reconcile a batch of non-overlapping document edits.
    ///
    /// Edits are processed in reverse document order against the sentence walk
    /// from the last sentence up through its ancestors, so earlier edits never
    /// shift the positions of later ones. Sentences whose interior an edit
    /// touches are cancelled together with their descendants.
    pub async fn apply_changes(&mut self, changes: &[TextChange], new_version: u32) -> Result<()> {
        self.pump_events();
        if self.is_disposed() {
            return Err(StmError::Disposed);
        }
        tracing::debug!(n = changes.len(), version = new_version, "applying document changes");

        if matches!(self.phase, Phase::Uninitialized) {
            self.version = new_version;
            return Ok(());
        }

        let mut changes = changes.to_vec();
        changes.sort_by(|a, b| b.range.start().cmp(&a.range.start()));
        for w in changes.windows(2) {
            assert!(
                !w[0].range.intersects(&w[1].range),
                "changes must not overlap: {:?} and {:?}",
                w[0],
                w[1]
            );
        }

        let mut cursor = {
            let doc = doc!(self);
            Some(doc.last)
        };
        while let Some(id) = cursor {
            let (invalidated, parent) = {
                let doc = doc!(self);
                let end = doc.tree[id].range().end();
                changes.retain(|change| change.range.start() < end);
                if changes.is_empty() {
                    break;
                }
                (doc.tree[id].apply_changes(&changes), doc.tree[id].parent())
            };
            if invalidated {
                self.cancel_sentence(id).await?;
            }
            cursor = parent;
        }

        self.version = new_version;
        Ok(())
    }

    /// The current goal structure together with the focus position.
    /// Empty when the prover is not running or the request was interrupted.
    pub async fn goal(&mut self) -> Result<ProofView> {
        self.pump_events();
        match self.phase {
            Phase::Disposed => return Err(StmError::Disposed),
            Phase::Uninitialized => return Ok(ProofView::default()),
            Phase::Running(_) => {}
        }
        let outcome = self.coqtop.goal().await;
        self.pump_events();
        match outcome {
            Ok(goals) => {
                let doc = doc!(self);
                Ok(ProofView { focus: doc.tree[doc.focus].range().end(), goals })
            }
            Err(CoqError::Interrupted) => Ok(ProofView::default()),
            Err(CoqError::Fail(fail)) => {
                tracing::debug!(message = %fail.message, "goal request failed");
                Ok(ProofView::default())
            }
            Err(err) => Err(transport_error(err)),
        }
    }

    /// Run a read-only query at the sentence containing `pos`, or at the tip.
    /// Returns the empty string when interrupted.
    pub async fn query(&mut self, text: String, pos: Option<Point>) -> Result<String> {
        self.validate().await?;
        let (state, range) = {
            let doc = doc!(self);
            let id = pos
                .and_then(|pos| {
                    let root = doc.tree.root();
                    doc.tree.descendants(root).find(|&id| doc.tree[id].contains(pos))
                })
                .unwrap_or(doc.focus);
            (doc.tree[id].state_id(), doc.tree[id].range())
        };
        tracing::debug!(%state, "querying prover");
        let outcome = self.coqtop.query(text, state).await;
        self.pump_events();
        match outcome {
            Ok(answer) => Ok(answer),
            Err(CoqError::Interrupted) => Ok(String::new()),
            Err(CoqError::Fail(fail)) => {
                Err(StmError::Fail(FailValue { message: fail.message, range }))
            }
            Err(err) => Err(transport_error(err)),
        }
    }

    /// Ask the prover to abort in-progress work. Awaited operations observing
    /// the interruption return neutral results rather than errors.
    pub async fn interrupt(&mut self) -> Result<()> {
        if self.is_disposed() {
            return Err(StmError::Disposed);
        }
        if !self.is_running() {
            return Ok(());
        }
        tracing::debug!("interrupting prover");
        if let Err(err) = self.coqtop.interrupt().await {
            tracing::warn!(error = %err, "interrupt request failed");
        }
        self.pump_events();
        Ok(())
    }

    /// Request tactic profiling for the sentence at `pos`, or globally.
    /// Results arrive asynchronously and are forwarded to the client.
    pub async fn ltac_profiling(&mut self, pos: Option<Point>) -> Result<()> {
        self.validate().await?;
        let state = {
            let doc = doc!(self);
            pos.and_then(|pos| {
                let root = doc.tree.root();
                doc.tree
                    .descendants(root)
                    .find(|&id| doc.tree[id].contains(pos))
                    .map(|id| doc.tree[id].state_id())
            })
        };
        let outcome = self.coqtop.ltac_profiling(state).await;
        self.pump_events();
        match outcome {
            Ok(()) | Err(CoqError::Interrupted) => Ok(()),
            Err(err) => Err(transport_error(err)),
        }
    }

    /// Tell the prover how wide the editor renders its output.
    pub fn resize_window(&mut self, cols: u16) -> Result<()> {
        match self.phase {
            Phase::Disposed => Err(StmError::Disposed),
            Phase::Uninitialized => Ok(()),
            Phase::Running(_) => {
                if let Err(err) = self.coqtop.resize_window(cols) {
                    tracing::warn!(error = %err, "resize request failed");
                }
                Ok(())
            }
        }
    }

    /// Every live sentence's range and status, in document order (the root is
    /// excluded).
    pub fn sentences(&self) -> impl Iterator<Item = (Range, Status)> + '_ {
        self.running().into_iter().flat_map(|doc| {
            doc.tree.descendants(doc.tree.root()).map(move |id| {
                let sentence = &doc.tree[id];
                (sentence.range(), sentence.status())
            })
        })
    }

    /// The recorded errors of live sentences, in document order.
    pub fn sentence_errors(&self) -> impl Iterator<Item = SentenceError> + '_ {
        self.running().into_iter().flat_map(|doc| {
            doc.tree.descendants(doc.tree.root()).filter_map(move |id| {
                let sentence = &doc.tree[id];
                let info = sentence.error_info()?;
                Some(SentenceError {
                    sentence_range: sentence.range(),
                    error_range: info.range.unwrap_or_else(|| sentence.range()),
                    message: info.message.clone(),
                })
            })
        })
    }

    /// Gracefully quit the prover and dispose the machine.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.phase {
            Phase::Disposed => Err(StmError::Disposed),
            Phase::Uninitialized => {
                self.phase = Phase::Disposed;
                Ok(())
            }
            Phase::Running(_) => {
                tracing::info!("shutting down prover");
                if let Err(err) = self.coqtop.quit().await {
                    tracing::warn!(error = %err, "quit request failed");
                }
                self.pump_events();
                self.phase = Phase::Disposed;
                Ok(())
            }
        }
    }

    /// Immediate teardown. All further operations return
    /// [`StmError::Disposed`].
    pub fn dispose(&mut self) {
        self.phase = Phase::Disposed;
    }

    /// Process one pushed backend event. The internal pump feeds events from
    /// the channel through here; transport drivers on the same task may also
    /// call it directly.
    pub fn handle_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Feedback(feedback) => self.handle_feedback(feedback),
            BackendEvent::Closed(error) => self.handle_closed(error),
        }
    }

    /// Drain whatever the transport pushed since the last suspension point.
    fn pump_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    fn handle_feedback(&mut self, feedback: Feedback) {
        let Phase::Running(doc) = &mut self.phase else {
            tracing::trace!(?feedback, "dropping feedback outside the running phase");
            return;
        };
        match feedback {
            Feedback::StateStatus { state_id, status, worker, route: _ } => {
                match doc.tree.lookup(state_id) {
                    Some(id) => {
                        doc.tree[id].set_status(status);
                        let range = doc.tree[id].range();
                        self.client.sentence_status(range, status);
                    }
                    None => doc.buffer.push(BufferedStatus { state_id, status, worker }),
                }
            }
            Feedback::StateError { state_id, message, span, route: _ } => {
                match doc.tree.lookup(state_id) {
                    Some(id) => {
                        let sentence = &doc.tree[id];
                        let range = sentence.range();
                        let error_range = span
                            .map(|span| span_to_range(range.start(), sentence.text(), span));
                        doc.tree[id].set_error(message.clone(), error_range);
                        self.client.sentence_error(range, error_range.unwrap_or(range), &message);
                    }
                    None => tracing::warn!(%state_id, %message, "error feedback for unknown state"),
                }
            }
            Feedback::Message { level, text } => self.client.message(level, &text),
            Feedback::LtacProf { state_id, results, route: _ } => {
                let range =
                    doc.tree.lookup(state_id).map(|id| doc.tree[id].range()).unwrap_or_default();
                self.client.ltac_prof_results(range, &results);
            }
            Feedback::WorkerStatus { .. }
            | Feedback::FileDependency { .. }
            | Feedback::FileLoaded { .. }
            | Feedback::EditFeedback { .. } => tracing::trace!(?feedback, "ignoring feedback"),
        }
    }

    fn handle_closed(&mut self, error: Option<String>) {
        match error {
            Some(error) if self.is_running() => {
                tracing::error!(%error, "prover closed unexpectedly");
                self.client.coq_died(Some(&error));
                self.phase = Phase::Disposed;
            }
            _ => tracing::debug!("prover transport closed"),
        }
    }

    /// Check the machine is usable, resetting the prover and building the
    /// root sentence on first use.
    async fn validate(&mut self) -> Result<()> {
        self.pump_events();
        match self.phase {
            Phase::Running(_) => Ok(()),
            Phase::Disposed => Err(StmError::Disposed),
            Phase::Uninitialized => {
                tracing::info!("initializing prover");
                let root_state = self.coqtop.reset().await.map_err(transport_error)?;
                self.pump_events();
                if self.is_disposed() {
                    return Err(StmError::Disposed);
                }
                let tree = SentenceTree::new(root_state);
                let root = tree.root();
                self.phase = Phase::Running(Doc {
                    tree,
                    focus: root,
                    last: root,
                    buffer: FeedbackBuffer::default(),
                });
                tracing::debug!(%root_state, "prover ready");
                Ok(())
            }
        }
    }

    fn running(&self) -> Option<&Doc> {
        match &self.phase {
            Phase::Running(doc) => Some(doc),
            _ => None,
        }
    }

    /// Submit one command on top of the focus.
    ///
    /// The command must start exactly at the focused sentence's end; anything
    /// else means the parser and the tree disagree about the document, which
    /// is unrecoverable.
    async fn submit(&mut self, command: Command, verbose: bool) -> Result<AddResponse> {
        let (focus_end, parent_state) = {
            let doc = doc!(self);
            (doc.tree[doc.focus].range().end(), doc.tree[doc.focus].state_id())
        };
        if command.range.start() != focus_end {
            return Err(self.inconsistent(format!(
                "command at {} does not start at the focus end {focus_end}",
                command.range
            )));
        }

        let started_at = Instant::now();
        tracing::debug!(text = ?command.text, range = %command.range, %parent_state, "adding command");
        let outcome =
            self.coqtop.add(command.text.clone(), self.version, parent_state, verbose).await;
        self.pump_events();

        match outcome {
            Ok(response) => {
                let range = command.range;
                let id = {
                    let doc = doc!(self);
                    let id = doc.tree.add(
                        doc.focus,
                        response.state_id,
                        command.text,
                        range,
                        started_at,
                    );
                    if range.start() >= doc.tree[doc.last].range().end() {
                        doc.last = id;
                    }
                    id
                };
                self.client.sentence_status(range, Status::ProcessingInput);
                self.drain_feedback();

                let focus = match response.unfocused_state_id {
                    Some(state) => {
                        let unfocused = {
                            let doc = doc!(self);
                            doc.tree.lookup(state)
                        };
                        match unfocused {
                            Some(id) => {
                                tracing::debug!(%state, "focus jumped to an unfocused state");
                                id
                            }
                            None => {
                                return Err(self.inconsistent(format!(
                                    "unfocused state {state} is not a live sentence"
                                )))
                            }
                        }
                    }
                    None => id,
                };
                let doc = doc!(self);
                doc.focus = focus;
                Ok(response)
            }
            Err(CoqError::Fail(fail)) => {
                Err(self.recover_from_fail(fail, Some((&command.text, command.range))).await)
            }
            Err(err) => Err(transport_error(err)),
        }
    }

    /// Make `target` the prover's tip. No-op when it already is.
    async fn focus_sentence(&mut self, target: SentenceId) -> Result<()> {
        let state = {
            let doc = doc!(self);
            if doc.focus == target {
                return Ok(());
            }
            doc.tree[target].state_id()
        };
        tracing::debug!(%state, "moving focus");
        let response = self.coqtop.edit_at(state).await;
        self.pump_events();
        match response {
            Ok(response) => self.apply_edit_at(target, response),
            Err(CoqError::Fail(fail)) => Err(self.recover_from_fail(fail, None).await),
            Err(err) => Err(transport_error(err)),
        }
    }

    /// Cancel an invalidated sentence (and with it all its descendants) by
    /// editing at its parent.
    async fn cancel_sentence(&mut self, id: SentenceId) -> Result<()> {
        let parent = {
            let doc = doc!(self);
            doc.tree[id].parent()
        };
        let Some(parent) = parent else {
            return Err(self.inconsistent("cannot cancel the root sentence".to_owned()));
        };
        let state = {
            let doc = doc!(self);
            tracing::debug!(cancelled = %doc.tree[id].state_id(), "cancelling invalidated sentence");
            doc.tree[parent].state_id()
        };
        let response = self.coqtop.edit_at(state).await;
        self.pump_events();
        match response {
            Ok(response) => self.apply_edit_at(parent, response),
            Err(CoqError::Fail(fail)) => Err(self.recover_from_fail(fail, None).await),
            Err(err) => Err(transport_error(err)),
        }
    }

    /// Mirror an edit-at response into the tree.
    fn apply_edit_at(&mut self, target: SentenceId, response: EditAtResponse) -> Result<()> {
        match response.new_focus {
            None => self.rewind_to(target),
            // Jumping inside an open proof: the prover keeps the closing stack
            // from the qed sentence onwards; only the sentences strictly
            // between target and qed are gone.
            Some(NewFocus { qed_state_id }) => {
                let qed = {
                    let doc = doc!(self);
                    doc.tree.lookup(qed_state_id)
                };
                let Some(qed) = qed else {
                    return Err(self.inconsistent(format!(
                        "qed state {qed_state_id} is not a live sentence"
                    )));
                };
                let removed = {
                    let doc = doc!(self);
                    doc.tree.remove_between(target, qed)
                };
                let Some(removed) = removed else {
                    return Err(self.inconsistent(format!(
                        "qed state {qed_state_id} is not beyond the new focus"
                    )));
                };
                let doc = doc!(self);
                doc.focus = target;
                tracing::debug!(removed = removed.len(), "focused inside an open proof");
                for sentence in &removed {
                    self.client.clear_sentence(sentence.range());
                }
                Ok(())
            }
        }
    }

    /// Truncate everything past `target` and make it both focus and last.
    fn rewind_to(&mut self, target: SentenceId) -> Result<()> {
        let doc = doc!(self);
        let removed = doc.tree.truncate(target);
        doc.focus = target;
        doc.last = target;
        tracing::debug!(
            state = %doc.tree[target].state_id(),
            removed = removed.len(),
            "rewound"
        );
        for sentence in &removed {
            self.client.clear_sentence(sentence.range());
        }
        Ok(())
    }

    /// Recover from a prover `Fail`: edit-at the fallback state when one is
    /// named, rewind to it, and translate the error span into document
    /// coordinates against the submitted text.
    async fn recover_from_fail(
        &mut self,
        fail: Fail,
        submitted: Option<(&str, Range)>,
    ) -> StmError {
        let range = match (fail.span, submitted) {
            (Some(span), Some((text, range))) => span_to_range(range.start(), text, span),
            (None, Some((_, range))) => range,
            (_, None) => Range::default(),
        };
        if let Some(state) = fail.state_id {
            if let Err(err) = self.rewind_to_state(state).await {
                return err;
            }
        }
        StmError::Fail(FailValue { message: fail.message, range })
    }

    /// Edit-at `state` and rewind the client model to it. A fallback edit-at
    /// failing as well is logged and the client-side rewind still happens, so
    /// the model never runs ahead of the prover.
    async fn rewind_to_state(&mut self, state: StateId) -> Result<()> {
        let target = {
            let doc = doc!(self);
            doc.tree.lookup(state)
        };
        let Some(target) = target else {
            return Err(self.inconsistent(format!("prover named unknown fallback state {state}")));
        };
        let response = self.coqtop.edit_at(state).await;
        self.pump_events();
        match response {
            Ok(response) => self.apply_edit_at(target, response),
            Err(err) => {
                tracing::error!(%state, error = %err, "fallback edit-at failed; rewinding client side");
                self.apply_edit_at(target, EditAtResponse::default())
            }
        }
    }

    /// Re-apply buffered feedback now that an add has made new ids known.
    fn drain_feedback(&mut self) {
        let Phase::Running(doc) = &mut self.phase else { return };
        for record in doc.buffer.drain() {
            match doc.tree.lookup(record.state_id) {
                Some(id) => {
                    doc.tree[id].set_status(record.status);
                    let range = doc.tree[id].range();
                    self.client.sentence_status(range, record.status);
                }
                None => tracing::debug!(
                    state_id = %record.state_id,
                    "dropping buffered feedback for a state that never appeared"
                ),
            }
        }
    }

    /// An internal invariant broke: notify the editor, dispose, and produce
    /// the error to raise.
    fn inconsistent(&mut self, message: String) -> StmError {
        let message = format!("Inconsistent state: {message}");
        tracing::error!(%message);
        self.client.coq_died(Some(&message));
        self.phase = Phase::Disposed;
        StmError::Inconsistent(message)
    }
}

fn span_to_range(anchor: Point, text: &str, span: Span) -> Range {
    let start = position_at_relative(anchor, text, span.start);
    let end = position_at_relative(anchor, text, span.stop);
    Range::new(start, end.max(start))
}

fn transport_error(err: CoqError) -> StmError {
    match err {
        CoqError::Interrupted => StmError::Interrupted,
        CoqError::Fail(fail) => {
            StmError::Fail(FailValue { message: fail.message, range: Range::default() })
        }
        CoqError::Closed => StmError::Backend(anyhow::anyhow!("prover transport closed")),
        CoqError::Other(err) => StmError::Backend(err),
    }
}
