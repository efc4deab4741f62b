use std::error::Error as StdError;
use std::fmt;

use futures_core::future::BoxFuture;
use qed_core::{Goals, Status};

/// Identifier the prover assigns to each accepted sentence.
/// Stable until the sentence is cancelled.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(u64);

impl StateId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// A char span relative to the text of a single submitted sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub stop: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddResponse {
    pub state_id: StateId,
    /// Set when the command closed a proof and the prover's tip jumped back to
    /// a pre-existing sentence instead of the new one.
    pub unfocused_state_id: Option<StateId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditAtResponse {
    /// Present when the edit jumped inside an open proof: the prover keeps the
    /// closing sentences from `qed_state_id` onwards valid.
    pub new_focus: Option<NewFocus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewFocus {
    pub qed_state_id: StateId,
}

/// A request the prover rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fail {
    /// The state to rewind to before retrying, when the prover names one.
    pub state_id: Option<StateId>,
    pub message: String,
    /// Error location within the submitted text.
    pub span: Option<Span>,
}

#[derive(Debug)]
pub enum CoqError {
    /// The prover rejected the request.
    Fail(Fail),
    /// The request was aborted by an interrupt.
    Interrupted,
    /// The transport is gone.
    Closed,
    Other(anyhow::Error),
}

impl fmt::Display for CoqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoqError::Fail(fail) => write!(f, "prover rejected request: {}", fail.message),
            CoqError::Interrupted => write!(f, "request interrupted"),
            CoqError::Closed => write!(f, "prover transport closed"),
            CoqError::Other(err) => write!(f, "{err}"),
        }
    }
}

impl StdError for CoqError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CoqError::Other(err) => err.source(),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for CoqError {
    fn from(err: anyhow::Error) -> Self {
        CoqError::Other(err)
    }
}

pub type ResponseFuture<T> = BoxFuture<'static, Result<T, CoqError>>;

/// An abstraction of the prover's request/response surface.
/// Asynchronous feedback is pushed separately as [`BackendEvent`]s.
pub trait CoqTop: Send {
    /// Reset the prover. Returns the root state every sentence descends from.
    fn reset(&mut self) -> ResponseFuture<StateId>;

    /// Submit one sentence on top of `parent`, stamped with the editor's
    /// document `version`.
    fn add(
        &mut self,
        text: String,
        version: u32,
        parent: StateId,
        verbose: bool,
    ) -> ResponseFuture<AddResponse>;

    /// Move the prover's tip to an earlier state, cancelling later work.
    fn edit_at(&mut self, state: StateId) -> ResponseFuture<EditAtResponse>;

    /// The current goal structure, or `None` when no proof is open.
    fn goal(&mut self) -> ResponseFuture<Option<Goals>>;

    /// Run a read-only query in the context of `state`.
    fn query(&mut self, text: String, state: StateId) -> ResponseFuture<String>;

    /// Ask the prover to abort whatever it is doing.
    fn interrupt(&mut self) -> ResponseFuture<()>;

    fn quit(&mut self) -> ResponseFuture<()>;

    /// Tell the prover how wide the editor renders its output.
    fn resize_window(&mut self, cols: u16) -> Result<(), CoqError>;

    /// Request tactic profiling results for one state, or globally.
    /// Results arrive as [`Feedback::LtacProf`] events.
    fn ltac_profiling(&mut self, state: Option<StateId>) -> ResponseFuture<()>;
}

/// Severity of a prover message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
}

/// Aggregated tactic timings produced by the prover's profiler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LtacProfResults {
    pub total_time: f64,
    pub tactics: Vec<LtacProfEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LtacProfEntry {
    pub name: String,
    pub total: f64,
    pub self_time: f64,
    pub calls: u64,
    pub max_total: f64,
    pub children: Vec<LtacProfEntry>,
}

/// Feedback routing identifier; queries run on non-default routes.
pub type RouteId = u32;

/// One asynchronous feedback message, keyed by the state it concerns.
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    StateStatus { state_id: StateId, route: RouteId, status: Status, worker: Option<String> },
    StateError { state_id: StateId, route: RouteId, message: String, span: Option<Span> },
    Message { level: MessageLevel, text: String },
    LtacProf { state_id: StateId, route: RouteId, results: LtacProfResults },
    WorkerStatus { id: String, status: String },
    FileDependency { file: String, dependency: String },
    FileLoaded { module: String, file: String },
    EditFeedback { edit_id: u64, error: Option<String> },
}

/// Everything the transport pushes at the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Feedback(Feedback),
    /// The transport shut down; a payload means it died abnormally.
    Closed(Option<String>),
}
