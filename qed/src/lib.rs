//! The sentence transactional machine: the state model sitting between an
//! interactive proof-script editor and a background prover process.
//!
//! The machine keeps an ordered tree of accepted sentences consistent with a
//! live document, drives the prover over its asynchronous protocol one request
//! at a time, reconciles document edits against accepted work, and rewinds
//! coherently when the prover reports errors.

mod client;
mod command;
mod coqtop;
mod feedback;
mod sentence;
mod stm;
mod tree;

pub use qed_core::{
    position_at_relative, to_range_delta, Goal, Goals, Point, ProofView, Range, RangeDelta,
    Status, TextChange,
};

pub use self::client::CoqClient;
pub use self::command::{Command, CommandSource};
pub use self::coqtop::{
    AddResponse, BackendEvent, CoqError, CoqTop, EditAtResponse, Fail, Feedback, LtacProfEntry,
    LtacProfResults, MessageLevel, NewFocus, ResponseFuture, RouteId, Span, StateId,
};
pub use self::sentence::SentenceError;
pub use self::stm::{FailValue, StateMachine, StmError};

pub type Result<T, E = StmError> = std::result::Result<T, E>;
