
mod edits;
mod failure;
mod feedback;

use std::sync::{Arc, Mutex};

use qed::{BackendEvent, Command, Range, StateId, StateMachine, TextChange};
use tokio::sync::mpsc::UnboundedSender;

pub use self::fake::{Call, Callback, FakeCoqTop, FakeState, RecordingClient, ScriptSource};

pub struct Setup {
    pub stm: StateMachine,
    pub prover: Arc<Mutex<FakeState>>,
    pub callbacks: Arc<Mutex<Vec<Callback>>>,
    pub events: UnboundedSender<BackendEvent>,
}

/// A machine wired to a scripted prover and a recording editor client.
pub fn setup() -> Setup {
    let (coqtop, prover) = FakeCoqTop::new();
    let callbacks = Arc::new(Mutex::new(Vec::new()));
    let (events, rx) = tokio::sync::mpsc::unbounded_channel();
    let stm =
        StateMachine::new(Box::new(coqtop), Box::new(RecordingClient(Arc::clone(&callbacks))), rx);
    Setup { stm, prover, callbacks, events }
}

pub fn range(s: &str) -> Range {
    s.parse().unwrap()
}

pub fn cmd(text: &str, r: &str) -> Command {
    Command::new(text, range(r))
}

pub fn change(r: &str, text: &'static str) -> TextChange {
    TextChange::new(range(r), text)
}

pub fn state(raw: u64) -> StateId {
    StateId::new(raw)
}
