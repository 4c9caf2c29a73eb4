use serde::{Deserialize, Serialize};

/// Events that can trigger task state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEvent {
    /// The reducer reported a single remaining scalar
    Complete,
}

impl TaskEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
        }
    }
}

/// Events that move a worker slot between idle and busy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerEvent {
    /// An atomic operation was taken off the shared queue
    Dequeue,
    /// The operation's result was reported back to its task
    Finish,
}

impl WorkerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Dequeue => "dequeue",
            Self::Finish => "finish",
        }
    }
}
