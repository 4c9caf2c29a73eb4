//! Transition tables for task and worker state.

use thiserror::Error;

use super::events::{TaskEvent, WorkerEvent};
use super::states::{TaskState, WorkerState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid transition from {from} on event {event}")]
pub struct StateTransitionError {
    pub from: String,
    pub event: String,
}

/// Resolve the state a task moves to on `event`
pub fn next_task_state(
    current: TaskState,
    event: TaskEvent,
) -> Result<TaskState, StateTransitionError> {
    match (current, event) {
        (TaskState::Processing, TaskEvent::Complete) => Ok(TaskState::Completed),
        (from, event) => Err(StateTransitionError {
            from: from.to_string(),
            event: event.event_type().to_string(),
        }),
    }
}

/// Resolve the state a worker slot moves to on `event`
pub fn next_worker_state(
    current: WorkerState,
    event: WorkerEvent,
) -> Result<WorkerState, StateTransitionError> {
    match (current, event) {
        (WorkerState::Idle, WorkerEvent::Dequeue) => Ok(WorkerState::Busy),
        (WorkerState::Busy, WorkerEvent::Finish) => Ok(WorkerState::Idle),
        (from, event) => Err(StateTransitionError {
            from: from.to_string(),
            event: event.event_type().to_string(),
        }),
    }
}
