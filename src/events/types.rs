//! Events emitted by the engine and the sink they are delivered to.

use serde::{Deserialize, Serialize};

use crate::constants::events::{TASK_PROGRESS, WORKER_STATUS};
use crate::state_machine::WorkerState;

/// Progress of one task, delivered to its owner only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub user_id: i64,
    pub task_id: i64,
    pub last_ping: String,
    pub is_done: bool,
    pub result: Option<String>,
}

/// Status change of one worker slot, broadcast to privileged observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatusUpdate {
    pub worker_id: usize,
    pub state: WorkerState,
    pub current_expression: String,
    pub task_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum CalcEvent {
    TaskProgress(TaskProgress),
    WorkerStatus(WorkerStatusUpdate),
}

/// Who an event may be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAudience {
    User(i64),
    Admins,
}

impl CalcEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskProgress(_) => TASK_PROGRESS,
            Self::WorkerStatus(_) => WORKER_STATUS,
        }
    }

    pub fn audience(&self) -> EventAudience {
        match self {
            Self::TaskProgress(progress) => EventAudience::User(progress.user_id),
            Self::WorkerStatus(_) => EventAudience::Admins,
        }
    }
}

/// Destination for engine events.
///
/// Delivery is best-effort: `publish` must return promptly and never block the caller,
/// whether or not anybody is listening.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: CalcEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_progress_is_addressed_to_its_owner() {
        let event = CalcEvent::TaskProgress(TaskProgress {
            user_id: 3,
            task_id: 9,
            last_ping: "2024-01-01 00:00:00".into(),
            is_done: false,
            result: None,
        });
        assert_eq!(event.audience(), EventAudience::User(3));
        assert_eq!(event.name(), "update task");
    }

    #[test]
    fn worker_status_serializes_for_the_wire() {
        let event = CalcEvent::WorkerStatus(WorkerStatusUpdate {
            worker_id: 2,
            state: WorkerState::Busy,
            current_expression: "2*3".into(),
            task_id: Some(5),
        });
        assert_eq!(event.audience(), EventAudience::Admins);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "worker_status",
                "message": {
                    "workerId": 2,
                    "state": "busy",
                    "currentExpression": "2*3",
                    "taskId": 5
                }
            })
        );
    }
}
