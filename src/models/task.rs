//! # Task Model
//!
//! A task is one submitted expression and everything recorded while it is reduced.
//!
//! ## Persistence
//!
//! - `last_step` holds the most recently rendered snapshot. It is always a valid expression
//!   that evaluates to the same value as the submitted expression.
//! - `last_ping` is refreshed every time a calculation of the task completes.
//! - `result` is only set together with the `completed` status.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::AuditRecord;
use crate::state_machine::TaskState;

/// Stored row for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub user_id: i64,
    pub expression: String,
    pub status: TaskState,
    pub result: Option<String>,
    pub created: NaiveDateTime,
    pub last_ping: Option<NaiveDateTime>,
    pub last_step: String,
}

impl TaskRecord {
    /// Snapshot reduction should continue from; falls back to the submitted text
    pub fn resume_point(&self) -> &str {
        if self.last_step.is_empty() {
            &self.expression
        } else {
            &self.last_step
        }
    }
}

/// Fields needed to insert a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub user_id: i64,
    pub expression: String,
}

/// Immediate answer to a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionAck {
    pub id: i64,
    pub expression: String,
    pub status: TaskState,
}

/// A task together with its full audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetail {
    pub task: TaskRecord,
    pub audit: Vec<AuditRecord>,
}
