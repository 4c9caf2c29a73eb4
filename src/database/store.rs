//! Persistence contract used by task run loops and the orchestrator.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::StoreResult;
use crate::expression::Operator;
use crate::models::{AuditRecord, NewAuditRecord, NewTask, TaskRecord, User};
use crate::state_machine::TaskState;

/// Durable storage for users, tasks, audit records and delays.
///
/// Writes made by a task run loop are independent of each other: any one of them may fail
/// without invalidating the others.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_user(&self, name: &str, is_admin: bool) -> StoreResult<User>;

    async fn get_user(&self, user_id: i64) -> StoreResult<User>;

    /// Insert a task in `processing` with `last_step` set to the expression.
    /// Fails with `UserNotFound` when the owner does not exist.
    async fn create_task(&self, task: NewTask, created: NaiveDateTime) -> StoreResult<TaskRecord>;

    async fn append_audit_record(
        &self,
        record: NewAuditRecord,
        at: NaiveDateTime,
    ) -> StoreResult<AuditRecord>;

    async fn update_last_step(&self, task_id: i64, last_step: &str) -> StoreResult<()>;

    async fn update_ping(&self, task_id: i64, at: NaiveDateTime) -> StoreResult<()>;

    async fn set_result(&self, task_id: i64, result: &str) -> StoreResult<()>;

    async fn set_status(&self, task_id: i64, status: TaskState) -> StoreResult<()>;

    /// Tasks owned by `user_id`, in creation order
    async fn list_tasks_by_user(&self, user_id: i64) -> StoreResult<Vec<TaskRecord>>;

    /// Fails with `TaskNotFound` unless the task exists and belongs to `user_id`
    async fn get_task(&self, task_id: i64, user_id: i64) -> StoreResult<TaskRecord>;

    /// Audit trail of one task, oldest first
    async fn list_audit_records(&self, task_id: i64) -> StoreResult<Vec<AuditRecord>>;

    async fn list_processing_tasks(&self) -> StoreResult<Vec<TaskRecord>>;

    async fn get_delays(&self) -> StoreResult<HashMap<Operator, u64>>;

    /// Upsert the given operators, leaving the others untouched
    async fn set_delays(&self, delays: &HashMap<Operator, u64>) -> StoreResult<()>;

    /// Give every operator without a stored delay the default, then return the full table
    async fn seed_delays(&self, default_delay: u64) -> StoreResult<HashMap<Operator, u64>> {
        let mut delays = self.get_delays().await?;
        let missing: HashMap<Operator, u64> = Operator::ALL
            .iter()
            .filter(|op| !delays.contains_key(*op))
            .map(|op| (*op, default_delay))
            .collect();
        if !missing.is_empty() {
            self.set_delays(&missing).await?;
            delays.extend(missing);
        }
        Ok(delays)
    }
}
