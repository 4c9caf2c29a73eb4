//! Shared helpers for the integration tests.

#![allow(dead_code)]

pub mod strategies;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use calcflow_core::config::CalcflowConfig;
use calcflow_core::database::{InMemoryTaskStore, StoreError, StoreResult, TaskStore};
use calcflow_core::events::EventPublisher;
use calcflow_core::expression::Operator;
use calcflow_core::models::{AuditRecord, NewAuditRecord, NewTask, TaskRecord, User};
use calcflow_core::state_machine::TaskState;
use calcflow_core::Calculator;

/// Configuration with millisecond delay units and zero seeded delays
pub fn fast_config() -> CalcflowConfig {
    let mut config = CalcflowConfig::default();
    config.workers.delay_unit_ms = 1;
    config.delays.default_seconds = 0;
    config
}

pub struct TestCalculator {
    pub calculator: Calculator,
    pub store: Arc<InMemoryTaskStore>,
    pub events: EventPublisher,
}

pub async fn calculator_with(config: &CalcflowConfig) -> TestCalculator {
    let store = Arc::new(InMemoryTaskStore::new());
    let events = EventPublisher::new(1024);
    let calculator = Calculator::new(config, store.clone(), Arc::new(events.clone()))
        .await
        .expect("calculator starts");
    TestCalculator {
        calculator,
        store,
        events,
    }
}

/// Poll the store until the task is completed or the timeout elapses
pub async fn wait_for_completion(
    store: &dyn TaskStore,
    task_id: i64,
    user_id: i64,
    timeout: Duration,
) -> TaskRecord {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let task = store
            .get_task(task_id, user_id)
            .await
            .expect("task exists");
        if task.status == TaskState::Completed {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {task_id} did not complete in time (last step {})",
            task.last_step
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Store wrapper whose incremental writes can be made to fail
pub struct FlakyStore {
    inner: InMemoryTaskStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryTaskStore::new(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_incremental_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("disk full".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for FlakyStore {
    async fn create_user(&self, name: &str, is_admin: bool) -> StoreResult<User> {
        self.inner.create_user(name, is_admin).await
    }

    async fn get_user(&self, user_id: i64) -> StoreResult<User> {
        self.inner.get_user(user_id).await
    }

    async fn create_task(&self, task: NewTask, created: NaiveDateTime) -> StoreResult<TaskRecord> {
        self.inner.create_task(task, created).await
    }

    async fn append_audit_record(
        &self,
        record: NewAuditRecord,
        at: NaiveDateTime,
    ) -> StoreResult<AuditRecord> {
        self.check()?;
        self.inner.append_audit_record(record, at).await
    }

    async fn update_last_step(&self, task_id: i64, last_step: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.update_last_step(task_id, last_step).await
    }

    async fn update_ping(&self, task_id: i64, at: NaiveDateTime) -> StoreResult<()> {
        self.check()?;
        self.inner.update_ping(task_id, at).await
    }

    async fn set_result(&self, task_id: i64, result: &str) -> StoreResult<()> {
        self.inner.set_result(task_id, result).await
    }

    async fn set_status(&self, task_id: i64, status: TaskState) -> StoreResult<()> {
        self.inner.set_status(task_id, status).await
    }

    async fn list_tasks_by_user(&self, user_id: i64) -> StoreResult<Vec<TaskRecord>> {
        self.inner.list_tasks_by_user(user_id).await
    }

    async fn get_task(&self, task_id: i64, user_id: i64) -> StoreResult<TaskRecord> {
        self.inner.get_task(task_id, user_id).await
    }

    async fn list_audit_records(&self, task_id: i64) -> StoreResult<Vec<AuditRecord>> {
        self.inner.list_audit_records(task_id).await
    }

    async fn list_processing_tasks(&self) -> StoreResult<Vec<TaskRecord>> {
        self.inner.list_processing_tasks().await
    }

    async fn get_delays(&self) -> StoreResult<HashMap<Operator, u64>> {
        self.inner.get_delays().await
    }

    async fn set_delays(&self, delays: &HashMap<Operator, u64>) -> StoreResult<()> {
        self.inner.set_delays(delays).await
    }
}
