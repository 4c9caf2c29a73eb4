//! # Calculator Orchestrator
//!
//! Entry point of the engine: accepts submissions, restarts interrupted tasks and answers
//! queries about tasks, workers and delays.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info, warn};

use super::task::CalcTask;
use crate::config::CalcflowConfig;
use crate::database::TaskStore;
use crate::error::{CalcflowError, Result};
use crate::events::{spawn_progress_relay, EventSink, TaskProgress};
use crate::execution::{parse_delay_updates, DelayTable, WorkerInfo, WorkerPool};
use crate::expression::{ExpressionReducer, Operator};
use crate::logging::log_task_operation;
use crate::models::{Actor, NewTask, SubmissionAck, TaskDetail, TaskRecord};
use crate::state_machine::TaskState;
use crate::validation::{normalize_expression, validate_expression, validate_snapshot};

type RunHandle = JoinHandle<Result<String>>;

pub struct Calculator {
    store: Arc<dyn TaskStore>,
    pool: WorkerPool,
    progress: Mutex<Option<mpsc::UnboundedSender<TaskProgress>>>,
    relay: Mutex<Option<JoinHandle<()>>>,
    runs: DashMap<i64, RunHandle>,
    awaited: DashMap<i64, AbortHandle>,
}

impl std::fmt::Debug for Calculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calculator")
            .field("pool", &self.pool)
            .field("active_runs", &self.runs.len())
            .finish()
    }
}

impl Calculator {
    /// Seed missing delays, start the worker pool and the progress relay.
    ///
    /// Interrupted tasks are not picked up here; call
    /// [`recover_interrupted`](Self::recover_interrupted) once the caller is ready.
    pub async fn new(
        config: &CalcflowConfig,
        store: Arc<dyn TaskStore>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let delays = store.seed_delays(config.delays.default_seconds).await?;
        let pool = WorkerPool::start(config.worker_pool(), DelayTable::new(delays), sink.clone());
        let (progress, relay) = spawn_progress_relay(sink);

        Ok(Self {
            store,
            pool,
            progress: Mutex::new(Some(progress)),
            relay: Mutex::new(Some(relay)),
            runs: DashMap::new(),
            awaited: DashMap::new(),
        })
    }

    /// Validate and store a new task, then start its run loop without waiting for it.
    ///
    /// Everything that can reject the expression runs before the task row is written.
    pub async fn submit(&self, user_id: i64, expression: &str) -> Result<SubmissionAck> {
        let expression = normalize_expression(expression);
        validate_expression(&expression)?;
        let reducer = ExpressionReducer::new(&expression)
            .map_err(|e| CalcflowError::Validation(format!("invalid expression: {e}")))?;
        let progress = self.progress_sender()?;

        let record = self
            .store
            .create_task(
                NewTask {
                    user_id,
                    expression: expression.clone(),
                },
                Utc::now().naive_utc(),
            )
            .await?;
        log_task_operation(
            "submit",
            Some(record.id),
            Some(user_id),
            record.status.as_str(),
            Some(expression.as_str()),
        );

        let task = CalcTask::with_reducer(
            &record,
            reducer,
            self.pool.clone(),
            self.store.clone(),
            progress,
        );
        self.track(record.id, task);
        Ok(SubmissionAck {
            id: record.id,
            expression,
            status: TaskState::Processing,
        })
    }

    /// Restart every task still marked `processing` from its last step.
    ///
    /// Returns the ids of the restarted tasks. A task whose snapshot fails validation or cannot
    /// be parsed is logged and skipped, so it never reaches the workers again.
    pub async fn recover_interrupted(&self) -> Result<Vec<i64>> {
        let interrupted = self.store.list_processing_tasks().await?;
        let mut resumed = Vec::with_capacity(interrupted.len());
        for record in interrupted {
            if self.runs.contains_key(&record.id) {
                continue;
            }
            match self.spawn_run(&record) {
                Ok(()) => resumed.push(record.id),
                Err(e) => {
                    error!(task_id = record.id, last_step = %record.last_step, error = %e, "cannot resume task")
                }
            }
        }
        info!(count = resumed.len(), "resumed interrupted tasks");
        Ok(resumed)
    }

    fn progress_sender(&self) -> Result<mpsc::UnboundedSender<TaskProgress>> {
        self.progress
            .lock()
            .clone()
            .ok_or_else(|| CalcflowError::Internal("calculator is shut down".into()))
    }

    fn spawn_run(&self, record: &TaskRecord) -> Result<()> {
        validate_snapshot(record.resume_point())?;
        let progress = self.progress_sender()?;
        let task = CalcTask::from_record(record, self.pool.clone(), self.store.clone(), progress)?;
        self.track(record.id, task);
        Ok(())
    }

    fn track(&self, task_id: i64, task: CalcTask) {
        self.runs.retain(|_, handle| !handle.is_finished());
        self.runs.insert(task_id, tokio::spawn(task.run()));
    }

    /// Wait for a run started by this calculator.
    ///
    /// Returns `None` when no run is tracked for `task_id`, e.g. because it was already
    /// awaited or it belongs to another process. The run stays abortable by
    /// [`shutdown`](Self::shutdown) while it is awaited here.
    pub async fn wait_for_task(&self, task_id: i64) -> Option<Result<String>> {
        let (_, handle) = self.runs.remove(&task_id)?;
        self.awaited.insert(task_id, handle.abort_handle());
        let outcome = handle.await;
        self.awaited.remove(&task_id);
        Some(outcome.unwrap_or_else(|e| {
            Err(CalcflowError::Internal(format!("task run {task_id} aborted: {e}")))
        }))
    }

    pub async fn list_tasks(&self, actor: &Actor) -> Result<Vec<TaskRecord>> {
        Ok(self.store.list_tasks_by_user(actor.user_id).await?)
    }

    /// One task of the actor together with its audit trail
    pub async fn get_task(&self, actor: &Actor, task_id: i64) -> Result<TaskDetail> {
        let task = self.store.get_task(task_id, actor.user_id).await?;
        let audit = self.store.list_audit_records(task_id).await?;
        Ok(TaskDetail { task, audit })
    }

    pub fn worker_statuses(&self, actor: &Actor) -> Result<Vec<WorkerInfo>> {
        require_admin(actor, "worker status")?;
        Ok(self.pool.workers())
    }

    pub async fn remove_worker(&self, actor: &Actor, worker_id: usize) -> Result<()> {
        require_admin(actor, "worker removal")?;
        self.pool.remove_worker(worker_id).await?;
        Ok(())
    }

    pub fn delays(&self, actor: &Actor) -> Result<BTreeMap<Operator, u64>> {
        require_admin(actor, "delay configuration")?;
        Ok(self.pool.delays().snapshot())
    }

    /// Persist new delays, then make them visible to workers.
    ///
    /// Operations already dequeued keep the delay they started with.
    pub async fn update_delays(
        &self,
        actor: &Actor,
        updates: &HashMap<String, i64>,
    ) -> Result<BTreeMap<Operator, u64>> {
        require_admin(actor, "delay configuration")?;
        let updates = parse_delay_updates(updates)?;
        self.store.set_delays(&updates).await?;
        self.pool.delays().apply(&updates);
        info!(user_id = actor.user_id, ?updates, "delays updated");
        Ok(self.pool.delays().snapshot())
    }

    /// Stop accepting work, abort running tasks and stop the pool.
    ///
    /// Aborted tasks stay `processing` in the store and are picked up by the next
    /// [`recover_interrupted`](Self::recover_interrupted).
    pub async fn shutdown(&self) {
        self.progress.lock().take();
        for entry in self.awaited.iter() {
            entry.value().abort();
        }
        let runs: Vec<i64> = self.runs.iter().map(|entry| *entry.key()).collect();
        for task_id in runs {
            if let Some((_, handle)) = self.runs.remove(&task_id) {
                handle.abort();
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        warn!(task_id, error = %e, "task run ended abnormally");
                    }
                }
            }
        }
        self.pool.shutdown().await;

        let relay = self.relay.lock().take();
        if let Some(relay) = relay {
            if let Err(e) = relay.await {
                warn!(error = %e, "progress relay ended abnormally");
            }
        }
        info!("calculator shut down");
    }
}

fn require_admin(actor: &Actor, what: &str) -> Result<()> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(CalcflowError::PermissionDenied(format!(
            "{what} requires an administrator"
        )))
    }
}
