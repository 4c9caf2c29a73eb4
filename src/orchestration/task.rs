//! # Task Run Loop
//!
//! Drives one expression from its current snapshot to a single scalar.
//!
//! ## Overview
//!
//! Every wave the reducer collapses the eligible triples into calculations. Each calculation
//! becomes an [`AtomicOperation`] on the worker pool, and results are folded back in the
//! order they arrive. After every completed operation the task persists:
//!
//! - a liveness ping
//! - an audit record of the full expression before and after the result landed
//! - the rendered snapshot as the new `last_step`
//!
//! Then it emits a progress event. None of these writes is fatal: a lost write only means one
//! wave may be redone when the task is resumed from an older snapshot.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::constants::TIMESTAMP_FORMAT;
use crate::database::TaskStore;
use crate::error::{CalcflowError, Result};
use crate::events::TaskProgress;
use crate::execution::{AtomicOperation, WaveJoin, WorkerPool};
use crate::expression::ExpressionReducer;
use crate::logging::{log_error, log_task_operation};
use crate::models::{NewAuditRecord, TaskRecord};
use crate::state_machine::{next_task_state, TaskEvent, TaskState};

/// One task's run loop and the reducer it owns
pub struct CalcTask {
    task_id: i64,
    user_id: i64,
    status: TaskState,
    reducer: ExpressionReducer,
    pool: WorkerPool,
    store: Arc<dyn TaskStore>,
    progress: mpsc::UnboundedSender<TaskProgress>,
}

impl std::fmt::Debug for CalcTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalcTask")
            .field("task_id", &self.task_id)
            .field("user_id", &self.user_id)
            .field("status", &self.status)
            .field("snapshot", &self.reducer.render())
            .finish()
    }
}

impl CalcTask {
    /// Build the run loop for a stored task.
    ///
    /// The reducer starts from the task's `last_step`, so a fresh task and a resumed one are
    /// constructed the same way and work already folded into the snapshot is never redone.
    pub fn from_record(
        record: &TaskRecord,
        pool: WorkerPool,
        store: Arc<dyn TaskStore>,
        progress: mpsc::UnboundedSender<TaskProgress>,
    ) -> Result<Self> {
        let reducer = ExpressionReducer::new(record.resume_point())?;
        Ok(Self::with_reducer(record, reducer, pool, store, progress))
    }

    /// Build the run loop around a reducer the caller already parsed from the record
    pub fn with_reducer(
        record: &TaskRecord,
        reducer: ExpressionReducer,
        pool: WorkerPool,
        store: Arc<dyn TaskStore>,
        progress: mpsc::UnboundedSender<TaskProgress>,
    ) -> Self {
        Self {
            task_id: record.id,
            user_id: record.user_id,
            status: record.status,
            reducer,
            pool,
            store,
            progress,
        }
    }

    /// Run waves until the reducer is done, then mark the task completed.
    ///
    /// Returns the final scalar. On error the task stays `processing` in the store.
    pub async fn run(mut self) -> Result<String> {
        log_task_operation(
            "run",
            Some(self.task_id),
            Some(self.user_id),
            self.status.as_str(),
            Some(self.reducer.render().as_str()),
        );
        while !self.reducer.is_done() {
            if let Err(e) = self.run_wave().await {
                log_error("task", "run_wave", &e.to_string(), Some(self.reducer.render().as_str()));
                return Err(e);
            }
        }
        self.finish().await
    }

    async fn run_wave(&mut self) -> Result<()> {
        let produced = self.reducer.reduce_wave()?;
        let join = WaveJoin::new();
        let operations: Vec<_> = self
            .reducer
            .calculations()
            .filter_map(|symbol| AtomicOperation::for_symbol(self.task_id, symbol, &join))
            .collect();
        debug!(
            task_id = self.task_id,
            produced,
            expression = %self.reducer.render(),
            "dispatching wave"
        );

        let mut pending = FuturesUnordered::new();
        for (operation, receiver) in operations {
            let symbol_id = operation.symbol_id;
            self.pool.submit(operation)?;
            pending.push(async move { (symbol_id, receiver.await) });
        }

        let mut before = self.reducer.render();
        let mut failure = None;
        while let Some((symbol_id, received)) = pending.next().await {
            let outcome = received.map_err(|_| {
                CalcflowError::Internal("worker pool stopped before the operation finished".into())
            })?;
            match outcome {
                Ok(value) => {
                    self.reducer.apply_result(symbol_id, value)?;
                    let after = self.reducer.render();
                    self.record_completion(&before, &after).await;
                    before = after;
                }
                Err(e) => {
                    warn!(task_id = self.task_id, symbol_id, error = %e, "operation failed");
                    failure.get_or_insert(e);
                }
            }
        }
        join.wait().await;

        if let Some(e) = failure {
            return Err(e.into());
        }
        self.reducer.advance()?;
        Ok(())
    }

    async fn record_completion(&self, before: &str, after: &str) {
        let now = now();
        if let Err(e) = self.store.update_ping(self.task_id, now).await {
            warn!(task_id = self.task_id, error = %e, "failed to persist ping");
        }
        let audit = NewAuditRecord {
            task_id: self.task_id,
            before: before.to_string(),
            after: after.to_string(),
        };
        if let Err(e) = self.store.append_audit_record(audit, now).await {
            warn!(task_id = self.task_id, error = %e, "failed to persist audit record");
        }
        if let Err(e) = self.store.update_last_step(self.task_id, after).await {
            warn!(task_id = self.task_id, error = %e, "failed to persist last step");
        }
        self.emit(now, None);
    }

    async fn finish(mut self) -> Result<String> {
        let result = self
            .reducer
            .result()
            .map(str::to_string)
            .ok_or_else(|| CalcflowError::InvariantViolation("reducer finished without a result".into()))?;

        if !self.status.is_terminal() {
            self.status = next_task_state(self.status, TaskEvent::Complete)?;
        }
        if let Err(e) = self.store.set_result(self.task_id, &result).await {
            warn!(task_id = self.task_id, error = %e, "failed to persist result");
        }
        if let Err(e) = self.store.set_status(self.task_id, self.status).await {
            warn!(task_id = self.task_id, error = %e, "failed to persist completed status");
        }
        self.emit(now(), Some(result.clone()));

        log_task_operation(
            "finish",
            Some(self.task_id),
            Some(self.user_id),
            self.status.as_str(),
            Some(result.as_str()),
        );
        Ok(result)
    }

    fn emit(&self, at: NaiveDateTime, result: Option<String>) {
        let progress = TaskProgress {
            user_id: self.user_id,
            task_id: self.task_id,
            last_ping: at.format(TIMESTAMP_FORMAT).to_string(),
            is_done: result.is_some(),
            result,
        };
        if self.progress.send(progress).is_err() {
            debug!(task_id = self.task_id, "progress relay is gone");
        }
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
