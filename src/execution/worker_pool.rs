//! Worker Pool for atomic arithmetic operations
//!
//! A bounded set of execution slots racing on one shared queue. Each slot takes one
//! operation at a time, sleeps for the operator's configured delay, evaluates it and reports
//! the result on the operation's completion channel.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::delay_table::DelayTable;
use super::operation::AtomicOperation;
use crate::constants::delays::DEFAULT_DELAY_UNIT_MS;
use crate::constants::pool::{DEFAULT_WORKER_COUNT, MIN_WORKERS};
use crate::events::{CalcEvent, EventSink, WorkerStatusUpdate};
use crate::logging::log_worker_operation;
use crate::state_machine::{next_worker_state, WorkerEvent, WorkerState};

/// Pool configuration
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Slots spawned at startup; coerced up to the liveness floor
    pub initial_size: usize,
    /// Wall-clock length of one delay unit
    pub delay_unit_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            initial_size: DEFAULT_WORKER_COUNT,
            delay_unit_ms: DEFAULT_DELAY_UNIT_MS,
        }
    }
}

/// Public snapshot of one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: usize,
    pub status: WorkerState,
    /// Expression being processed, empty when idle
    pub expression: String,
    pub task_id: Option<i64>,
}

impl WorkerInfo {
    fn idle(id: usize) -> Self {
        Self {
            id,
            status: WorkerState::Idle,
            expression: String::new(),
            task_id: None,
        }
    }

    fn to_event(&self) -> CalcEvent {
        CalcEvent::WorkerStatus(WorkerStatusUpdate {
            worker_id: self.id,
            state: self.status,
            current_expression: self.expression.clone(),
            task_id: self.task_id,
        })
    }
}

struct WorkerSlot {
    info: WorkerInfo,
    kill: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

type OperationQueue = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<AtomicOperation>>>;

/// Everything a running slot needs, shared by all slots of the pool
#[derive(Clone)]
struct WorkerContext {
    workers: Arc<Mutex<Vec<WorkerSlot>>>,
    queue: OperationQueue,
    requeue: mpsc::UnboundedSender<AtomicOperation>,
    delays: DelayTable,
    sink: Arc<dyn EventSink>,
    delay_unit_ms: u64,
}

/// Bounded pool of simulated workers.
///
/// Cloning is cheap and every clone drives the same slots. Slots keep running until
/// [`remove_worker`](Self::remove_worker) or [`shutdown`](Self::shutdown) stops them.
#[derive(Clone)]
pub struct WorkerPool {
    context: WorkerContext,
    sender: mpsc::UnboundedSender<AtomicOperation>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size())
            .field("delay_unit_ms", &self.context.delay_unit_ms)
            .finish()
    }
}

impl WorkerPool {
    /// Spawn the initial slots. Must be called from within a tokio runtime.
    pub fn start(config: WorkerPoolConfig, delays: DelayTable, sink: Arc<dyn EventSink>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let context = WorkerContext {
            workers: Arc::new(Mutex::new(Vec::new())),
            queue: Arc::new(tokio::sync::Mutex::new(receiver)),
            requeue: sender.clone(),
            delays,
            sink,
            delay_unit_ms: config.delay_unit_ms,
        };

        let size = config.initial_size.max(MIN_WORKERS);
        if size != config.initial_size {
            warn!(
                requested = config.initial_size,
                size, "worker pool size raised to the liveness floor"
            );
        }
        {
            let mut workers = context.workers.lock();
            for id in 1..=size {
                workers.push(spawn_slot(id, &context));
            }
        }
        info!(size, delay_unit_ms = config.delay_unit_ms, "worker pool started");

        Self { context, sender }
    }

    /// Hand an operation to whichever slot dequeues it first
    pub fn submit(&self, operation: AtomicOperation) -> Result<(), WorkerPoolError> {
        self.sender
            .send(operation)
            .map_err(|_| WorkerPoolError::QueueClosed)
    }

    pub fn delays(&self) -> &DelayTable {
        &self.context.delays
    }

    pub fn size(&self) -> usize {
        self.context.workers.lock().len()
    }

    /// Snapshot of every slot, ordered by id
    pub fn workers(&self) -> Vec<WorkerInfo> {
        let mut infos: Vec<WorkerInfo> = self
            .context
            .workers
            .lock()
            .iter()
            .map(|slot| slot.info.clone())
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Remove one slot.
    ///
    /// A busy slot puts its in-flight operation back on the queue before exiting. If fewer
    /// than two slots would remain, a replacement with a fresh id is spawned. Returns once the
    /// removed slot has stopped.
    pub async fn remove_worker(&self, worker_id: usize) -> Result<(), WorkerPoolError> {
        let (mut removed, replacement) = {
            let mut workers = self.context.workers.lock();
            let position = workers
                .iter()
                .position(|slot| slot.info.id == worker_id)
                .ok_or(WorkerPoolError::WorkerNotFound { worker_id })?;
            let removed = workers.remove(position);

            let mut replacement = None;
            if workers.len() < MIN_WORKERS {
                let fresh_id = workers
                    .iter()
                    .map(|slot| slot.info.id)
                    .chain(std::iter::once(worker_id))
                    .max()
                    .unwrap_or(worker_id)
                    + 1;
                workers.push(spawn_slot(fresh_id, &self.context));
                replacement = Some(fresh_id);
            }
            (removed, replacement)
        };

        stop_slot(&mut removed).await;
        log_worker_operation("remove", worker_id, None, "removed", None);
        if let Some(fresh_id) = replacement {
            info!(
                removed = worker_id,
                replacement = fresh_id,
                "spawned replacement worker to keep the liveness floor"
            );
        }
        Ok(())
    }

    /// Stop every slot. In-flight operations are returned to the queue.
    pub async fn shutdown(&self) {
        let mut slots: Vec<WorkerSlot> = std::mem::take(&mut *self.context.workers.lock());
        for slot in &mut slots {
            signal_stop(slot);
        }
        for slot in &mut slots {
            stop_slot(slot).await;
        }
        info!(stopped = slots.len(), "worker pool shut down");
    }
}

fn signal_stop(slot: &mut WorkerSlot) {
    if let Some(kill) = slot.kill.take() {
        // the slot may already have exited on its own
        let _ = kill.send(());
    }
}

async fn stop_slot(slot: &mut WorkerSlot) {
    signal_stop(slot);
    if let Some(handle) = slot.handle.take() {
        if let Err(e) = handle.await {
            warn!(worker_id = slot.info.id, error = %e, "worker task ended abnormally");
        }
    }
}

fn spawn_slot(id: usize, context: &WorkerContext) -> WorkerSlot {
    let (kill, kill_rx) = oneshot::channel();
    let handle = tokio::spawn(run_worker(id, context.clone(), kill_rx));
    context.sink.publish(WorkerInfo::idle(id).to_event());
    WorkerSlot {
        info: WorkerInfo::idle(id),
        kill: Some(kill),
        handle: Some(handle),
    }
}

async fn next_operation(queue: &OperationQueue) -> Option<AtomicOperation> {
    queue.lock().await.recv().await
}

async fn run_worker(id: usize, context: WorkerContext, mut kill: oneshot::Receiver<()>) {
    debug!(worker_id = id, "worker started");
    loop {
        let next = tokio::select! {
            biased;
            _ = &mut kill => break,
            operation = next_operation(&context.queue) => operation,
        };
        let Some(operation) = next else {
            debug!(worker_id = id, "operation queue closed");
            break;
        };

        // captured at dequeue: later table updates do not affect this operation
        let delay = context.delays.get(operation.operator);
        context.transition(id, WorkerEvent::Dequeue, Some(&operation));

        let interrupted = tokio::select! {
            biased;
            _ = &mut kill => true,
            _ = tokio::time::sleep(Duration::from_millis(
                context.delay_unit_ms.saturating_mul(delay),
            )) => false,
        };
        if interrupted {
            log_worker_operation(
                "requeue",
                id,
                Some(operation.task_id),
                "interrupted",
                Some(operation.expression().as_str()),
            );
            if let Err(e) = context.requeue.send(operation) {
                warn!(worker_id = id, error = %e, "could not requeue in-flight operation");
            }
            break;
        }

        let outcome = operation.evaluate();
        if let Err(e) = &outcome {
            warn!(worker_id = id, task_id = operation.task_id, error = %e, "evaluation failed");
        }
        operation.complete(outcome);
        context.transition(id, WorkerEvent::Finish, None);
    }
    debug!(worker_id = id, "worker stopped");
}

impl WorkerContext {
    /// Move slot `id` to its next state and publish the change
    fn transition(&self, id: usize, event: WorkerEvent, operation: Option<&AtomicOperation>) {
        let update = {
            let mut workers = self.workers.lock();
            let Some(slot) = workers.iter_mut().find(|slot| slot.info.id == id) else {
                return;
            };
            match next_worker_state(slot.info.status, event) {
                Ok(state) => slot.info.status = state,
                Err(e) => {
                    warn!(worker_id = id, error = %e, "unexpected worker transition");
                    return;
                }
            }
            slot.info.expression = operation.map(AtomicOperation::expression).unwrap_or_default();
            slot.info.task_id = operation.map(|op| op.task_id);
            slot.info.to_event()
        };
        self.sink.publish(update);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    #[error("Worker not found: {worker_id}")]
    WorkerNotFound { worker_id: usize },
    #[error("Operation queue is closed")]
    QueueClosed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventPublisher;
    use crate::execution::WaveJoin;
    use crate::expression::{Operator, Symbol};

    fn test_pool(size: usize, delay: u64) -> (WorkerPool, EventPublisher) {
        let publisher = EventPublisher::new(256);
        let pool = WorkerPool::start(
            WorkerPoolConfig {
                initial_size: size,
                delay_unit_ms: 10,
            },
            DelayTable::uniform(delay),
            Arc::new(publisher.clone()),
        );
        (pool, publisher)
    }

    fn operation(
        task_id: i64,
        op: Operator,
        left: &str,
        right: &str,
        join: &WaveJoin,
    ) -> (AtomicOperation, oneshot::Receiver<crate::execution::OperationOutcome>) {
        let source = format!("{left}{}{right}", op.symbol());
        AtomicOperation::for_symbol(task_id, &Symbol::calculation(0, source, op, left, right), join)
            .unwrap()
    }

    #[tokio::test]
    async fn starts_with_configured_idle_slots() {
        let (pool, _events) = test_pool(4, 0);
        let workers = pool.workers();
        assert_eq!(workers.iter().map(|w| w.id).collect::<Vec<_>>(), [1, 2, 3, 4]);
        assert!(workers.iter().all(|w| w.status == WorkerState::Idle));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn undersized_pool_is_raised_to_the_floor() {
        let (pool, _events) = test_pool(1, 0);
        assert_eq!(pool.size(), MIN_WORKERS);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn evaluates_submitted_operations() {
        let (pool, _events) = test_pool(2, 0);
        let join = WaveJoin::new();
        let (op, rx) = operation(1, Operator::Division, "9", "(-3)", &join);
        pool.submit(op).unwrap();
        assert_eq!(rx.await.unwrap(), Ok("-3".to_string()));
        join.wait().await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn removing_an_unknown_worker_fails() {
        let (pool, _events) = test_pool(3, 0);
        assert!(matches!(
            pool.remove_worker(42).await,
            Err(WorkerPoolError::WorkerNotFound { worker_id: 42 })
        ));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn removal_above_the_floor_does_not_respawn() {
        let (pool, _events) = test_pool(4, 0);
        pool.remove_worker(2).await.unwrap();
        let ids: Vec<usize> = pool.workers().iter().map(|w| w.id).collect();
        assert_eq!(ids, [1, 3, 4]);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn removal_to_one_slot_spawns_exactly_one_replacement() {
        let (pool, _events) = test_pool(2, 0);
        pool.remove_worker(1).await.unwrap();
        let ids: Vec<usize> = pool.workers().iter().map(|w| w.id).collect();
        assert_eq!(ids, [2, 3]);

        pool.remove_worker(3).await.unwrap();
        let ids: Vec<usize> = pool.workers().iter().map(|w| w.id).collect();
        assert_eq!(ids, [2, 4]);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn busy_slot_reports_its_operation() {
        let (pool, events) = test_pool(2, 50);
        let mut rx = events.subscribe();
        let join = WaveJoin::new();
        let (op, result) = operation(11, Operator::Plus, "5", "5", &join);
        pool.submit(op).unwrap();

        loop {
            let published = rx.recv().await.unwrap();
            if let CalcEvent::WorkerStatus(update) = published.event {
                if update.state == WorkerState::Busy {
                    assert_eq!(update.current_expression, "5+5");
                    assert_eq!(update.task_id, Some(11));
                    break;
                }
            }
        }
        let busy: Vec<WorkerInfo> = pool
            .workers()
            .into_iter()
            .filter(|w| w.status == WorkerState::Busy)
            .collect();
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].expression, "5+5");

        assert_eq!(result.await.unwrap(), Ok("10".to_string()));
        pool.shutdown().await;
    }
}
