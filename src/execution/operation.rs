//! Atomic operations dispatched to the worker pool, and the per-wave join counter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{oneshot, Notify};

use crate::expression::{format_value, parse_literal, Operator, Symbol};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("operand '{0}' is not a number")]
    InvalidOperand(String),
    #[error("'{expression}' does not evaluate to a finite number")]
    NonFinite { expression: String },
}

/// What a worker delivers on an operation's completion channel
pub type OperationOutcome = Result<String, EvaluationError>;

/// Counts the operations of one wave that have not reported back yet.
///
/// Value delivery goes through each operation's own one-shot channel; this only answers
/// "is the whole wave done".
#[derive(Debug, Clone, Default)]
pub struct WaveJoin {
    inner: Arc<JoinState>,
}

#[derive(Debug, Default)]
struct JoinState {
    outstanding: AtomicUsize,
    notify: Notify,
}

impl WaveJoin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    pub fn done(&self) {
        let previous = self.inner.outstanding.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Resolve once every added operation has called [`done`](Self::done)
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// One binary operation of a wave, owned by whichever worker dequeued it
#[derive(Debug)]
pub struct AtomicOperation {
    pub task_id: i64,
    pub symbol_id: usize,
    pub operator: Operator,
    pub left: String,
    pub right: String,
    completion: oneshot::Sender<OperationOutcome>,
    join: WaveJoin,
}

impl AtomicOperation {
    /// Build the operation for a calculation symbol and register it with `join`.
    ///
    /// Returns `None` for symbols that are not calculations.
    pub fn for_symbol(
        task_id: i64,
        symbol: &Symbol,
        join: &WaveJoin,
    ) -> Option<(Self, oneshot::Receiver<OperationOutcome>)> {
        let operator = symbol.op?;
        let (left, right) = symbol.operands.clone()?;
        let (completion, receiver) = oneshot::channel();
        join.add();
        let operation = Self {
            task_id,
            symbol_id: symbol.id,
            operator,
            left,
            right,
            completion,
            join: join.clone(),
        };
        Some((operation, receiver))
    }

    /// Infix text being evaluated, e.g. `6*(-2)`
    pub fn expression(&self) -> String {
        format!("{}{}{}", self.left, self.operator.symbol(), self.right)
    }

    pub fn evaluate(&self) -> OperationOutcome {
        let left = parse_literal(&self.left)
            .ok_or_else(|| EvaluationError::InvalidOperand(self.left.clone()))?;
        let right = parse_literal(&self.right)
            .ok_or_else(|| EvaluationError::InvalidOperand(self.right.clone()))?;
        let value = self.operator.apply(left, right);
        if !value.is_finite() {
            return Err(EvaluationError::NonFinite {
                expression: self.expression(),
            });
        }
        Ok(format_value(value))
    }

    /// Deliver the outcome to the owning task, then count the operation off its wave
    pub fn complete(self, outcome: OperationOutcome) {
        if self.completion.send(outcome).is_err() {
            tracing::debug!(
                task_id = self.task_id,
                symbol_id = self.symbol_id,
                "task stopped listening before the result arrived"
            );
        }
        self.join.done();
    }
}
