//! Per-operator processing delays shared by every worker.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{CalcflowError, Result};
use crate::expression::Operator;

/// Mutable operator -> delay mapping behind a single lock.
///
/// Delays are expressed in delay units (one second by default, see
/// [`WorkerPoolConfig::delay_unit_ms`](super::WorkerPoolConfig)). Operators without an entry
/// run without delay.
#[derive(Debug, Clone, Default)]
pub struct DelayTable {
    delays: Arc<RwLock<HashMap<Operator, u64>>>,
}

impl DelayTable {
    pub fn new(delays: HashMap<Operator, u64>) -> Self {
        Self {
            delays: Arc::new(RwLock::new(delays)),
        }
    }

    /// Same delay for all four operators
    pub fn uniform(delay: u64) -> Self {
        Self::new(Operator::ALL.into_iter().map(|op| (op, delay)).collect())
    }

    pub fn get(&self, operator: Operator) -> u64 {
        self.delays.read().get(&operator).copied().unwrap_or(0)
    }

    pub fn set(&self, operator: Operator, delay: u64) {
        self.delays.write().insert(operator, delay);
    }

    /// Merge `updates` into the table in one write
    pub fn apply(&self, updates: &HashMap<Operator, u64>) {
        let mut delays = self.delays.write();
        for (operator, delay) in updates {
            delays.insert(*operator, *delay);
        }
    }

    /// Ordered copy of the current table
    pub fn snapshot(&self) -> BTreeMap<Operator, u64> {
        self.delays
            .read()
            .iter()
            .map(|(op, delay)| (*op, *delay))
            .collect()
    }
}

/// Parse a raw `{"plus": 3, ...}` update, rejecting unknown operators and negative delays
pub fn parse_delay_updates(raw: &HashMap<String, i64>) -> Result<HashMap<Operator, u64>> {
    raw.iter()
        .map(|(name, delay)| -> Result<(Operator, u64)> {
            let operator = name
                .parse::<Operator>()
                .map_err(CalcflowError::Validation)?;
            let delay = u64::try_from(*delay).map_err(|_| {
                CalcflowError::Validation(format!(
                    "delay for {operator} must not be negative (got {delay})"
                ))
            })?;
            Ok((operator, delay))
        })
        .collect()
}
