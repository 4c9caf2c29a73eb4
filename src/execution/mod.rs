//! Execution of atomic operations on a bounded pool of simulated workers.

pub mod delay_table;
pub mod operation;
pub mod worker_pool;

pub use delay_table::{parse_delay_updates, DelayTable};
pub use operation::{AtomicOperation, EvaluationError, OperationOutcome, WaveJoin};
pub use worker_pool::{WorkerInfo, WorkerPool, WorkerPoolConfig, WorkerPoolError};
