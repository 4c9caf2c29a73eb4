//! # System Constants
//!
//! Operational boundaries of the calculation engine: pool sizing, delay defaults,
//! and the names used on the event wire.

pub use crate::state_machine::{TaskState as TaskStatus, WorkerState as WorkerStatus};

/// Worker pool sizing
pub mod pool {
    /// Number of execution slots spawned at startup unless configured otherwise
    pub const DEFAULT_WORKER_COUNT: usize = 4;

    /// Liveness floor: removals never leave fewer slots than this
    pub const MIN_WORKERS: usize = 2;
}

/// Delay table defaults
pub mod delays {
    /// Seeded delay (in delay units) for operators with no stored value
    pub const DEFAULT_OPERATION_DELAY: u64 = 10;

    /// Length of one delay unit in milliseconds
    pub const DEFAULT_DELAY_UNIT_MS: u64 = 1000;
}

/// Event names published to the sink
pub mod events {
    pub const TASK_PROGRESS: &str = "update task";
    pub const WORKER_STATUS: &str = "update worker";
}

/// Wire format used for human-readable timestamps in progress events
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
