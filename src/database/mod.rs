//! # Database Operations
//!
//! Durable state of the engine: users, tasks with their last-step checkpoints, the audit
//! trail and the delay table.
//!
//! ## Key Components
//!
//! - [`store`] - the [`TaskStore`] contract every backend implements
//! - [`sqlite`] - `sqlx`-backed store that survives process restarts
//! - [`memory`] - `dashmap`-backed store for tests and embedding
//! - [`migrations`] - idempotent schema setup for the SQLite backend

pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod store;

pub use memory::InMemoryTaskStore;
pub use migrations::DatabaseMigrations;
pub use sqlite::SqliteTaskStore;
pub use store::TaskStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User not found: {user_id}")]
    UserNotFound { user_id: i64 },
    #[error("Task {task_id} not found for user {user_id:?}")]
    TaskNotFound { task_id: i64, user_id: Option<i64> },
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        StoreError::Database(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Serialization(error.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
