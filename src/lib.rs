#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Calcflow Core
//!
//! Resumable arithmetic evaluation engine. Expressions are reduced in waves of atomic binary
//! operations, executed on a bounded pool of simulated workers with per-operator delays, and
//! checkpointed after every completed operation so an interrupted evaluation picks up where it
//! left off.
//!
//! ## Module Organization
//!
//! - [`expression`] - tokenizer and wave reducer
//! - [`validation`] - submission checks
//! - [`execution`] - delay table, atomic operations and the worker pool
//! - [`orchestration`] - task run loops and the [`Calculator`] entry point
//! - [`database`] - the task store contract with SQLite and in-memory backends
//! - [`models`] - task, audit and user records
//! - [`events`] - progress and worker status events
//! - [`state_machine`] - task and worker state transitions
//! - [`config`] - layered configuration
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use calcflow_core::config::CalcflowConfig;
//! use calcflow_core::database::{InMemoryTaskStore, TaskStore};
//! use calcflow_core::events::EventPublisher;
//! use calcflow_core::Calculator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryTaskStore::new());
//! let user = store.create_user("ada", false).await?;
//! let calculator = Calculator::new(
//!     &CalcflowConfig::default(),
//!     store,
//!     Arc::new(EventPublisher::default()),
//! )
//! .await?;
//!
//! let ack = calculator.submit(user.id, "2*3+4").await?;
//! let result = calculator.wait_for_task(ack.id).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod execution;
pub mod expression;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod validation;

pub use config::{CalcflowConfig, ConfigManager};
pub use constants::{TaskStatus, WorkerStatus};
pub use database::{InMemoryTaskStore, SqliteTaskStore, StoreError, TaskStore};
pub use error::{CalcflowError, Result};
pub use events::{CalcEvent, EventPublisher, EventSink};
pub use execution::{DelayTable, WorkerInfo, WorkerPool};
pub use expression::{ExpressionReducer, Operator};
pub use models::{Actor, AuditRecord, SubmissionAck, TaskDetail, TaskRecord, User};
pub use orchestration::Calculator;
pub use validation::{is_valid_expression, validate_expression};
