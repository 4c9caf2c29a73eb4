//! # Data Models
//!
//! Plain records moved between the orchestrator and the task store.

pub mod audit_record;
pub mod task;
pub mod user;

pub use audit_record::{AuditRecord, NewAuditRecord};
pub use task::{NewTask, SubmissionAck, TaskDetail, TaskRecord};
pub use user::{Actor, User};
