//! Audit trail rows: one per completed atomic operation.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub task_id: i64,
    /// Full expression before the operation landed, e.g. `2*3+4`
    pub before: String,
    /// Full expression after the operation landed, e.g. `6+4`
    pub after: String,
    pub recorded_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditRecord {
    pub task_id: i64,
    pub before: String,
    pub after: String,
}
