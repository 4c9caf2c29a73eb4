//! SQLite-backed task store.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::migrations::DatabaseMigrations;
use super::store::TaskStore;
use super::{StoreError, StoreResult};
use crate::expression::Operator;
use crate::models::{AuditRecord, NewAuditRecord, NewTask, TaskRecord, User};
use crate::state_machine::TaskState;

const TASK_COLUMNS: &str =
    "id, user_id, expression, status, result, created, last_ping, last_step";

#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Connect to `url`, creating the database file if needed, and apply migrations
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        info!(url, max_connections, "SQLite task store connected");
        Self::from_pool(pool).await
    }

    /// Private database living as long as the store; a single connection keeps it shared
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        DatabaseMigrations::run_all(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_task(&self, task_id: i64) -> StoreResult<TaskRecord> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => hydrate_task(&row),
            None => Err(StoreError::TaskNotFound {
                task_id,
                user_id: None,
            }),
        }
    }
}

/// An update that touched no row means the task does not exist
fn ensure_updated(task_id: i64, rows_affected: u64) -> StoreResult<()> {
    if rows_affected == 0 {
        return Err(StoreError::TaskNotFound {
            task_id,
            user_id: None,
        });
    }
    Ok(())
}

fn hydrate_task(row: &SqliteRow) -> StoreResult<TaskRecord> {
    let status: String = row.try_get("status")?;
    Ok(TaskRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        expression: row.try_get("expression")?,
        status: TaskState::from_str(&status).map_err(StoreError::Serialization)?,
        result: row.try_get("result")?,
        created: row.try_get("created")?,
        last_ping: row.try_get("last_ping")?,
        last_step: row.try_get("last_step")?,
    })
}

fn hydrate_audit(row: &SqliteRow) -> StoreResult<AuditRecord> {
    Ok(AuditRecord {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        before: row.try_get("before_text")?,
        after: row.try_get("after_text")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_user(&self, name: &str, is_admin: bool) -> StoreResult<User> {
        let id = sqlx::query("INSERT INTO users (name, is_admin) VALUES (?, ?)")
            .bind(name)
            .bind(is_admin)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(User {
            id,
            name: name.to_string(),
            is_admin,
        })
    }

    async fn get_user(&self, user_id: i64) -> StoreResult<User> {
        let row = sqlx::query("SELECT id, name, is_admin FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::UserNotFound { user_id })?;
        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            is_admin: row.try_get("is_admin")?,
        })
    }

    async fn create_task(&self, task: NewTask, created: NaiveDateTime) -> StoreResult<TaskRecord> {
        self.get_user(task.user_id).await?;
        let id = sqlx::query(
            r#"
            INSERT INTO tasks (user_id, expression, status, created, last_step)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.user_id)
        .bind(&task.expression)
        .bind(TaskState::Processing.as_str())
        .bind(created)
        .bind(&task.expression)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        self.fetch_task(id).await
    }

    async fn append_audit_record(
        &self,
        record: NewAuditRecord,
        at: NaiveDateTime,
    ) -> StoreResult<AuditRecord> {
        let id = sqlx::query(
            "INSERT INTO audit_records (task_id, before_text, after_text, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(record.task_id)
        .bind(&record.before)
        .bind(&record.after)
        .bind(at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(AuditRecord {
            id,
            task_id: record.task_id,
            before: record.before,
            after: record.after,
            recorded_at: at,
        })
    }

    async fn update_last_step(&self, task_id: i64, last_step: &str) -> StoreResult<()> {
        let updated = sqlx::query("UPDATE tasks SET last_step = ? WHERE id = ?")
            .bind(last_step)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        ensure_updated(task_id, updated.rows_affected())
    }

    async fn update_ping(&self, task_id: i64, at: NaiveDateTime) -> StoreResult<()> {
        let updated = sqlx::query("UPDATE tasks SET last_ping = ? WHERE id = ?")
            .bind(at)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        ensure_updated(task_id, updated.rows_affected())
    }

    async fn set_result(&self, task_id: i64, result: &str) -> StoreResult<()> {
        let updated = sqlx::query("UPDATE tasks SET result = ? WHERE id = ?")
            .bind(result)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        ensure_updated(task_id, updated.rows_affected())
    }

    async fn set_status(&self, task_id: i64, status: TaskState) -> StoreResult<()> {
        let updated = sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        ensure_updated(task_id, updated.rows_affected())
    }

    async fn list_tasks_by_user(&self, user_id: i64) -> StoreResult<Vec<TaskRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ? ORDER BY id ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(hydrate_task).collect()
    }

    async fn get_task(&self, task_id: i64, user_id: i64) -> StoreResult<TaskRecord> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND user_id = ?"
        ))
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => hydrate_task(&row),
            None => Err(StoreError::TaskNotFound {
                task_id,
                user_id: Some(user_id),
            }),
        }
    }

    async fn list_audit_records(&self, task_id: i64) -> StoreResult<Vec<AuditRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, task_id, before_text, after_text, recorded_at
            FROM audit_records
            WHERE task_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(hydrate_audit).collect()
    }

    async fn list_processing_tasks(&self) -> StoreResult<Vec<TaskRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ? ORDER BY id ASC"
        ))
        .bind(TaskState::Processing.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(hydrate_task).collect()
    }

    async fn get_delays(&self) -> StoreResult<HashMap<Operator, u64>> {
        let rows = sqlx::query("SELECT operator, delay FROM delays")
            .fetch_all(&self.pool)
            .await?;
        let mut delays = HashMap::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("operator")?;
            let delay: i64 = row.try_get("delay")?;
            let operator = Operator::from_str(&name).map_err(StoreError::Serialization)?;
            let delay = u64::try_from(delay).map_err(|_| {
                StoreError::Serialization(format!("negative delay {delay} stored for {name}"))
            })?;
            delays.insert(operator, delay);
        }
        Ok(delays)
    }

    async fn set_delays(&self, delays: &HashMap<Operator, u64>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for (operator, delay) in delays {
            let delay = i64::try_from(*delay).map_err(|_| {
                StoreError::Serialization(format!("delay {delay} for {operator} is too large"))
            })?;
            sqlx::query(
                r#"
                INSERT INTO delays (operator, delay) VALUES (?, ?)
                ON CONFLICT (operator) DO UPDATE SET delay = excluded.delay
                "#,
            )
            .bind(operator.name())
            .bind(delay)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
