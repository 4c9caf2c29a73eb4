//! # Database Migration System
//!
//! Embedded, versioned schema for the SQLite store. Applied versions are tracked in
//! `calcflow_schema_migrations`, so running the migrations again on every connect is a no-op.

use std::collections::HashSet;

use sqlx::{Row, SqlitePool};
use tracing::info;

/// One embedded schema change
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Version timestamp (YYYYMMDDHHMMSS format)
    pub version: &'static str,
    /// Human-readable migration name
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "20240601000000",
        name: "create users and tasks",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users (id),
                expression TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'processing',
                result TEXT,
                created TEXT NOT NULL,
                last_ping TEXT,
                last_step TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_user_id ON tasks (user_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status);
        "#,
    },
    Migration {
        version: "20240601000100",
        name: "create audit records",
        sql: r#"
            CREATE TABLE IF NOT EXISTS audit_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL REFERENCES tasks (id),
                before_text TEXT NOT NULL,
                after_text TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_records_task_id ON audit_records (task_id);
        "#,
    },
    Migration {
        version: "20240601000200",
        name: "create delays",
        sql: r#"
            CREATE TABLE IF NOT EXISTS delays (
                operator TEXT PRIMARY KEY,
                delay INTEGER NOT NULL CHECK (delay >= 0)
            );
        "#,
    },
];

/// Manages the embedded schema migrations.
pub struct DatabaseMigrations;

impl DatabaseMigrations {
    pub fn all() -> &'static [Migration] {
        MIGRATIONS
    }

    /// Apply every migration that has not been recorded yet
    pub async fn run_all(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        Self::ensure_migration_table(pool).await?;
        let applied = Self::get_applied_migrations(pool).await?;

        for migration in MIGRATIONS {
            if applied.contains(migration.version) {
                continue;
            }
            info!(
                version = migration.version,
                name = migration.name,
                "applying migration"
            );
            let mut tx = pool.begin().await?;
            sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO calcflow_schema_migrations (version) VALUES (?)")
                .bind(migration.version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
        Ok(())
    }

    async fn ensure_migration_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS calcflow_schema_migrations (
                version TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn get_applied_migrations(pool: &SqlitePool) -> Result<HashSet<String>, sqlx::Error> {
        let rows = sqlx::query("SELECT version FROM calcflow_schema_migrations")
            .fetch_all(pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("version"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[test]
    fn versions_are_strictly_increasing() {
        let versions: Vec<&str> = DatabaseMigrations::all().iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(versions, sorted);
        assert!(versions.iter().all(|v| v.len() == 14));
    }

    #[tokio::test]
    async fn running_twice_is_a_no_op() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        DatabaseMigrations::run_all(&pool).await.unwrap();
        DatabaseMigrations::run_all(&pool).await.unwrap();

        let count: i64 = sqlx::query("SELECT COUNT(*) AS applied FROM calcflow_schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get("applied");
        assert_eq!(count, MIGRATIONS.len() as i64);
    }
}
