//! In-process task store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use dashmap::DashMap;

use super::store::TaskStore;
use super::{StoreError, StoreResult};
use crate::expression::Operator;
use crate::models::{AuditRecord, NewAuditRecord, NewTask, TaskRecord, User};
use crate::state_machine::TaskState;

/// [`TaskStore`] kept entirely in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    users: DashMap<i64, User>,
    tasks: DashMap<i64, TaskRecord>,
    audit: DashMap<i64, Vec<AuditRecord>>,
    delays: DashMap<Operator, u64>,
    next_user_id: AtomicI64,
    next_task_id: AtomicI64,
    next_audit_id: AtomicI64,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(counter: &AtomicI64) -> i64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn with_task<T>(&self, task_id: i64, f: impl FnOnce(&mut TaskRecord) -> T) -> StoreResult<T> {
        let mut task = self.tasks.get_mut(&task_id).ok_or(StoreError::TaskNotFound {
            task_id,
            user_id: None,
        })?;
        Ok(f(&mut task))
    }

    fn sorted_tasks(&self, keep: impl Fn(&TaskRecord) -> bool) -> Vec<TaskRecord> {
        let mut tasks: Vec<TaskRecord> = self
            .tasks
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        tasks.sort_by_key(|task| task.id);
        tasks
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_user(&self, name: &str, is_admin: bool) -> StoreResult<User> {
        let user = User {
            id: Self::next_id(&self.next_user_id),
            name: name.to_string(),
            is_admin,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: i64) -> StoreResult<User> {
        self.users
            .get(&user_id)
            .map(|user| user.clone())
            .ok_or(StoreError::UserNotFound { user_id })
    }

    async fn create_task(&self, task: NewTask, created: NaiveDateTime) -> StoreResult<TaskRecord> {
        if !self.users.contains_key(&task.user_id) {
            return Err(StoreError::UserNotFound {
                user_id: task.user_id,
            });
        }
        let record = TaskRecord {
            id: Self::next_id(&self.next_task_id),
            user_id: task.user_id,
            last_step: task.expression.clone(),
            expression: task.expression,
            status: TaskState::Processing,
            result: None,
            created,
            last_ping: None,
        };
        self.tasks.insert(record.id, record.clone());
        Ok(record)
    }

    async fn append_audit_record(
        &self,
        record: NewAuditRecord,
        at: NaiveDateTime,
    ) -> StoreResult<AuditRecord> {
        if !self.tasks.contains_key(&record.task_id) {
            return Err(StoreError::TaskNotFound {
                task_id: record.task_id,
                user_id: None,
            });
        }
        let stored = AuditRecord {
            id: Self::next_id(&self.next_audit_id),
            task_id: record.task_id,
            before: record.before,
            after: record.after,
            recorded_at: at,
        };
        self.audit
            .entry(stored.task_id)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update_last_step(&self, task_id: i64, last_step: &str) -> StoreResult<()> {
        self.with_task(task_id, |task| task.last_step = last_step.to_string())
    }

    async fn update_ping(&self, task_id: i64, at: NaiveDateTime) -> StoreResult<()> {
        self.with_task(task_id, |task| task.last_ping = Some(at))
    }

    async fn set_result(&self, task_id: i64, result: &str) -> StoreResult<()> {
        self.with_task(task_id, |task| task.result = Some(result.to_string()))
    }

    async fn set_status(&self, task_id: i64, status: TaskState) -> StoreResult<()> {
        self.with_task(task_id, |task| task.status = status)
    }

    async fn list_tasks_by_user(&self, user_id: i64) -> StoreResult<Vec<TaskRecord>> {
        Ok(self.sorted_tasks(|task| task.user_id == user_id))
    }

    async fn get_task(&self, task_id: i64, user_id: i64) -> StoreResult<TaskRecord> {
        self.tasks
            .get(&task_id)
            .filter(|task| task.user_id == user_id)
            .map(|task| task.clone())
            .ok_or(StoreError::TaskNotFound {
                task_id,
                user_id: Some(user_id),
            })
    }

    async fn list_audit_records(&self, task_id: i64) -> StoreResult<Vec<AuditRecord>> {
        Ok(self
            .audit
            .get(&task_id)
            .map(|records| records.clone())
            .unwrap_or_default())
    }

    async fn list_processing_tasks(&self) -> StoreResult<Vec<TaskRecord>> {
        Ok(self.sorted_tasks(|task| task.status == TaskState::Processing))
    }

    async fn get_delays(&self) -> StoreResult<HashMap<Operator, u64>> {
        Ok(self
            .delays
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect())
    }

    async fn set_delays(&self, delays: &HashMap<Operator, u64>) -> StoreResult<()> {
        for (operator, delay) in delays {
            self.delays.insert(*operator, *delay);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    #[tokio::test]
    async fn task_creation_requires_an_existing_user() {
        let store = InMemoryTaskStore::new();
        let missing = store
            .create_task(
                NewTask {
                    user_id: 99,
                    expression: "1+1".into(),
                },
                now(),
            )
            .await;
        assert!(matches!(missing, Err(StoreError::UserNotFound { user_id: 99 })));

        let user = store.create_user("ada", false).await.unwrap();
        let task = store
            .create_task(
                NewTask {
                    user_id: user.id,
                    expression: "1+1".into(),
                },
                now(),
            )
            .await
            .unwrap();
        assert_eq!(task.status, TaskState::Processing);
        assert_eq!(task.last_step, "1+1");
    }

    #[tokio::test]
    async fn tasks_are_only_visible_to_their_owner() {
        let store = InMemoryTaskStore::new();
        let owner = store.create_user("owner", false).await.unwrap();
        let other = store.create_user("other", false).await.unwrap();
        let task = store
            .create_task(
                NewTask {
                    user_id: owner.id,
                    expression: "2*2".into(),
                },
                now(),
            )
            .await
            .unwrap();

        assert!(store.get_task(task.id, owner.id).await.is_ok());
        assert!(matches!(
            store.get_task(task.id, other.id).await,
            Err(StoreError::TaskNotFound { .. })
        ));
        assert!(store.list_tasks_by_user(other.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn seeding_fills_only_missing_operators() {
        let store = InMemoryTaskStore::new();
        store
            .set_delays(&HashMap::from([(Operator::Plus, 3)]))
            .await
            .unwrap();
        let delays = store.seed_delays(10).await.unwrap();
        assert_eq!(delays.len(), 4);
        assert_eq!(delays[&Operator::Plus], 3);
        assert_eq!(delays[&Operator::Division], 10);
    }

    #[tokio::test]
    async fn completed_tasks_leave_the_processing_list() {
        let store = InMemoryTaskStore::new();
        let user = store.create_user("u", false).await.unwrap();
        let mut ids = Vec::new();
        for expression in ["1+1", "2+2"] {
            let task = store
                .create_task(
                    NewTask {
                        user_id: user.id,
                        expression: expression.into(),
                    },
                    now(),
                )
                .await
                .unwrap();
            ids.push(task.id);
        }
        store.set_status(ids[0], TaskState::Completed).await.unwrap();
        let processing: Vec<i64> = store
            .list_processing_tasks()
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(processing, [ids[1]]);
    }
}
