use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;

use super::{FieldQuery, StoreError, TaskStore};
use crate::model::task::{Task, TaskPatch};

/// In-memory store keyed by task id, preserving insertion order.
///
/// Carries a signed-in identity; every call fails with `Unauthenticated`
/// while signed out.
pub struct MemoryStore {
    tasks: RwLock<IndexMap<String, Task>>,
    user: RwLock<Option<String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store signed in as a local user
    pub fn new() -> Self {
        MemoryStore {
            tasks: RwLock::new(IndexMap::new()),
            user: RwLock::new(Some("local".to_string())),
        }
    }

    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let map = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        MemoryStore {
            tasks: RwLock::new(map),
            user: RwLock::new(Some("local".to_string())),
        }
    }

    pub async fn sign_in(&self, user: impl Into<String>) {
        *self.user.write().await = Some(user.into());
    }

    pub async fn sign_out(&self) {
        *self.user.write().await = None;
    }

    async fn require_user(&self) -> Result<(), StoreError> {
        if self.user.read().await.is_some() {
            Ok(())
        } else {
            Err(StoreError::Unauthenticated)
        }
    }

    /// Consume the store, returning its tasks in insertion order
    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks.into_inner().into_values().collect()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Task>, StoreError> {
        self.require_user().await?;
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn set(&self, task: Task) -> Result<(), StoreError> {
        self.require_user().await?;
        self.tasks.write().await.insert(task.id.clone(), task);
        Ok(())
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
        self.require_user().await?;
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply_to(task);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.require_user().await?;
        self.tasks.write().await.shift_remove(id);
        Ok(())
    }

    async fn query_by_field(&self, query: FieldQuery) -> Result<Vec<Task>, StoreError> {
        self.require_user().await?;
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Task>, StoreError> {
        self.require_user().await?;
        Ok(self.tasks.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(id: &str, parent: &str) -> Task {
        let mut t = Task::new(id, id.to_uppercase(), Utc::now());
        t.parent_id = parent.to_string();
        t
    }

    #[tokio::test]
    async fn set_get_update_delete() {
        let store = MemoryStore::new();
        store.set(task("a", "root")).await.unwrap();
        store.update("a", &TaskPatch::text("renamed")).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap().text, "renamed");

        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        // idempotent
        store.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.update("nope", &TaskPatch::text("x")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn query_by_parent_keeps_insertion_order() {
        let store = MemoryStore::with_tasks([task("a", "root"), task("b", "a"), task("c", "a")]);
        let children = store
            .query_by_field(FieldQuery::ParentId("a".into()))
            .await
            .unwrap();
        let ids: Vec<_> = children.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn query_by_due_date_none_matches_undated() {
        let mut dated = task("a", "root");
        dated.due_date = Some("2024-01-15".into());
        let store = MemoryStore::with_tasks([dated, task("b", "root")]);
        let undated = store.query_by_field(FieldQuery::DueDate(None)).await.unwrap();
        assert_eq!(undated.len(), 1);
        assert_eq!(undated[0].id, "b");
    }

    #[tokio::test]
    async fn signed_out_calls_fail() {
        let store = MemoryStore::with_tasks([task("a", "root")]);
        store.sign_out().await;
        assert!(matches!(
            store.list_all().await.unwrap_err(),
            StoreError::Unauthenticated
        ));
        store.sign_in("someone").await;
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }
}
