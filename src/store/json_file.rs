use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{FieldQuery, StoreError, TaskStore};
use crate::io::atomic::atomic_write;
use crate::model::task::{Task, TaskPatch};

const FORMAT_VERSION: u32 = 1;

/// On-disk layout of `tasks.json`
#[derive(Debug, Serialize, Deserialize)]
struct TaskFile {
    version: u32,
    #[serde(default)]
    tasks: Vec<Task>,
}

/// Task store persisted as a single JSON document.
///
/// The whole collection is held in memory; every write rewrites the file
/// atomically before returning.
pub struct JsonFileStore {
    path: PathBuf,
    tasks: RwLock<IndexMap<String, Task>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let tasks = if path.exists() {
            let text = fs::read_to_string(path)?;
            let file: TaskFile = serde_json::from_str(&text)?;
            if file.version > FORMAT_VERSION {
                return Err(StoreError::Backend(format!(
                    "{} was written by a newer version (format {})",
                    path.display(),
                    file.version
                )));
            }
            file.tasks.into_iter().map(|t| (t.id.clone(), t)).collect()
        } else {
            IndexMap::new()
        };
        tracing::debug!(path = %path.display(), count = tasks.len(), "opened task file");
        Ok(JsonFileStore {
            path: path.to_path_buf(),
            tasks: RwLock::new(tasks),
        })
    }

    /// Create an empty task file at `path`, overwriting nothing that exists.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        let store = Self::open(path)?;
        if !path.exists() {
            store.flush(&IndexMap::new())?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, tasks: &IndexMap<String, Task>) -> Result<(), StoreError> {
        let file = TaskFile {
            version: FORMAT_VERSION,
            tasks: tasks.values().cloned().collect(),
        };
        let mut content = serde_json::to_string_pretty(&file)?;
        content.push('\n');
        atomic_write(&self.path, content.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for JsonFileStore {
    async fn get(&self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn set(&self, task: Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let mut next = tasks.clone();
        next.insert(task.id.clone(), task);
        self.flush(&next)?;
        *tasks = next;
        Ok(())
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let mut next = tasks.clone();
        let task = next
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply_to(task);
        self.flush(&next)?;
        *tasks = next;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let mut next = tasks.clone();
        if next.shift_remove(id).is_some() {
            self.flush(&next)?;
            *tasks = next;
        }
        Ok(())
    }

    async fn query_by_field(&self, query: FieldQuery) -> Result<Vec<Task>, StoreError> {
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
        Ok(self.tasks.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::open(&tmp.path().join("tasks.json")).unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[test]
    fn create_writes_an_empty_versioned_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.json");
        JsonFileStore::create(&path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["tasks"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn writes_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.json");
        {
            let store = JsonFileStore::open(&path).unwrap();
            store.set(Task::new("a", "First", Utc::now())).await.unwrap();
            store.set(Task::new("b", "Second", Utc::now())).await.unwrap();
            store.update("a", &TaskPatch::completed(true)).await.unwrap();
            store.delete("b").await.unwrap();
        }
        let reopened = JsonFileStore::open(&path).unwrap();
        let tasks = reopened.list_all().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "a");
        assert!(tasks[0].completed);
    }

    #[tokio::test]
    async fn file_is_camel_case_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.json");
        let store = JsonFileStore::open(&path).unwrap();
        store.set(Task::new("a", "First", Utc::now())).await.unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"parentId\": \"root\""));
        assert!(text.contains("\"version\": 1"));
    }

    #[tokio::test]
    async fn failed_flush_leaves_memory_unchanged() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("project");
        fs::create_dir(&dir).unwrap();
        let store = JsonFileStore::create(&dir.join("tasks.json")).unwrap();
        store.set(Task::new("a", "First", Utc::now())).await.unwrap();

        // no directory left to write the temp file into
        fs::remove_dir_all(&dir).unwrap();
        assert!(store.set(Task::new("b", "Second", Utc::now())).await.is_err());
        assert!(store.update("a", &TaskPatch::text("Renamed")).await.is_err());
        assert!(store.delete("a").await.is_err());

        let tasks = store.list_all().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "First");
    }

    #[test]
    fn newer_format_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.json");
        fs::write(&path, r#"{"version": 99, "tasks": []}"#).unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Backend(_))
        ));
    }

    #[test]
    fn malformed_file_is_json_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Json(_))));
    }
}
