//! Asynchronous task persistence.
//!
//! The engine and the history manager only talk to a [`TaskStore`]; the
//! concrete backend is chosen at startup.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::model::task::{Task, TaskPatch};

/// Error type for store access
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("not signed in")]
    Unauthenticated,
    #[error("backend error: {0}")]
    Backend(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode tasks: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single-field equality query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldQuery {
    /// Tasks whose `parent_id` equals the value
    ParentId(String),
    /// Tasks whose `due_date` equals the value (`None` = no due date)
    DueDate(Option<String>),
    /// Tasks whose `is_focused` flag equals the value
    Focused(bool),
}

impl FieldQuery {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            FieldQuery::ParentId(parent) => task.parent_id == *parent,
            FieldQuery::DueDate(date) => task.due_date == *date,
            FieldQuery::Focused(focused) => task.is_focused == *focused,
        }
    }
}

/// Keyed task collection with async CRUD
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Task>, StoreError>;

    /// Full overwrite; creates the record if absent.
    async fn set(&self, task: Task) -> Result<(), StoreError>;

    /// Merge `patch` into an existing record. Fails with `NotFound` if absent.
    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError>;

    /// Remove a record. Deleting a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn query_by_field(&self, query: FieldQuery) -> Result<Vec<Task>, StoreError>;

    /// Every task, in insertion order.
    async fn list_all(&self) -> Result<Vec<Task>, StoreError>;
}
