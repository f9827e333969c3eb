use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use ulid::Ulid;

use crate::model::task::{ROOT_PARENT, Task, TaskPatch};
use crate::ops::reorder::{SortKey, dense_reassignment, sort_group};
use crate::ops::undo::{HistoryManager, Operation, apply_forward};
use crate::store::{FieldQuery, StoreError, TaskStore};
use crate::util::dates::{format_date, parse_local_date};

/// Error type for task operations
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid position {index}: group has {len} tasks")]
    InvalidPosition { index: usize, len: usize },
    #[error("cannot move {task} under its own descendant {parent}")]
    Cycle { task: String, parent: String },
    #[error("invalid due date {0:?} (expected YYYY-MM-DD)")]
    InvalidDate(String),
}

/// Input for [`MutationEngine::add_task`]
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub text: String,
    /// Parent id; `None` means top level
    pub parent_id: Option<String>,
    pub tags: Vec<String>,
    pub due_date: Option<String>,
    pub notes: Option<String>,
    /// Insert directly after the sibling with this order instead of appending
    pub insert_after_order: Option<i64>,
}

impl NewTask {
    pub fn new(text: impl Into<String>) -> Self {
        NewTask {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn due(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn after(mut self, order: i64) -> Self {
        self.insert_after_order = Some(order);
        self
    }
}

/// Task lifecycle operations.
///
/// Every change is computed as an [`Operation`], applied to the store, and
/// then pushed onto the shared history, in that order. Missing tasks make an
/// operation a silent no-op; store errors propagate unchanged.
pub struct MutationEngine {
    store: Arc<dyn TaskStore>,
    history: Arc<HistoryManager>,
}

impl MutationEngine {
    pub fn new(store: Arc<dyn TaskStore>, history: Arc<HistoryManager>) -> Self {
        MutationEngine { store, history }
    }

    pub fn store(&self) -> &dyn TaskStore {
        self.store.as_ref()
    }

    pub fn history(&self) -> &Arc<HistoryManager> {
        &self.history
    }

    pub async fn undo(&self) -> Result<bool, crate::ops::undo::HistoryError> {
        self.history.undo(self.store.as_ref()).await
    }

    pub async fn redo(&self) -> Result<bool, crate::ops::undo::HistoryError> {
        self.history.redo(self.store.as_ref()).await
    }

    async fn commit(&self, op: Operation) -> Result<(), TaskError> {
        apply_forward(&op, self.store.as_ref()).await?;
        tracing::info!(op = %op.describe(), changes = op.len(), "applied");
        self.history.push(op);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Create / update
    // -----------------------------------------------------------------------

    /// Create a task. Appends after the last sibling unless
    /// `insert_after_order` is given, in which case later siblings are
    /// shifted down by one to make room.
    pub async fn add_task(&self, new: NewTask) -> Result<Task, TaskError> {
        let _gate = self.history.lock_writes().await;
        let due_date = new.due_date.as_deref().map(normalize_date).transpose()?;
        let parent_id = new.parent_id.unwrap_or_else(|| ROOT_PARENT.to_string());
        let siblings = self
            .store
            .query_by_field(FieldQuery::ParentId(parent_id.clone()))
            .await?;

        let mut ops = Vec::new();
        let order = match new.insert_after_order {
            Some(after) => {
                let order = after + 1;
                for sibling in siblings.iter().filter(|s| s.order >= order) {
                    ops.push(Operation::Update {
                        id: sibling.id.clone(),
                        prior: TaskPatch::order(sibling.order),
                        next: TaskPatch::order(sibling.order + 1),
                    });
                }
                order
            }
            None => siblings.iter().map(|s| s.order).max().unwrap_or(0) + 1,
        };

        let mut task = Task::new(Ulid::new().to_string(), new.text, Utc::now());
        task.parent_id = parent_id;
        task.tags = dedup_tags(new.tags);
        task.due_date = due_date;
        task.notes = new.notes;
        task.order = order;

        ops.push(Operation::Add { task: task.clone() });
        self.commit(Operation::Batch { ops }).await?;
        Ok(task)
    }

    /// Apply a partial update. Returns the updated task, or `None` if it
    /// does not exist.
    pub async fn update_task(&self, id: &str, updates: TaskPatch) -> Result<Option<Task>, TaskError> {
        let _gate = self.history.lock_writes().await;
        self.update_locked(id, updates).await
    }

    async fn update_locked(&self, id: &str, mut updates: TaskPatch) -> Result<Option<Task>, TaskError> {
        let Some(mut task) = self.store.get(id).await? else {
            tracing::debug!(id, "update of missing task ignored");
            return Ok(None);
        };
        if updates.is_empty() {
            return Ok(Some(task));
        }
        if let Some(Some(date)) = &mut updates.due_date {
            *date = normalize_date(date)?;
        }
        if let Some(parent) = &updates.parent_id {
            self.ensure_not_descendant(id, parent).await?;
        }

        let prior = updates.snapshot_of(&task);
        updates.apply_to(&mut task);
        self.commit(Operation::Update {
            id: id.to_string(),
            prior,
            next: updates,
        })
        .await?;
        Ok(Some(task))
    }

    pub async fn toggle_task_completion(&self, id: &str, completed: bool) -> Result<Option<Task>, TaskError> {
        self.update_task(id, TaskPatch::completed(completed)).await
    }

    /// Add or remove a task from the focus queue. Newly focused tasks go to
    /// the bottom of the queue.
    pub async fn toggle_focus(&self, id: &str, is_focused: bool) -> Result<Option<Task>, TaskError> {
        let patch = TaskPatch {
            is_focused: Some(is_focused),
            focus_order: is_focused.then(|| Utc::now().timestamp_millis()),
            ..Default::default()
        };
        self.update_task(id, patch).await
    }

    pub async fn set_text(&self, id: &str, text: impl Into<String>) -> Result<Option<Task>, TaskError> {
        self.update_task(id, TaskPatch::text(text)).await
    }

    pub async fn set_notes(&self, id: &str, notes: Option<String>) -> Result<Option<Task>, TaskError> {
        let notes = notes.filter(|n| !n.trim().is_empty());
        self.update_task(
            id,
            TaskPatch {
                notes: Some(notes),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_due_date(&self, id: &str, due_date: Option<String>) -> Result<Option<Task>, TaskError> {
        self.update_task(id, TaskPatch::due_date(due_date)).await
    }

    pub async fn add_tag(&self, id: &str, tag: &str) -> Result<Option<Task>, TaskError> {
        let _gate = self.history.lock_writes().await;
        let Some(task) = self.store.get(id).await? else {
            return Ok(None);
        };
        let tag = tag.trim_start_matches('#');
        if tag.is_empty() || task.tags.iter().any(|t| t == tag) {
            return Ok(Some(task));
        }
        let mut tags = task.tags.clone();
        tags.push(tag.to_string());
        self.update_locked(
            id,
            TaskPatch {
                tags: Some(tags),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn remove_tag(&self, id: &str, tag: &str) -> Result<Option<Task>, TaskError> {
        let _gate = self.history.lock_writes().await;
        let Some(task) = self.store.get(id).await? else {
            return Ok(None);
        };
        let tag = tag.trim_start_matches('#');
        if !task.tags.iter().any(|t| t == tag) {
            return Ok(Some(task));
        }
        let tags = task.tags.iter().filter(|t| *t != tag).cloned().collect();
        self.update_locked(
            id,
            TaskPatch {
                tags: Some(tags),
                ..Default::default()
            },
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Delete a task and its whole subtree. Returns how many tasks were
    /// removed (0 if `id` does not exist).
    pub async fn delete_task(&self, id: &str) -> Result<usize, TaskError> {
        let _gate = self.history.lock_writes().await;
        let Some(root) = self.store.get(id).await? else {
            return Ok(0);
        };

        let mut seen: HashSet<String> = HashSet::from([root.id.clone()]);
        let mut queue: VecDeque<String> = VecDeque::from([root.id.clone()]);
        let mut collected = vec![root];
        while let Some(current) = queue.pop_front() {
            let children = self
                .store
                .query_by_field(FieldQuery::ParentId(current))
                .await?;
            for child in children {
                if seen.insert(child.id.clone()) {
                    queue.push_back(child.id.clone());
                    collected.push(child);
                }
            }
        }

        let count = collected.len();
        let ops = collected
            .into_iter()
            .map(|task| Operation::Delete { task })
            .collect();
        self.commit(Operation::Batch { ops }).await?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Reorder
    // -----------------------------------------------------------------------

    /// Move a task under `new_parent_id` at `drop_index` among its new
    /// siblings, renumbering the sibling `order` values `0..n-1`.
    /// Returns `false` when nothing changed.
    pub async fn reorder_siblings(
        &self,
        dragged_id: &str,
        new_parent_id: &str,
        drop_index: usize,
    ) -> Result<bool, TaskError> {
        let _gate = self.history.lock_writes().await;
        let Some(dragged) = self.store.get(dragged_id).await? else {
            return Ok(false);
        };
        if new_parent_id != ROOT_PARENT && self.store.get(new_parent_id).await?.is_none() {
            tracing::warn!(dragged_id, new_parent_id, "reorder target parent missing");
            return Ok(false);
        }
        self.ensure_not_descendant(dragged_id, new_parent_id).await?;

        let mut siblings: Vec<Task> = self
            .store
            .query_by_field(FieldQuery::ParentId(new_parent_id.to_string()))
            .await?
            .into_iter()
            .filter(|t| t.id != dragged_id)
            .collect();
        sort_group(&mut siblings, SortKey::Order);

        let mut ops = Vec::new();
        if dragged.parent_id != new_parent_id {
            ops.push(Operation::Update {
                id: dragged.id.clone(),
                prior: TaskPatch::parent_id(dragged.parent_id.clone()),
                next: TaskPatch::parent_id(new_parent_id),
            });
        }
        ops.extend(dense_reassignment(siblings, dragged, drop_index, SortKey::Order)?);
        self.commit_reorder(ops).await
    }

    /// Reposition a task inside the due-date bucket `target_date` (`None` =
    /// the no-date bucket), renumbering `section_order`. The task's own due
    /// date is not touched; see [`Self::move_to_section`].
    pub async fn reorder_in_section(
        &self,
        dragged_id: &str,
        target_date: Option<&str>,
        drop_index: usize,
    ) -> Result<bool, TaskError> {
        let _gate = self.history.lock_writes().await;
        let Some(dragged) = self.store.get(dragged_id).await? else {
            return Ok(false);
        };
        let target = target_date.map(normalize_date).transpose()?;
        let ops = self.section_ops(dragged, target.as_deref(), drop_index).await?;
        self.commit_reorder(ops).await
    }

    /// Set a task's due date and place it at `drop_index` in the target
    /// bucket, as a single undo step.
    pub async fn move_to_section(
        &self,
        dragged_id: &str,
        target_date: Option<&str>,
        drop_index: usize,
    ) -> Result<bool, TaskError> {
        let _gate = self.history.lock_writes().await;
        let Some(dragged) = self.store.get(dragged_id).await? else {
            return Ok(false);
        };
        let target = target_date.map(normalize_date).transpose()?;

        let mut ops = Vec::new();
        if dragged.due_date != target {
            ops.push(Operation::Update {
                id: dragged.id.clone(),
                prior: TaskPatch::due_date(dragged.due_date.clone()),
                next: TaskPatch::due_date(target.clone()),
            });
        }
        ops.extend(self.section_ops(dragged, target.as_deref(), drop_index).await?);
        self.commit_reorder(ops).await
    }

    async fn section_ops(
        &self,
        dragged: Task,
        target_date: Option<&str>,
        drop_index: usize,
    ) -> Result<Vec<Operation>, TaskError> {
        let mut group: Vec<Task> = self
            .store
            .query_by_field(FieldQuery::DueDate(target_date.map(str::to_string)))
            .await?
            .into_iter()
            .filter(|t| t.id != dragged.id)
            .collect();
        sort_group(&mut group, SortKey::SectionOrder);
        dense_reassignment(group, dragged, drop_index, SortKey::SectionOrder)
    }

    /// Reposition a task inside the focus queue, renumbering `focus_order`.
    pub async fn reorder_in_focus(&self, dragged_id: &str, drop_index: usize) -> Result<bool, TaskError> {
        let _gate = self.history.lock_writes().await;
        let Some(dragged) = self.store.get(dragged_id).await? else {
            return Ok(false);
        };
        if !dragged.is_focused {
            tracing::debug!(dragged_id, "focus reorder of unfocused task ignored");
            return Ok(false);
        }
        let mut group: Vec<Task> = self
            .store
            .query_by_field(FieldQuery::Focused(true))
            .await?
            .into_iter()
            .filter(|t| t.id != dragged_id)
            .collect();
        sort_group(&mut group, SortKey::FocusOrder);
        let ops = dense_reassignment(group, dragged, drop_index, SortKey::FocusOrder)?;
        self.commit_reorder(ops).await
    }

    async fn commit_reorder(&self, ops: Vec<Operation>) -> Result<bool, TaskError> {
        if ops.is_empty() {
            return Ok(false);
        }
        self.commit(Operation::Batch { ops }).await?;
        Ok(true)
    }

    /// Refuse to place `task_id` under itself or any of its descendants.
    async fn ensure_not_descendant(&self, task_id: &str, new_parent_id: &str) -> Result<(), TaskError> {
        let mut current = new_parent_id.to_string();
        let mut visited = HashSet::new();
        while current != ROOT_PARENT && visited.insert(current.clone()) {
            if current == task_id {
                return Err(TaskError::Cycle {
                    task: task_id.to_string(),
                    parent: new_parent_id.to_string(),
                });
            }
            match self.store.get(&current).await? {
                Some(task) => current = task.parent_id,
                None => break,
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Every distinct tag, sorted. Never fails: store errors (including a
    /// signed-out user) yield an empty list.
    pub async fn get_all_tags(&self) -> Vec<String> {
        match self.store.list_all().await {
            Ok(tasks) => tasks
                .into_iter()
                .flat_map(|t| t.tags)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "could not list tags");
                Vec::new()
            }
        }
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, TaskError> {
        Ok(self.store.list_all().await?)
    }
}

/// Parse a due date and return its canonical `YYYY-MM-DD` form, so equal
/// calendar days always compare equal as strings.
fn normalize_date(date: &str) -> Result<String, TaskError> {
    parse_local_date(date)
        .map(format_date)
        .ok_or_else(|| TaskError::InvalidDate(date.to_string()))
}

fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim_start_matches('#').to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
