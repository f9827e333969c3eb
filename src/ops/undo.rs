use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};

use crate::model::task::{Task, TaskPatch};
use crate::store::{StoreError, TaskStore};

/// Maximum number of entries kept on each stack
pub const HISTORY_LIMIT: usize = 50;

/// Error type for undo/redo
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("could not replay history: {0}")]
    Store(#[from] StoreError),
}

/// A single reversible change to the task store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Operation {
    /// A task was created (full snapshot)
    Add { task: Task },
    /// A task was removed (full snapshot, used to resurrect it)
    Delete { task: Task },
    /// Some fields of a task changed
    Update {
        id: String,
        /// Values of the changed fields before the change
        prior: TaskPatch,
        /// Values of the changed fields after the change
        next: TaskPatch,
    },
    /// Sub-operations undone and redone as one step
    Batch { ops: Vec<Operation> },
}

impl Operation {
    /// Short human-readable summary for history listings
    pub fn describe(&self) -> String {
        match self {
            Operation::Add { task } => format!("add \"{}\"", task.text),
            Operation::Delete { task } => format!("delete \"{}\"", task.text),
            Operation::Update { id, next, .. } => {
                format!("update {} ({})", id, next.keys().join(", "))
            }
            Operation::Batch { ops } => {
                let adds: Vec<_> = ops
                    .iter()
                    .filter_map(|op| match op {
                        Operation::Add { task } => Some(task),
                        _ => None,
                    })
                    .collect();
                let deletes = ops
                    .iter()
                    .filter(|op| matches!(op, Operation::Delete { .. }))
                    .count();
                if let [task] = adds.as_slice() {
                    format!("add \"{}\"", task.text)
                } else if deletes > 0 {
                    let first = ops.iter().find_map(|op| match op {
                        Operation::Delete { task } => Some(task.text.as_str()),
                        _ => None,
                    });
                    match (deletes, first) {
                        (1, Some(text)) => format!("delete \"{}\"", text),
                        (n, Some(text)) => format!("delete \"{}\" and {} subtasks", text, n - 1),
                        _ => format!("delete {} tasks", deletes),
                    }
                } else {
                    format!("move ({} changes)", ops.len())
                }
            }
        }
    }

    /// Number of leaf (non-batch) operations
    pub fn len(&self) -> usize {
        match self {
            Operation::Batch { ops } => ops.iter().map(Operation::len).sum(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counts reported to listeners after every history change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HistoryStatus {
    pub undo_len: usize,
    pub redo_len: usize,
}

impl HistoryStatus {
    pub fn can_undo(&self) -> bool {
        self.undo_len > 0
    }

    pub fn can_redo(&self) -> bool {
        self.redo_len > 0
    }
}

/// Serializable copy of both stacks, oldest entry first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    #[serde(default)]
    pub undo: Vec<Operation>,
    #[serde(default)]
    pub redo: Vec<Operation>,
}

/// The undo/redo stacks
#[derive(Debug, Clone)]
pub struct UndoStack {
    undo: Vec<Operation>,
    redo: Vec<Operation>,
    limit: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoStack {
    pub fn new() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        UndoStack {
            undo: Vec::new(),
            redo: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Push a new operation. Evicts the oldest past the limit and clears redo.
    pub fn push(&mut self, op: Operation) {
        self.push_undo(op);
        self.redo.clear();
    }

    fn push_undo(&mut self, op: Operation) {
        self.undo.push(op);
        if self.undo.len() > self.limit {
            self.undo.drain(..self.undo.len() - self.limit);
        }
    }

    fn push_redo(&mut self, op: Operation) {
        self.redo.push(op);
        if self.redo.len() > self.limit {
            self.redo.drain(..self.redo.len() - self.limit);
        }
    }

    pub fn status(&self) -> HistoryStatus {
        HistoryStatus {
            undo_len: self.undo.len(),
            redo_len: self.redo.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }

    pub fn peek_last_undo(&self) -> Option<&Operation> {
        self.undo.last()
    }

    pub fn peek_last_redo(&self) -> Option<&Operation> {
        self.redo.last()
    }
}

type Listener = Arc<dyn Fn(HistoryStatus) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Handle returned by [`HistoryManager::subscribe`]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    /// Stop receiving change notifications
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// The shared undo/redo timeline.
///
/// Undo, redo and every engine mutation run under one async write gate, so
/// a second call issued while one is in flight waits for it instead of
/// interleaving store writes.
pub struct HistoryManager {
    stack: Mutex<UndoStack>,
    listeners: Arc<Mutex<Listeners>>,
    gate: tokio::sync::Mutex<()>,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryManager {
    pub fn new() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self::from_stack(UndoStack::with_limit(limit))
    }

    fn from_stack(stack: UndoStack) -> Self {
        HistoryManager {
            stack: Mutex::new(stack),
            listeners: Arc::new(Mutex::new(Listeners::default())),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Rebuild a manager from a persisted snapshot, keeping the newest
    /// `limit` entries of each stack.
    pub fn from_snapshot(snapshot: HistorySnapshot, limit: usize) -> Self {
        let mut stack = UndoStack::with_limit(limit);
        for op in snapshot.undo {
            stack.push_undo(op);
        }
        for op in snapshot.redo {
            stack.push_redo(op);
        }
        Self::from_stack(stack)
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        let stack = lock(&self.stack);
        HistorySnapshot {
            undo: stack.undo.clone(),
            redo: stack.redo.clone(),
        }
    }

    /// Acquire the write gate. Engine operations hold it across their
    /// read-modify-write so they never interleave with each other or with
    /// undo/redo.
    pub async fn lock_writes(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    /// Record a change that has already been applied to the store.
    pub fn push(&self, op: Operation) {
        tracing::debug!(op = %op.describe(), "history push");
        lock(&self.stack).push(op);
        self.notify();
    }

    /// Revert the most recent operation. Returns `false` when there is
    /// nothing to undo.
    ///
    /// A store failure part-way through a batch leaves the already reverted
    /// steps in place; the operation is dropped from both stacks.
    pub async fn undo(&self, store: &dyn TaskStore) -> Result<bool, HistoryError> {
        let _gate = self.gate.lock().await;
        let Some(op) = lock(&self.stack).undo.pop() else {
            return Ok(false);
        };

        let result = apply_inverse(&op, store).await;
        match &result {
            Ok(()) => {
                tracing::info!(op = %op.describe(), "undo");
                lock(&self.stack).push_redo(op);
            }
            Err(e) => tracing::warn!(error = %e, op = %op.describe(), "undo failed"),
        }
        self.notify();
        result?;
        Ok(true)
    }

    /// Re-apply the most recently undone operation. Returns `false` when
    /// there is nothing to redo.
    pub async fn redo(&self, store: &dyn TaskStore) -> Result<bool, HistoryError> {
        let _gate = self.gate.lock().await;
        let Some(op) = lock(&self.stack).redo.pop() else {
            return Ok(false);
        };

        let result = apply_forward(&op, store).await;
        match &result {
            Ok(()) => {
                tracing::info!(op = %op.describe(), "redo");
                lock(&self.stack).push_undo(op);
            }
            Err(e) => tracing::warn!(error = %e, op = %op.describe(), "redo failed"),
        }
        self.notify();
        result?;
        Ok(true)
    }

    /// Drop all history. Only reached through an explicit user action.
    pub fn clear(&self) {
        {
            let mut stack = lock(&self.stack);
            stack.undo.clear();
            stack.redo.clear();
        }
        self.notify();
    }

    pub fn status(&self) -> HistoryStatus {
        lock(&self.stack).status()
    }

    pub fn peek_undo(&self) -> Option<Operation> {
        lock(&self.stack).peek_last_undo().cloned()
    }

    pub fn peek_redo(&self) -> Option<Operation> {
        lock(&self.stack).peek_last_redo().cloned()
    }

    /// Register a change listener. It is called with the new stack sizes
    /// after every push, undo, redo and clear.
    pub fn subscribe(&self, listener: impl Fn(HistoryStatus) + Send + Sync + 'static) -> Subscription {
        let mut listeners = lock(&self.listeners);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    fn notify(&self) {
        let status = self.status();
        // Listeners run without the registry lock so they may (un)subscribe.
        let listeners: Vec<Listener> = lock(&self.listeners)
            .entries
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(status);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type StoreFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

/// Apply the inverse of an operation (for undo)
pub fn apply_inverse<'a>(op: &'a Operation, store: &'a dyn TaskStore) -> StoreFuture<'a> {
    Box::pin(async move {
        match op {
            Operation::Add { task } => store.delete(&task.id).await,
            Operation::Delete { task } => store.set(task.clone()).await,
            Operation::Update { id, prior, .. } => store.update(id, prior).await,
            Operation::Batch { ops } => {
                // Last applied is undone first
                for op in ops.iter().rev() {
                    apply_inverse(op, store).await?;
                }
                Ok(())
            }
        }
    })
}

/// Apply an operation forward (for redo, and for the initial change)
pub fn apply_forward<'a>(op: &'a Operation, store: &'a dyn TaskStore) -> StoreFuture<'a> {
    Box::pin(async move {
        match op {
            Operation::Add { task } => store.set(task.clone()).await,
            Operation::Delete { task } => store.delete(&task.id).await,
            Operation::Update { id, next, .. } => store.update(id, next).await,
            Operation::Batch { ops } => {
                for op in ops {
                    apply_forward(op, store).await?;
                }
                Ok(())
            }
        }
    })
}
