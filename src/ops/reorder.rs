use crate::model::task::{Task, TaskPatch};
use crate::ops::task_ops::TaskError;
use crate::ops::undo::Operation;

/// Which sort key a reorder rewrites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Position among siblings
    Order,
    /// Position within a due-date bucket
    SectionOrder,
    /// Position in the focus queue
    FocusOrder,
}

impl SortKey {
    pub fn get(self, task: &Task) -> i64 {
        match self {
            SortKey::Order => task.order,
            SortKey::SectionOrder => task.section_order,
            SortKey::FocusOrder => task.focus_order,
        }
    }

    pub fn patch(self, value: i64) -> TaskPatch {
        let mut patch = TaskPatch::default();
        match self {
            SortKey::Order => patch.order = Some(value),
            SortKey::SectionOrder => patch.section_order = Some(value),
            SortKey::FocusOrder => patch.focus_order = Some(value),
        }
        patch
    }
}

/// Stable sort of a group by the given key
pub fn sort_group(group: &mut [Task], key: SortKey) {
    group.sort_by_key(|t| key.get(t));
}

/// Splice `dragged` into `group` at `drop_index` and renumber the result
/// `0..n-1`.
///
/// `group` must already exclude the dragged task and be sorted by `key`.
/// Returns one `Update` per task whose key actually changes, in list order.
/// An index past the end of the group is rejected before anything is
/// computed.
pub fn dense_reassignment(
    mut group: Vec<Task>,
    dragged: Task,
    drop_index: usize,
    key: SortKey,
) -> Result<Vec<Operation>, TaskError> {
    if drop_index > group.len() {
        return Err(TaskError::InvalidPosition {
            index: drop_index,
            len: group.len(),
        });
    }
    group.insert(drop_index, dragged);

    Ok(group
        .iter()
        .enumerate()
        .filter_map(|(i, task)| {
            let old = key.get(task);
            let new = i as i64;
            (old != new).then(|| Operation::Update {
                id: task.id.clone(),
                prior: key.patch(old),
                next: key.patch(new),
            })
        })
        .collect())
}
