use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::util::dates::parse_local_date;

/// Sentinel `parent_id` for top-level tasks
pub const ROOT_PARENT: &str = "root";

/// A single task record as persisted in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Opaque unique id, never changes after creation
    pub id: String,
    /// Parent task id, or `"root"` for top-level tasks
    #[serde(default = "default_parent")]
    pub parent_id: String,
    /// Display text (may be empty)
    #[serde(default)]
    pub text: String,
    /// Free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// Calendar date as a plain `YYYY-MM-DD` string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Tags (without the `#` prefix), in display order
    #[serde(default)]
    pub tags: Vec<String>,
    /// Sort key among siblings with the same `parent_id`
    #[serde(default)]
    pub order: i64,
    /// Sort key among tasks with the same `due_date`
    #[serde(default)]
    pub section_order: i64,
    /// Member of the focus queue
    #[serde(default)]
    pub is_focused: bool,
    /// Sort key within the focus queue
    #[serde(default)]
    pub focus_order: i64,
    pub created_at: DateTime<Utc>,
}

fn default_parent() -> String {
    ROOT_PARENT.to_string()
}

impl Task {
    /// Create a top-level task with default ordering fields.
    pub fn new(id: impl Into<String>, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Task {
            id: id.into(),
            parent_id: default_parent(),
            text: text.into(),
            notes: None,
            completed: false,
            due_date: None,
            tags: Vec::new(),
            order: 0,
            section_order: created_at.timestamp_millis(),
            is_focused: false,
            focus_order: 0,
            created_at,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id == ROOT_PARENT
    }

    /// The due date as a local calendar date. Unparseable strings read as `None`.
    pub fn due(&self) -> Option<NaiveDate> {
        self.due_date.as_deref().and_then(parse_local_date)
    }
}

/// A partial field map over a task's mutable fields.
///
/// `None` means "leave untouched". The nullable fields (`notes`, `due_date`)
/// use `Some(None)` for "clear".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_some"
    )]
    pub notes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_some"
    )]
    pub due_date: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_focused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_order: Option<i64>,
}

/// Keeps an explicit JSON `null` as `Some(None)` instead of collapsing it.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl TaskPatch {
    pub fn parent_id(parent_id: impl Into<String>) -> Self {
        TaskPatch {
            parent_id: Some(parent_id.into()),
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        TaskPatch {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn completed(completed: bool) -> Self {
        TaskPatch {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn due_date(due_date: Option<String>) -> Self {
        TaskPatch {
            due_date: Some(due_date),
            ..Default::default()
        }
    }

    pub fn order(order: i64) -> Self {
        TaskPatch {
            order: Some(order),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Names of the fields present in this patch, in declaration order.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.parent_id.is_some() {
            keys.push("parentId");
        }
        if self.text.is_some() {
            keys.push("text");
        }
        if self.notes.is_some() {
            keys.push("notes");
        }
        if self.completed.is_some() {
            keys.push("completed");
        }
        if self.due_date.is_some() {
            keys.push("dueDate");
        }
        if self.tags.is_some() {
            keys.push("tags");
        }
        if self.order.is_some() {
            keys.push("order");
        }
        if self.section_order.is_some() {
            keys.push("sectionOrder");
        }
        if self.is_focused.is_some() {
            keys.push("isFocused");
        }
        if self.focus_order.is_some() {
            keys.push("focusOrder");
        }
        keys
    }

    /// Capture `task`'s current values for exactly the keys present in `self`.
    pub fn snapshot_of(&self, task: &Task) -> TaskPatch {
        TaskPatch {
            parent_id: self.parent_id.as_ref().map(|_| task.parent_id.clone()),
            text: self.text.as_ref().map(|_| task.text.clone()),
            notes: self.notes.as_ref().map(|_| task.notes.clone()),
            completed: self.completed.map(|_| task.completed),
            due_date: self.due_date.as_ref().map(|_| task.due_date.clone()),
            tags: self.tags.as_ref().map(|_| task.tags.clone()),
            order: self.order.map(|_| task.order),
            section_order: self.section_order.map(|_| task.section_order),
            is_focused: self.is_focused.map(|_| task.is_focused),
            focus_order: self.focus_order.map(|_| task.focus_order),
        }
    }

    /// Merge the present fields into `task`.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(parent_id) = &self.parent_id {
            task.parent_id = parent_id.clone();
        }
        if let Some(text) = &self.text {
            task.text = text.clone();
        }
        if let Some(notes) = &self.notes {
            task.notes = notes.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(due_date) = &self.due_date {
            task.due_date = due_date.clone();
        }
        if let Some(tags) = &self.tags {
            task.tags = tags.clone();
        }
        if let Some(order) = self.order {
            task.order = order;
        }
        if let Some(section_order) = self.section_order {
            task.section_order = section_order;
        }
        if let Some(is_focused) = self.is_focused {
            task.is_focused = is_focused;
        }
        if let Some(focus_order) = self.focus_order {
            task.focus_order = focus_order;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Task {
        let created = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        let mut task = Task::new("t1", "Write report", created);
        task.notes = Some("quarterly".into());
        task.due_date = Some("2024-01-20".into());
        task.tags = vec!["work".into()];
        task
    }

    #[test]
    fn new_task_sorts_by_creation_time_in_its_section() {
        let task = sample();
        assert_eq!(task.section_order, task.created_at.timestamp_millis());
        assert!(task.is_top_level());
        assert!(!task.is_focused);
        assert_eq!(task.focus_order, 0);
    }

    #[test]
    fn snapshot_captures_only_present_keys() {
        let task = sample();
        let patch = TaskPatch {
            text: Some("Ship report".into()),
            due_date: Some(None),
            ..Default::default()
        };
        let prior = patch.snapshot_of(&task);
        assert_eq!(prior.text.as_deref(), Some("Write report"));
        assert_eq!(prior.due_date, Some(Some("2024-01-20".into())));
        assert!(prior.notes.is_none());
        assert!(prior.order.is_none());
        assert_eq!(prior.keys(), vec!["text", "dueDate"]);
    }

    #[test]
    fn apply_then_apply_prior_restores() {
        let original = sample();
        let patch = TaskPatch {
            notes: Some(None),
            completed: Some(true),
            tags: Some(vec!["home".into()]),
            ..Default::default()
        };
        let prior = patch.snapshot_of(&original);

        let mut task = original.clone();
        patch.apply_to(&mut task);
        assert_eq!(task.notes, None);
        assert!(task.completed);
        assert_eq!(task.tags, vec!["home".to_string()]);

        prior.apply_to(&mut task);
        assert_eq!(task, original);
    }

    #[test]
    fn patch_json_keeps_explicit_null() {
        let patch: TaskPatch = serde_json::from_str(r#"{"dueDate":null,"text":"x"}"#).unwrap();
        assert_eq!(patch.due_date, Some(None));
        assert_eq!(patch.text.as_deref(), Some("x"));
        assert!(patch.notes.is_none());

        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"text":"x","dueDate":null}"#);
    }

    #[test]
    fn task_json_uses_camel_case_and_defaults_parent() {
        let task: Task = serde_json::from_str(
            r#"{"id":"a","text":"hi","createdAt":"2024-01-15T00:00:00Z","sectionOrder":5}"#,
        )
        .unwrap();
        assert_eq!(task.parent_id, ROOT_PARENT);
        assert_eq!(task.section_order, 5);
        assert!(task.tags.is_empty());
    }

    #[test]
    fn due_parses_plain_date_and_ignores_garbage() {
        let mut task = sample();
        assert_eq!(task.due(), NaiveDate::from_ymd_opt(2024, 1, 20));
        task.due_date = Some("next week".into());
        assert_eq!(task.due(), None);
    }
}
