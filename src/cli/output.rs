use chrono::NaiveDate;
use serde::Serialize;

use crate::model::task::Task;
use crate::ops::undo::{HistorySnapshot, HistoryStatus, Operation};
use crate::util::unicode::{pad_to_width, truncate_to_width};
use crate::view::{Bucket, TaskView, TreeNode, flatten};

/// Characters of the id shown in text listings
const SHORT_ID_LEN: usize = 6;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct MutationJson<'a> {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<&'a Task>,
    pub history: HistoryStatus,
}

#[derive(Serialize)]
pub struct DeleteJson {
    pub deleted: usize,
    pub history: HistoryStatus,
}

#[derive(Serialize)]
pub struct UndoJson {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    pub history: HistoryStatus,
}

#[derive(Serialize)]
pub struct HistoryEntryJson {
    pub description: String,
    pub changes: usize,
}

#[derive(Serialize)]
pub struct HistoryJson {
    pub undo: Vec<HistoryEntryJson>,
    pub redo: Vec<HistoryEntryJson>,
}

/// Newest entry first
pub fn history_to_json(snapshot: &HistorySnapshot) -> HistoryJson {
    let entries = |ops: &[Operation]| {
        ops.iter()
            .rev()
            .map(|op| HistoryEntryJson {
                description: op.describe(),
                changes: op.len(),
            })
            .collect()
    };
    HistoryJson {
        undo: entries(&snapshot.undo),
        redo: entries(&snapshot.redo),
    }
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

/// The tail of the id, which is the random part of a ULID
pub fn short_id(id: &str) -> &str {
    let start = id
        .char_indices()
        .rev()
        .nth(SHORT_ID_LEN - 1)
        .map_or(0, |(i, _)| i);
    &id[start..]
}

/// Format a single task as a one-line summary
pub fn format_task_line(task: &Task, today: NaiveDate) -> String {
    let check = if task.completed { 'x' } else { ' ' };
    let mut line = format!("[{}] {} {}", check, short_id(&task.id), task.text);
    for tag in &task.tags {
        line.push_str(" #");
        line.push_str(tag);
    }
    if let Some(due) = &task.due_date {
        let marker = match Bucket::of(task, today) {
            Bucket::Past if !task.completed => "!",
            _ => "",
        };
        line.push_str(&format!(" (due {}{})", due, marker));
    }
    if task.is_focused {
        line.push_str(" *");
    }
    line
}

fn format_nodes(nodes: &[TreeNode], today: NaiveDate, width: Option<usize>, lines: &mut Vec<String>) {
    for (depth, node) in flatten(nodes) {
        let line = format!("{}{}", "  ".repeat(depth), format_task_line(&node.task, today));
        lines.push(match width {
            Some(w) => truncate_to_width(&line, w),
            None => line,
        });
    }
}

/// Render a built view as indented text. Empty groups are omitted.
pub fn format_view(view: &TaskView, today: NaiveDate, width: Option<usize>) -> Vec<String> {
    let mut lines = Vec::new();
    if view.is_empty() {
        lines.push("no tasks".to_string());
        return lines;
    }
    let headed = matches!(view, TaskView::Inbox(_));
    for (name, nodes) in view.groups() {
        if nodes.is_empty() {
            continue;
        }
        if headed {
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.push(format!("== {} ==", name));
        }
        format_nodes(nodes, today, width, &mut lines);
    }
    lines
}

/// Format detailed task view
pub fn format_task_detail(task: &Task) -> Vec<String> {
    let check = if task.completed { 'x' } else { ' ' };
    let mut lines = vec![format!("[{}] {} {}", check, task.id, task.text)];
    if !task.tags.is_empty() {
        let tags: Vec<String> = task.tags.iter().map(|t| format!("#{}", t)).collect();
        lines.push(format!("tags: {}", tags.join(" ")));
    }
    if let Some(due) = &task.due_date {
        lines.push(format!("due: {}", due));
    }
    if !task.is_top_level() {
        lines.push(format!("parent: {}", task.parent_id));
    }
    if task.is_focused {
        lines.push("focused".to_string());
    }
    if let Some(notes) = &task.notes {
        lines.push("note:".to_string());
        for line in notes.lines() {
            lines.push(format!("  {}", line));
        }
    }
    lines
}

/// Undo entries newest first, then the redo stack
pub fn format_history(snapshot: &HistorySnapshot) -> Vec<String> {
    let mut lines = Vec::new();
    let mut section = |label: &str, ops: &[Operation]| {
        lines.push(format!("{} ({}):", label, ops.len()));
        for (i, op) in ops.iter().rev().enumerate() {
            lines.push(format!("  {} {}", pad_to_width(&format!("{}.", i + 1), 4), op.describe()));
        }
    };
    section("undo", &snapshot.undo);
    section("redo", &snapshot.redo);
    lines
}

pub fn format_status(status: HistoryStatus) -> String {
    format!("undo: {}  redo: {}", status.undo_len, status.redo_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{ViewQuery, build_view};
    use chrono::{TimeZone, Utc};
    use insta::assert_snapshot;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn task(id: &str, parent: &str, text: &str, order: i64) -> Task {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut t = Task::new(id, text, created);
        t.parent_id = parent.into();
        t.order = order;
        t
    }

    fn sample() -> Vec<Task> {
        let mut report = task("01AAAAAAAAAAAAAAAAAAREPORT", "root", "Write report", 0);
        report.due_date = Some("2024-01-10".into());
        report.tags = vec!["work".into()];
        let mut draft = task("01AAAAAAAAAAAAAAAAAADRAFT1", "01AAAAAAAAAAAAAAAAAAREPORT", "Draft", 0);
        draft.due_date = Some("2024-01-10".into());
        draft.completed = true;
        let mut call = task("01AAAAAAAAAAAAAAAAAACALLMA", "root", "Call mum", 1);
        call.due_date = Some("2024-01-15".into());
        call.is_focused = true;
        let garden = task("01AAAAAAAAAAAAAAAAAGARDEN", "root", "Garden", 2);
        let seeds = task("01AAAAAAAAAAAAAAAAAASEEDSX", "01AAAAAAAAAAAAAAAAAGARDEN", "Buy seeds", 0);
        vec![report, draft, call, garden, seeds]
    }

    #[test]
    fn inbox_renders_grouped_tree() {
        let today = d(2024, 1, 15);
        let view = build_view(&sample(), &ViewQuery::default(), today);
        let output = format_view(&view, today, None).join("\n");
        assert_snapshot!(output, @r"
        == Past ==
        [ ] REPORT Write report #work (due 2024-01-10!)
          [x] DRAFT1 Draft (due 2024-01-10)

        == Today ==
        [ ] CALLMA Call mum (due 2024-01-15) *

        == No date ==
        [ ] GARDEN Garden
          [ ] SEEDSX Buy seeds
        ");
    }

    #[test]
    fn width_truncates_lines() {
        let today = d(2024, 1, 15);
        let view = build_view(&sample(), &ViewQuery::default(), today);
        let lines = format_view(&view, today, Some(16));
        assert_eq!(lines[1], "[ ] REPORT Writ\u{2026}");
    }

    #[test]
    fn empty_view_says_so() {
        let view = build_view(&[], &ViewQuery::default(), d(2024, 1, 15));
        assert_eq!(format_view(&view, d(2024, 1, 15), None), vec!["no tasks"]);
    }

    #[test]
    fn short_id_takes_the_tail() {
        assert_eq!(short_id("01HX0000000000000000ABCDEF"), "ABCDEF");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn history_lists_newest_first() {
        let snapshot = HistorySnapshot {
            undo: vec![
                Operation::Add { task: task("a", "root", "first", 0) },
                Operation::Add { task: task("b", "root", "second", 1) },
            ],
            redo: vec![],
        };
        assert_snapshot!(format_history(&snapshot).join("\n"), @r#"
        undo (2):
          1.   add "second"
          2.   add "first"
        redo (0):
        "#);
    }
}
