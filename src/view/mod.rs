//! Pure transform from a flat task list plus filters to a render tree.
//!
//! Nothing here touches the store or the clock: callers pass `today` in,
//! so the same inputs always give the same tree.

pub mod filter;
pub mod tree;

pub use filter::{Bucket, SearchQuery, SectionFilter, StatusFilter};
pub use tree::{RootOrder, TreeNode, assemble, flatten, strict_match};

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::task::Task;

/// Inputs that select what a view shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
    pub section: SectionFilter,
    pub status: StatusFilter,
    pub search: Option<String>,
}

impl ViewQuery {
    pub fn section(section: SectionFilter) -> Self {
        ViewQuery {
            section,
            ..Default::default()
        }
    }
}

/// The inbox grouped into due-date buckets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxBuckets {
    pub past: Vec<TreeNode>,
    pub today: Vec<TreeNode>,
    pub upcoming: Vec<TreeNode>,
    pub no_date: Vec<TreeNode>,
}

/// A built view, ready to render
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum TaskView {
    /// All tasks, grouped by due-date bucket
    Inbox(InboxBuckets),
    /// A single date-based section
    Section {
        section: SectionFilter,
        roots: Vec<TreeNode>,
    },
    /// Strict-match search results
    Search { query: String, roots: Vec<TreeNode> },
    /// The flat focus queue
    Focus { tasks: Vec<TreeNode> },
}

impl TaskView {
    /// Named groups in display order. Single-group views have one entry.
    pub fn groups(&self) -> Vec<(&'static str, &[TreeNode])> {
        match self {
            TaskView::Inbox(b) => vec![
                ("Past", b.past.as_slice()),
                ("Today", b.today.as_slice()),
                ("Upcoming", b.upcoming.as_slice()),
                ("No date", b.no_date.as_slice()),
            ],
            TaskView::Section { roots, .. } => vec![("Tasks", roots.as_slice())],
            TaskView::Search { roots, .. } => vec![("Results", roots.as_slice())],
            TaskView::Focus { tasks } => vec![("Focus", tasks.as_slice())],
        }
    }

    /// Total number of tasks shown
    pub fn task_count(&self) -> usize {
        self.groups()
            .into_iter()
            .flat_map(|(_, nodes)| nodes.iter())
            .map(TreeNode::count)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }
}

/// Build the view for `query` over `tasks` as of the local date `today`.
///
/// The status filter narrows the working set first. Then, in priority
/// order: focus mode flattens the focus queue; a search query produces a
/// strict-match tree; `All` groups the inbox into buckets; any other
/// section produces a single strict-match tree.
pub fn build_view(tasks: &[Task], query: &ViewQuery, today: NaiveDate) -> TaskView {
    let working: Vec<&Task> = tasks.iter().filter(|t| query.status.allows(t)).collect();
    let search = SearchQuery::parse(query.search.as_deref());

    if query.section == SectionFilter::Focus {
        return focus_queue(&working, search.as_ref());
    }

    if let Some(search) = search {
        return TaskView::Search {
            query: query.search.as_deref().unwrap_or_default().trim().to_string(),
            roots: strict_match(&working, |t| search.matches(t), RootOrder::Natural),
        };
    }

    match query.section {
        SectionFilter::All => TaskView::Inbox(inbox_buckets(&working, today)),
        SectionFilter::NoDate => TaskView::Section {
            section: SectionFilter::NoDate,
            roots: no_date_tree(&working, today),
        },
        section => {
            let roots =
                strict_match(&working, |t| section.includes(t, today), RootOrder::SectionOrder);
            TaskView::Section { section, roots }
        }
    }
}

/// Partition into the four inbox buckets. The dated buckets are
/// strict-match trees; the no-date bucket is the ordinary tree of undated
/// tasks.
pub fn inbox_buckets(working: &[&Task], today: NaiveDate) -> InboxBuckets {
    let dated = |bucket: Bucket| {
        strict_match(working, |t| Bucket::of(t, today) == bucket, RootOrder::SectionOrder)
    };
    InboxBuckets {
        past: dated(Bucket::Past),
        today: dated(Bucket::Today),
        upcoming: dated(Bucket::Upcoming),
        no_date: no_date_tree(working, today),
    }
}

fn no_date_tree(working: &[&Task], today: NaiveDate) -> Vec<TreeNode> {
    let undated: Vec<&Task> = working
        .iter()
        .copied()
        .filter(|t| Bucket::of(t, today) == Bucket::NoDate)
        .collect();
    assemble(&undated, RootOrder::Natural)
}

fn focus_queue(working: &[&Task], search: Option<&SearchQuery>) -> TaskView {
    let mut focused: Vec<&Task> = working
        .iter()
        .copied()
        .filter(|t| t.is_focused && search.is_none_or(|q| q.matches(t)))
        .collect();
    focused.sort_by_key(|t| t.focus_order);
    TaskView::Focus {
        tasks: focused.into_iter().cloned().map(TreeNode::leaf).collect(),
    }
}
