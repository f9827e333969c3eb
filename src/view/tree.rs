use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::model::task::Task;

/// One task in a rendered tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(task: Task) -> Self {
        TreeNode {
            task,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::count).sum::<usize>()
    }

    /// Depth-first pre-order walk with depth (0 = this node)
    pub fn walk<'a>(&'a self, depth: usize, out: &mut Vec<(usize, &'a TreeNode)>) {
        out.push((depth, self));
        for child in &self.children {
            child.walk(depth + 1, out);
        }
    }
}

/// Flatten a forest into `(depth, node)` pairs in display order
pub fn flatten(roots: &[TreeNode]) -> Vec<(usize, &TreeNode)> {
    let mut out = Vec::new();
    for root in roots {
        root.walk(0, &mut out);
    }
    out
}

/// How the roots of an assembled tree are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootOrder {
    /// Input order
    Natural,
    /// By `section_order` (date-bucket views)
    SectionOrder,
}

/// Build a forest from a working set of tasks.
///
/// A task hangs under its parent when the parent is also in the working
/// set, otherwise it becomes a root; this is how dangling parent ids show
/// up at the top level. Children are sorted by `order` at every level.
pub fn assemble(working: &[&Task], root_order: RootOrder) -> Vec<TreeNode> {
    let ids: HashSet<&str> = working.iter().map(|t| t.id.as_str()).collect();
    let mut children: HashMap<&str, Vec<&Task>> = HashMap::new();
    let mut roots: Vec<&Task> = Vec::new();

    for &task in working {
        let parent = task.parent_id.as_str();
        if parent != task.id && ids.contains(parent) {
            children.entry(parent).or_default().push(task);
        } else {
            roots.push(task);
        }
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|t| t.order);
    }
    if root_order == RootOrder::SectionOrder {
        roots.sort_by_key(|t| t.section_order);
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut forest: Vec<TreeNode> = roots
        .into_iter()
        .filter_map(|task| build_node(task, &children, &mut visited))
        .collect();

    // Tasks whose parent chain loops back on itself never hang off a root.
    for &task in working {
        if !visited.contains(task.id.as_str())
            && let Some(node) = build_node(task, &children, &mut visited)
        {
            forest.push(node);
        }
    }
    forest
}

fn build_node<'a>(
    task: &'a Task,
    children: &HashMap<&str, Vec<&'a Task>>,
    visited: &mut HashSet<&'a str>,
) -> Option<TreeNode> {
    if !visited.insert(task.id.as_str()) {
        return None;
    }
    let kids = children
        .get(task.id.as_str())
        .map(|kids| {
            kids.iter()
                .filter_map(|&child| build_node(child, children, visited))
                .collect()
        })
        .unwrap_or_default();
    Some(TreeNode {
        task: task.clone(),
        children: kids,
    })
}

/// Build a forest of only the tasks satisfying `predicate`.
///
/// Non-matching tasks are dropped entirely, ancestors included. A match
/// whose parent does not match is hoisted to the top level, keeping any
/// matching descendants beneath it.
pub fn strict_match<F>(tasks: &[&Task], predicate: F, root_order: RootOrder) -> Vec<TreeNode>
where
    F: Fn(&Task) -> bool,
{
    let matched: Vec<&Task> = tasks.iter().copied().filter(|t| predicate(t)).collect();
    assemble(&matched, root_order)
}
