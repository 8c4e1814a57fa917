//! Pure operations over a task collection: lookup, readiness and
//! dependency traversal.
//!
//! `depends_on` is not guaranteed to be acyclic, so every traversal keeps a
//! visited set.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use crate::error::{MissionError, MissionResult};

use super::{Task, TaskStatus};

/// Tasks keyed by id.
pub type TaskIndex<'a> = HashMap<&'a str, &'a Task>;

/// Index a collection by id.
pub fn build_index(tasks: &[Task]) -> TaskIndex<'_> {
    tasks.iter().map(|t| (t.id.as_str(), t)).collect()
}

/// A task is ready when it is pending and every dependency resolves to a
/// done task. Unknown dependency ids keep it blocked.
pub fn is_ready(task: &Task, index: &TaskIndex<'_>) -> bool {
    task.status == TaskStatus::Pending
        && task.depends_on.iter().all(|dep| index.get(dep.as_str()).is_some_and(|d| d.is_done()))
}

/// Ready tasks, in collection order.
pub fn queue<'a>(tasks: &'a [Task], index: &TaskIndex<'_>) -> Vec<&'a Task> {
    tasks.iter().filter(|t| is_ready(t, index)).collect()
}

/// Transitive dependencies of `task`, depth-first, each at most once.
///
/// Unknown ids are skipped. On a cycle the starting task itself can show up
/// as one of its own dependencies.
pub fn collect_deps<'a>(task: &Task, index: &TaskIndex<'a>) -> Vec<&'a Task> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    collect_into(task, index, &mut seen, &mut out);
    out
}

fn collect_into<'a>(
    task: &Task,
    index: &TaskIndex<'a>,
    seen: &mut HashSet<String>,
    out: &mut Vec<&'a Task>,
) {
    for dep_id in &task.depends_on {
        if !seen.insert(dep_id.clone()) {
            continue;
        }
        if let Some(dep) = index.get(dep_id.as_str()).copied() {
            out.push(dep);
            collect_into(dep, index, seen, out);
        }
    }
}

/// Render the dependency tree below `task`.
///
/// A node reached a second time is printed once more and followed by a
/// `(circular ref)` marker instead of its children.
pub fn render_tree(task: &Task, index: &TaskIndex<'_>) -> String {
    let mut out = String::new();
    let mut visited = HashSet::new();
    render_node(task, index, "", true, true, &mut visited, &mut out);
    out
}

fn render_node(
    task: &Task,
    index: &TaskIndex<'_>,
    prefix: &str,
    is_last: bool,
    is_root: bool,
    visited: &mut HashSet<String>,
    out: &mut String,
) {
    let connector = if is_root {
        ""
    } else if is_last {
        "└── "
    } else {
        "├── "
    };
    let _ = writeln!(out, "{prefix}{connector}{} {} [{}]", task.status.icon(), task.name, task.id);

    let child_prefix =
        if is_root || is_last { format!("{prefix}    ") } else { format!("{prefix}│   ") };

    if !visited.insert(task.id.clone()) {
        if !task.depends_on.is_empty() {
            let _ = writeln!(out, "{child_prefix}└── (circular ref)");
        }
        return;
    }

    let count = task.depends_on.len();
    for (i, dep_id) in task.depends_on.iter().enumerate() {
        let last = i + 1 == count;
        match index.get(dep_id.as_str()) {
            Some(dep) => render_node(dep, index, &child_prefix, last, false, visited, out),
            None => {
                let connector = if last { "└── " } else { "├── " };
                let _ = writeln!(out, "{child_prefix}{connector}? unknown [{dep_id}]");
            }
        }
    }
}

/// Look a task up by exact id, falling back to a unique id prefix.
pub fn find_by_prefix<'a>(tasks: &'a [Task], id_or_prefix: &str) -> MissionResult<&'a Task> {
    let wanted = id_or_prefix.trim();
    if wanted.is_empty() {
        return Err(MissionError::MissingField("task id"));
    }
    if let Some(task) = tasks.iter().find(|t| t.id == wanted) {
        return Ok(task);
    }

    let matches: Vec<&Task> = tasks.iter().filter(|t| t.id.starts_with(wanted)).collect();
    match matches.as_slice() {
        [] => Err(MissionError::TaskNotFound(wanted.to_string())),
        [task] => Ok(task),
        _ => Err(MissionError::AmbiguousTaskPrefix {
            prefix: wanted.to_string(),
            candidates: matches.iter().map(|t| t.id.clone()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;

    fn task(id: &str, status: TaskStatus, deps: &[&str]) -> Task {
        let mut task = Task::new(id, Stage::Implement, "", "");
        task.id = id.to_string();
        task.status = status;
        task.depends_on = deps.iter().map(|d| (*d).to_string()).collect();
        task
    }

    #[test]
    fn test_ready_requires_done_dependencies() {
        let tasks = vec![
            task("a", TaskStatus::Done, &[]),
            task("b", TaskStatus::InProgress, &[]),
            task("c", TaskStatus::Pending, &["a"]),
            task("d", TaskStatus::Pending, &["a", "b"]),
            task("e", TaskStatus::Pending, &[]),
        ];
        let index = build_index(&tasks);

        assert!(is_ready(&tasks[2], &index));
        assert!(!is_ready(&tasks[3], &index));
        assert!(is_ready(&tasks[4], &index));
        // Done and in-progress tasks are never "ready"
        assert!(!is_ready(&tasks[0], &index));
        assert!(!is_ready(&tasks[1], &index));
    }

    #[test]
    fn test_missing_dependency_fails_closed() {
        let tasks = vec![task("a", TaskStatus::Pending, &["ghost"])];
        let index = build_index(&tasks);
        assert!(!is_ready(&tasks[0], &index));
        assert!(queue(&tasks, &index).is_empty());
    }

    #[test]
    fn test_queue_keeps_collection_order() {
        let tasks = vec![
            task("z", TaskStatus::Pending, &[]),
            task("done", TaskStatus::Done, &[]),
            task("a", TaskStatus::Pending, &["done"]),
            task("m", TaskStatus::Pending, &[]),
        ];
        let index = build_index(&tasks);
        let ids: Vec<_> = queue(&tasks, &index).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_collect_deps_transitive_and_deduplicated() {
        let tasks = vec![
            task("a", TaskStatus::Pending, &["b", "c"]),
            task("b", TaskStatus::Pending, &["d"]),
            task("c", TaskStatus::Pending, &["d"]),
            task("d", TaskStatus::Done, &[]),
        ];
        let index = build_index(&tasks);
        let ids: Vec<_> = collect_deps(&tasks[0], &index).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "c"]);
    }

    #[test]
    fn test_collect_deps_terminates_on_cycle() {
        let tasks = vec![task("a", TaskStatus::Pending, &["b"]), task("b", TaskStatus::Pending, &["a"])];
        let index = build_index(&tasks);

        let deps = collect_deps(&tasks[0], &index);
        let ids: Vec<_> = deps.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.iter().filter(|id| **id == "a").count(), 1);
        assert_eq!(ids.iter().filter(|id| **id == "b").count(), 1);
    }

    #[test]
    fn test_render_tree_marks_cycle() {
        let tasks = vec![task("a", TaskStatus::Pending, &["b"]), task("b", TaskStatus::Done, &["a"])];
        let index = build_index(&tasks);

        let tree = render_tree(&tasks[0], &index);
        assert_eq!(tree.matches("(circular ref)").count(), 1);
        assert!(tree.starts_with("○ a [a]\n"));
        assert!(tree.contains("└── ● b [b]"));
    }

    #[test]
    fn test_render_tree_unknown_dependency() {
        let tasks = vec![task("a", TaskStatus::Pending, &["ghost", "b"]), task("b", TaskStatus::Blocked, &[])];
        let index = build_index(&tasks);

        let tree = render_tree(&tasks[0], &index);
        assert_eq!(tree, "○ a [a]\n    ├── ? unknown [ghost]\n    └── ✕ b [b]\n");
    }

    #[test]
    fn test_find_by_prefix() {
        let tasks = vec![
            task("abc123", TaskStatus::Pending, &[]),
            task("abd456", TaskStatus::Pending, &[]),
            task("ab", TaskStatus::Pending, &[]),
        ];

        // Exact match wins over prefix matches
        assert_eq!(find_by_prefix(&tasks, "ab").unwrap().id, "ab");
        assert_eq!(find_by_prefix(&tasks, "abc").unwrap().id, "abc123");

        let err = find_by_prefix(&tasks, "a").unwrap_err();
        match err {
            MissionError::AmbiguousTaskPrefix { candidates, .. } => {
                assert_eq!(candidates, vec!["abc123", "abd456", "ab"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(find_by_prefix(&tasks, "zz"), Err(MissionError::TaskNotFound(_))));
    }
}
