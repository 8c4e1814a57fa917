//! JSON-lines persistence for the task collection.
//!
//! `state/tasks.jsonl` holds one task per line in insertion order. The whole
//! file is rewritten on every change. A mission that still has the older
//! `state/tasks.json` is migrated the first time it is read.

use std::path::{Path, PathBuf};

use crate::error::{MissionError, MissionResult};
use crate::{fsutil, migrate};

use super::{graph, Task};

/// Loads and saves the task collection.
#[derive(Debug, Clone)]
pub struct TaskStore {
    /// Path to `tasks.jsonl`
    path: PathBuf,
    /// Path to the legacy `tasks.json`
    legacy_path: PathBuf,
}

impl TaskStore {
    /// Store rooted at a mission's `state/` directory.
    pub fn new(state_dir: &Path) -> Self {
        Self { path: state_dir.join("tasks.jsonl"), legacy_path: state_dir.join("tasks.json") }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All tasks in insertion order.
    pub fn load(&self) -> MissionResult<Vec<Task>> {
        if !self.path.exists() && self.legacy_path.exists() {
            return migrate::migrate_legacy_tasks(&self.legacy_path, self);
        }
        fsutil::read_json_lines(&self.path, true)
    }

    /// Replace the stored collection.
    pub fn save(&self, tasks: &[Task]) -> MissionResult<()> {
        let mut content = String::new();
        for task in tasks {
            let line = serde_json::to_string(task)
                .map_err(|source| MissionError::Encode { path: self.path.clone(), source })?;
            content.push_str(&line);
            content.push('\n');
        }
        fsutil::write_atomic(&self.path, content.as_bytes())
    }

    /// Append a new task, rejecting a duplicate id.
    pub fn insert(&self, task: Task) -> MissionResult<Task> {
        let mut tasks = self.load()?;
        if let Some(existing) = tasks.iter().find(|t| t.id == task.id) {
            return Err(MissionError::DuplicateTask {
                id: existing.id.clone(),
                name: existing.name.clone(),
            });
        }
        tasks.push(task.clone());
        self.save(&tasks)?;
        Ok(task)
    }

    /// Find a task by id or unique id prefix.
    pub fn find(&self, id_or_prefix: &str) -> MissionResult<Task> {
        let tasks = self.load()?;
        graph::find_by_prefix(&tasks, id_or_prefix).cloned()
    }

    /// Apply `change` to one task and persist. Returns the task before and after.
    pub fn update<F>(&self, id_or_prefix: &str, change: F) -> MissionResult<(Task, Task)>
    where
        F: FnOnce(&mut Task),
    {
        let mut tasks = self.load()?;
        let id = graph::find_by_prefix(&tasks, id_or_prefix)?.id.clone();
        let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
            return Err(MissionError::TaskNotFound(id_or_prefix.to_string()));
        };

        let before = task.clone();
        change(task);
        let after = task.clone();

        self.save(&tasks)?;
        Ok((before, after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;
    use crate::task::TaskStatus;
    use tempfile::TempDir;

    fn store() -> (TempDir, TaskStore) {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let (_dir, store) = store();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_insert_preserves_order() {
        let (_dir, store) = store();
        for name in ["first", "second", "third"] {
            store.insert(Task::new(name, Stage::Implement, "core", "developer")).unwrap();
        }

        let names: Vec<_> = store.load().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["first", "second", "third"]);

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let (_dir, store) = store();
        store.insert(Task::new("same", Stage::Implement, "core", "developer")).unwrap();

        let err = store.insert(Task::new("same", Stage::Implement, "core", "developer")).unwrap_err();
        assert!(matches!(err, MissionError::DuplicateTask { .. }));
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_update_by_prefix() {
        let (_dir, store) = store();
        let task = store.insert(Task::new("work", Stage::Implement, "core", "developer")).unwrap();

        let (before, after) =
            store.update(&task.id[..6], |t| t.set_status(TaskStatus::InProgress)).unwrap();
        assert_eq!(before.status, TaskStatus::Pending);
        assert_eq!(after.status, TaskStatus::InProgress);
        assert_eq!(store.find(&task.id).unwrap().status, TaskStatus::InProgress);
    }

    #[test]
    fn test_corrupt_line_fails_loudly() {
        let (_dir, store) = store();
        store.insert(Task::new("ok", Stage::Implement, "", "")).unwrap();
        let mut content = std::fs::read_to_string(store.path()).unwrap();
        content.push_str("{\"id\": broken\n");
        std::fs::write(store.path(), content).unwrap();

        assert!(matches!(store.load(), Err(MissionError::Corrupt { .. })));
    }
}
