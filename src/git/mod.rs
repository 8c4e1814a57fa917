//! Git integration.
//!
//! Commits `.mission/` changes after state mutations, gated per category by
//! [`AutoCommitConfig`], and lists staged files for scope checks. Every
//! failure here is logged and swallowed by the caller-facing entry points.

use std::path::{Path, PathBuf};

use git2::{Commit, ErrorCode, IndexAddOption, Oid, Repository, Signature};

use crate::config::{AutoCommitConfig, CommitCategory};
use crate::MISSION_DIR;

/// Fallback identity when the repository has no user configured.
const FALLBACK_NAME: &str = "mc";
const FALLBACK_EMAIL: &str = "mc@localhost";

/// A Git repository that contains a mission.
pub struct GitRepository {
    repo: Repository,
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository").field("root", &self.root()).finish()
    }
}

impl GitRepository {
    /// Find the repository containing `path`, searching upwards.
    #[must_use]
    pub fn discover(path: impl AsRef<Path>) -> Option<Self> {
        Repository::discover(path.as_ref()).ok().map(|repo| Self { repo })
    }

    /// Working tree root; `None` for a bare repository.
    #[must_use]
    pub fn root(&self) -> Option<PathBuf> {
        self.repo.workdir().map(Path::to_path_buf)
    }

    /// `path` relative to the working tree, with `/` separators.
    fn relative(&self, path: &Path) -> Option<String> {
        let root = self.root()?;
        let root = root.canonicalize().unwrap_or(root);
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let rel = path.strip_prefix(&root).ok()?;
        let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
        Some(parts.join("/"))
    }

    fn head_commit(&self) -> Result<Option<Commit<'_>>, git2::Error> {
        match self.repo.head() {
            Ok(head) => head.peel_to_commit().map(Some),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn signature(&self) -> Result<Signature<'static>, git2::Error> {
        self.repo.signature().or_else(|_| Signature::now(FALLBACK_NAME, FALLBACK_EMAIL))
    }

    /// Stage everything under `dir` and commit it. Returns `None` when the
    /// index matches HEAD afterwards, so no empty commit is made.
    pub fn commit_dir(&self, dir: &Path, message: &str) -> Result<Option<Oid>, git2::Error> {
        let Some(pathspec) = self.relative(dir) else {
            return Ok(None);
        };

        let mut index = self.repo.index()?;
        index.add_all([pathspec.as_str()], IndexAddOption::DEFAULT, None)?;
        index.update_all([pathspec.as_str()], None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let parent = self.head_commit()?;
        let unchanged = match &parent {
            Some(commit) => commit.tree_id() == tree_id,
            None => self.repo.find_tree(tree_id)?.is_empty(),
        };
        if unchanged {
            return Ok(None);
        }

        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.signature()?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        self.repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents).map(Some)
    }

    /// Paths staged relative to HEAD.
    pub fn staged_files(&self) -> Result<Vec<String>, git2::Error> {
        let head_tree = match self.head_commit()? {
            Some(commit) => Some(commit.tree()?),
            None => None,
        };
        let diff = self.repo.diff_tree_to_index(head_tree.as_ref(), None, None)?;
        Ok(diff
            .deltas()
            .filter_map(|delta| delta.new_file().path().or_else(|| delta.old_file().path()))
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect())
    }
}

/// Commits mission state after mutations.
#[derive(Debug, Clone)]
pub struct AutoCommitter {
    project_root: PathBuf,
    config: AutoCommitConfig,
}

impl AutoCommitter {
    pub fn new(project_root: impl AsRef<Path>, config: AutoCommitConfig) -> Self {
        Self { project_root: project_root.as_ref().to_path_buf(), config }
    }

    /// Commit `.mission/` as `[mc:<category>] <message>`.
    ///
    /// Does nothing, not even staging, when the category is disabled or the
    /// project is not in a repository.
    pub fn commit(&self, category: CommitCategory, message: &str) -> Option<Oid> {
        if !self.config.allows(category) {
            return None;
        }
        let repo = GitRepository::discover(&self.project_root)?;
        let full_message = format!("[mc:{}] {}", category.as_str(), message);

        match repo.commit_dir(&self.project_root.join(MISSION_DIR), &full_message) {
            Ok(Some(oid)) => {
                tracing::debug!(commit = %oid, message = %full_message, "Auto-committed mission state");
                Some(oid)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(category = category.as_str(), error = %e, "Git auto-commit failed");
                None
            }
        }
    }
}
