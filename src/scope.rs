//! Which files a task may commit.
//!
//! Pattern forms, checked in order:
//!
//! - `dir/` : anything under that directory prefix
//! - exact path
//! - glob (`*`, `?`, `[...]`), never crossing `/`
//! - a pattern without `/` is also tried against the file's base name
//!
//! Files under `.mission/` are always allowed, as are the configured exempt
//! patterns. A task with no scope paths may stage nothing else.

use regex::Regex;
use serde::Serialize;

use crate::task::Task;

/// Prefix of mission state files, always stageable.
pub const MISSION_PREFIX: &str = ".mission/";

/// Result of checking candidate files against a task's scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScopeReport {
    pub allowed: Vec<String>,
    pub out_of_scope: Vec<String>,
}

impl ScopeReport {
    pub fn is_clean(&self) -> bool {
        self.out_of_scope.is_empty()
    }
}

/// Translate a glob into an anchored regex. `None` for a malformed pattern.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!' | '^')) {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                let mut empty = true;
                for c in chars.by_ref() {
                    if c == ']' && !empty {
                        closed = true;
                        break;
                    }
                    empty = false;
                    if matches!(c, '\\' | '[' | ']' | '&' | '~') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                if !closed {
                    return None;
                }
                out.push(']');
            }
            '\\' => {
                let escaped = chars.next()?;
                out.push_str(&regex::escape(&escaped.to_string()));
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out).ok()
}

/// Shell-style match of a whole name against `pattern`.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    glob_to_regex(pattern).is_some_and(|re| re.is_match(name))
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Whether `file` is covered by one scope pattern.
pub fn matches_scope_path(file: &str, pattern: &str) -> bool {
    if pattern.ends_with('/') {
        return file.starts_with(pattern);
    }
    if file == pattern || glob_match(pattern, file) {
        return true;
    }
    !pattern.contains('/') && glob_match(pattern, base_name(file))
}

/// Split `files` into those `task` may stage and those it may not.
pub fn validate_scope(task: &Task, exempt_paths: &[String], files: &[String]) -> ScopeReport {
    let mut report = ScopeReport::default();

    for file in files {
        let allowed = file.starts_with(MISSION_PREFIX)
            || exempt_paths.iter().any(|p| matches_scope_path(file, p))
            || task.scope_paths.iter().any(|p| matches_scope_path(file, p));

        if allowed {
            report.allowed.push(file.clone());
        } else {
            report.out_of_scope.push(file.clone());
        }
    }

    report
}
