//! File helpers shared by the stores.
//!
//! Whole-file writes go through a temp file in the destination directory and
//! a rename, so a reader sees either the old or the new content. Nothing here
//! locks; concurrent writers race and the last rename wins.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{MissionError, MissionResult};

/// Create a directory and its parents.
pub fn ensure_dir(path: &Path) -> MissionResult<()> {
    fs::create_dir_all(path).map_err(|e| MissionError::io(path, e))
}

/// Read a file, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> MissionResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MissionError::io(path, e)),
    }
}

/// Read and decode a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> MissionResult<T> {
    let content = fs::read_to_string(path).map_err(|e| MissionError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| MissionError::corrupt(path, e))
}

/// Read and decode a JSON file that may not exist yet.
pub fn read_json_optional<T: DeserializeOwned>(path: &Path) -> MissionResult<Option<T>> {
    match read_optional(path)? {
        Some(content) => {
            serde_json::from_str(&content).map(Some).map_err(|e| MissionError::corrupt(path, e))
        }
        None => Ok(None),
    }
}

/// Encode a value as pretty JSON and write it atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> MissionResult<()> {
    let mut content = serde_json::to_string_pretty(value)
        .map_err(|source| MissionError::Encode { path: path.to_path_buf(), source })?;
    content.push('\n');
    write_atomic(path, content.as_bytes())
}

/// Write bytes to `path` via a sibling temp file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> MissionResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(dir)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| MissionError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| MissionError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| MissionError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| MissionError::io(path, e.error))?;
    Ok(())
}

/// Write a new file, failing if it already exists.
///
/// Returns `Ok(false)` when the file exists so callers can pick another name.
pub fn write_new(path: &Path, bytes: &[u8]) -> MissionResult<bool> {
    if let Some(dir) = path.parent() {
        ensure_dir(dir)?;
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(MissionError::io(path, e)),
    };
    file.write_all(bytes).map_err(|e| MissionError::io(path, e))?;
    file.sync_all().map_err(|e| MissionError::io(path, e))?;
    Ok(true)
}

/// Append one JSON line to a log file.
pub fn append_json_line<T: Serialize>(path: &Path, value: &T) -> MissionResult<()> {
    let mut line = serde_json::to_string(value)
        .map_err(|source| MissionError::Encode { path: path.to_path_buf(), source })?;
    line.push('\n');
    if let Some(dir) = path.parent() {
        ensure_dir(dir)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| MissionError::io(path, e))?;
    file.write_all(line.as_bytes()).map_err(|e| MissionError::io(path, e))
}

/// Decode every non-blank line of a JSON-lines file.
///
/// A missing file is an empty log. With `strict`, an undecodable line is an
/// error; otherwise it is skipped with a warning.
pub fn read_json_lines<T: DeserializeOwned>(path: &Path, strict: bool) -> MissionResult<Vec<T>> {
    let Some(content) = read_optional(path)? else {
        return Ok(Vec::new());
    };

    let mut items = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(item) => items.push(item),
            Err(e) if strict => return Err(MissionError::corrupt(path, e)),
            Err(e) => {
                tracing::warn!(path = ?path, line = lineno + 1, error = %e, "Skipping unreadable log line");
            }
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        n: u32,
    }

    #[test]
    fn test_write_json_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/state.json");

        write_json(&path, &Entry { n: 1 }).unwrap();
        write_json(&path, &Entry { n: 2 }).unwrap();

        let loaded: Entry = read_json(&path).unwrap();
        assert_eq!(loaded, Entry { n: 2 });

        // Only the target file remains in the directory
        let entries = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_read_json_optional_missing() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<Entry> = read_json_optional(&dir.path().join("none.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_corrupt_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();

        let err = read_json::<Entry>(&path).unwrap_err();
        assert!(matches!(err, MissionError::Corrupt { .. }));
    }

    #[test]
    fn test_write_new_refuses_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("once.json");

        assert!(write_new(&path, b"first").unwrap());
        assert!(!write_new(&path, b"second").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");
    }

    #[test]
    fn test_json_lines_append_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");

        append_json_line(&path, &Entry { n: 1 }).unwrap();
        append_json_line(&path, &Entry { n: 2 }).unwrap();
        fs::OpenOptions::new().append(true).open(&path).unwrap().write_all(b"garbage\n\n").unwrap();

        let lenient: Vec<Entry> = read_json_lines(&path, false).unwrap();
        assert_eq!(lenient, vec![Entry { n: 1 }, Entry { n: 2 }]);

        assert!(read_json_lines::<Entry>(&path, true).is_err());
    }
}
