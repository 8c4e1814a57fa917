//! Identifier generation.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Number of digest bytes kept in a content-derived id.
const HASH_ID_BYTES: usize = 5;

/// Content-derived id: hex of the first bytes of SHA-256 over `kind|part|part...`.
pub fn hash_id(kind: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    for part in parts {
        hasher.update(b"|");
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    digest[..HASH_ID_BYTES].iter().map(|b| format!("{b:02x}")).collect()
}

/// Id of a task. Identical name, stage, zone and persona give the same id.
pub fn task_id(name: &str, stage: &str, zone: &str, persona: &str) -> String {
    hash_id("task", &[name, stage, zone, persona])
}

/// Fresh eight-character session id.
pub fn session_id() -> String {
    Uuid::new_v4().to_string().chars().take(8).collect()
}

/// Time-derived checkpoint id, e.g. `cp-20240501-123005`.
pub fn checkpoint_id(at: &DateTime<Utc>) -> String {
    format!("cp-{}", at.format("%Y%m%d-%H%M%S"))
}

/// First eight characters of an id, for commit messages.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
