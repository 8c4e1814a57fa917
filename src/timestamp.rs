//! RFC3339 timestamps as stored in mission files.
//!
//! Everything on disk is UTC with second precision (`2024-05-01T12:00:00Z`).
//! Readers accept any RFC3339 offset and normalise to UTC.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time, truncated to whole seconds.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

/// Format a timestamp the way mission files store it.
pub fn format(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC3339 timestamp into UTC.
pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim()).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Serde adapter for required timestamps.
pub mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid RFC3339 timestamp {raw:?}")))
    }
}

/// Serde adapter for optional timestamps.
///
/// Missing, empty and unparseable values all read as `None`; older writers
/// emitted empty strings for "never".
pub mod rfc3339_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        at: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match at {
            Some(at) => serializer.serialize_str(&super::format(at)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(super::parse))
    }
}
