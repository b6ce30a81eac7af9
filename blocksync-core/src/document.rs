use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::debug;

use crate::sanitize::{ensure_array, value_kind};

pub const SCRIPT_VERSION_KEY: &str = "scriptVersion";
pub const LEGACY_SCRIPT_VERSION_KEY: &str = "_script_version";
const LAST_MODIFIED_KEY: &str = "lastModified";
const REASON_KEY: &str = "reason";
const TIMESTAMP_KEY: &str = "timestamp";

/// `9999-12-31T23:59:59.999Z`, the last instant the ISO timestamp can show.
pub const MAX_TIMESTAMP_MILLIS: i64 = 253_402_300_799_999;

const METADATA_KEYS: [&str; 5] = [
    LAST_MODIFIED_KEY,
    REASON_KEY,
    TIMESTAMP_KEY,
    SCRIPT_VERSION_KEY,
    LEGACY_SCRIPT_VERSION_KEY,
];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("document root is {0}, expected an object")]
    NotAnObject(&'static str),
    #[error("timestamp out of range: {0}")]
    TimestampRange(#[from] time::error::ComponentRange),
    #[error("failed to format timestamp: {0}")]
    TimestampFormat(#[from] time::error::Format),
}

/// The whole synchronized state as stored on the WebDAV share.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    pub lists: BTreeMap<String, Vec<String>>,
    pub last_modified: i64,
    pub reason: String,
    pub timestamp: String,
    pub script_version: Option<String>,
}

impl ConfigDocument {
    /// `written_at` is the wall clock of the write and only feeds the
    /// human-readable `timestamp`; ordering uses `last_modified`.
    pub fn new(
        lists: BTreeMap<String, Vec<String>>,
        last_modified: i64,
        written_at: i64,
        reason: impl Into<String>,
        script_version: impl Into<String>,
    ) -> Result<Self, DocumentError> {
        Ok(Self {
            lists,
            last_modified,
            reason: reason.into(),
            timestamp: format_timestamp(written_at)?,
            script_version: Some(script_version.into()),
        })
    }

    /// Parses a downloaded body. Any JSON object is accepted with missing
    /// fields defaulted; non-JSON and non-object roots are errors.
    pub fn decode(text: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        let Value::Object(map) = value else {
            return Err(DocumentError::NotAnObject(value_kind(&value)));
        };

        let script_version = version_field(&map, SCRIPT_VERSION_KEY)
            .or_else(|| version_field(&map, LEGACY_SCRIPT_VERSION_KEY));
        let last_modified = map.get(LAST_MODIFIED_KEY).map(millis).unwrap_or(0);

        let mut lists = BTreeMap::new();
        for (key, value) in &map {
            if METADATA_KEYS.contains(&key.as_str()) {
                continue;
            }
            if value.is_array() {
                lists.insert(key.clone(), ensure_array(value, &[]));
            } else {
                debug!(key = %key, kind = value_kind(value), "ignoring non-list field");
            }
        }

        Ok(Self {
            lists,
            last_modified,
            reason: string_field(&map, REASON_KEY).unwrap_or_default(),
            timestamp: string_field(&map, TIMESTAMP_KEY).unwrap_or_default(),
            script_version,
        })
    }

    /// Pretty-printed with two-space indentation, lists first.
    pub fn encode(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        self.lists.get(name).map(Vec::as_slice)
    }
}

impl Serialize for ConfigDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = if self.script_version.is_some() { 4 } else { 3 };
        let mut map = serializer.serialize_map(Some(self.lists.len() + extra))?;
        for (name, entries) in &self.lists {
            map.serialize_entry(name, entries)?;
        }
        map.serialize_entry(LAST_MODIFIED_KEY, &self.last_modified)?;
        map.serialize_entry(REASON_KEY, &self.reason)?;
        map.serialize_entry(TIMESTAMP_KEY, &self.timestamp)?;
        if let Some(version) = &self.script_version {
            map.serialize_entry(SCRIPT_VERSION_KEY, version)?;
        }
        map.end()
    }
}

/// Formats epoch milliseconds as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn format_timestamp(millis: i64) -> Result<String, DocumentError> {
    let at = OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)?;
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );
    Ok(at.format(&format)?)
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Blank versions read as absent.
fn version_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    string_field(map, key).filter(|version| !version.trim().is_empty())
}

/// Clamped to `0..=MAX_TIMESTAMP_MILLIS`; anything unreadable is `0`.
fn millis(value: &Value) -> i64 {
    let Value::Number(number) = value else {
        return 0;
    };
    number
        .as_i64()
        .or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f as i64)
        })
        .unwrap_or(0)
        .clamp(0, MAX_TIMESTAMP_MILLIS)
}
