use std::collections::BTreeMap;
use std::fmt;

use blocksync_core::{Credentials, MAX_TIMESTAMP_MILLIS};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::profile::ScriptProfile;
use crate::storage::{StateStore, StoreError};

/// Connection settings plus the `lastSync` watermark, stored together under
/// `<prefix>.webdavConfig`.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebdavSettings {
    pub enabled: bool,
    pub url: String,
    pub username: String,
    pub password: String,
    pub last_sync: i64,
}

impl WebdavSettings {
    /// Field-by-field coercion so one damaged field does not wipe the
    /// credentials next to it.
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(map) = value else {
            if !value.is_null() {
                warn!("stored webdav settings are not an object, resetting them");
            }
            return Self::default();
        };
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_default()
        };
        Self {
            enabled: map.get("enabled").map(truthy).unwrap_or(false),
            url: text("url"),
            username: text("username"),
            password: text("password"),
            last_sync: map.get("lastSync").map(watermark).unwrap_or(0),
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password)
    }

    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

impl fmt::Debug for WebdavSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebdavSettings")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("last_sync", &self.last_sync)
            .finish()
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Value::Number(number) => number.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn watermark(value: &Value) -> i64 {
    let parsed = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.unwrap_or(0).clamp(0, MAX_TIMESTAMP_MILLIS)
}

/// Everything one script instance synchronizes, owned by a single engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub lists: BTreeMap<String, Vec<String>>,
    pub webdav: WebdavSettings,
}

impl SyncState {
    pub async fn load(store: &StateStore, profile: &ScriptProfile) -> Result<Self, StoreError> {
        let mut lists = BTreeMap::new();
        for name in &profile.list_names {
            let entries = store.get_string_list(&profile.list_key(name), &[]).await?;
            lists.insert(name.clone(), entries);
        }
        let webdav = store
            .get_value(&profile.webdav_key())
            .await?
            .map(|value| WebdavSettings::from_value(&value))
            .unwrap_or_default();
        Ok(Self { lists, webdav })
    }

    pub fn list(&self, name: &str) -> &[String] {
        self.lists.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn list_entries(&self, profile: &ScriptProfile) -> Vec<(String, Value)> {
        profile
            .list_names
            .iter()
            .map(|name| (profile.list_key(name), Value::from(self.list(name).to_vec())))
            .collect()
    }

    pub fn settings_entry(&self, profile: &ScriptProfile) -> Result<(String, Value), StoreError> {
        Ok((profile.webdav_key(), serde_json::to_value(&self.webdav)?))
    }

    /// Persists lists and settings in one transaction.
    pub async fn persist(&self, store: &StateStore, profile: &ScriptProfile) -> Result<(), StoreError> {
        let mut entries = self.list_entries(profile);
        entries.push(self.settings_entry(profile)?);
        store.set_many(&entries).await
    }

    pub async fn persist_settings(
        &self,
        store: &StateStore,
        profile: &ScriptProfile,
    ) -> Result<(), StoreError> {
        store.set_many(&[self.settings_entry(profile)?]).await
    }
}
