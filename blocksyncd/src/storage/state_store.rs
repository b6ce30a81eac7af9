use std::{
    fs,
    path::{Path, PathBuf},
};

use blocksync_core::ensure_array;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use sqlx::{Row, SqlitePool, migrate::Migrator, sqlite::SqliteConnectOptions};
use thiserror::Error;
use tracing::warn;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const DATA_DIR_NAME: &str = "blocksync";
const DB_FILE_NAME: &str = "state.db";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
}

/// Persistent key/value settings. Values are stored as JSON text.
#[derive(Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Raw stored value. Text that is not JSON (older builds wrote bare
    /// strings) comes back as a JSON string.
    pub async fn get_value(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let text: String = row.try_get("value")?;
        Ok(Some(
            serde_json::from_str(&text).unwrap_or(Value::String(text)),
        ))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str, fallback: T) -> Result<T, StoreError> {
        let Some(value) = self.get_value(key).await? else {
            return Ok(fallback);
        };
        match serde_json::from_value(value) {
            Ok(parsed) => Ok(parsed),
            Err(err) => {
                warn!(key, error = %err, "stored value has unexpected shape, using fallback");
                Ok(fallback)
            }
        }
    }

    pub async fn get_string_list(
        &self,
        key: &str,
        fallback: &[String],
    ) -> Result<Vec<String>, StoreError> {
        Ok(match self.get_value(key).await? {
            Some(value) => ensure_array(&value, fallback),
            None => fallback.to_vec(),
        })
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.set_many(&[(key.to_string(), serde_json::to_value(value)?)])
            .await
    }

    /// Writes every entry in one transaction; either all land or none do.
    pub async fn set_many(&self, entries: &[(String, Value)]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in entries {
            sqlx::query(
                "INSERT INTO settings (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%s', 'now'))
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(serde_json::to_string(value)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT key FROM settings WHERE key LIKE ?1 ORDER BY key ASC")
            .bind(format!("{prefix}%"))
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.try_get("key")?);
        }
        Ok(out)
    }

    #[cfg(test)]
    pub(crate) async fn put_raw(&self, key: &str, text: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub fn default_db_path() -> Result<PathBuf, StoreError> {
    let base = dirs::data_dir().ok_or(StoreError::MissingDataDir)?;
    Ok(base.join(DATA_DIR_NAME).join(DB_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn memory_store() -> StateStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = StateStore::from_pool(pool);
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn get_returns_fallback_for_missing_key() {
        let store = memory_store().await;
        let value: i64 = store.get("weibo.webdavConfig", 7).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = memory_store().await;
        store
            .set("weibo.lists.keywords", &vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let value: Vec<String> = store.get("weibo.lists.keywords", Vec::new()).await.unwrap();
        assert_eq!(value, vec!["a", "b"]);

        store.set("weibo.lists.keywords", &["c"]).await.unwrap();
        let value: Vec<String> = store.get("weibo.lists.keywords", Vec::new()).await.unwrap();
        assert_eq!(value, vec!["c"]);
    }

    #[tokio::test]
    async fn get_falls_back_on_wrong_shape() {
        let store = memory_store().await;
        store.set("weibo.lists.keywords", &json!({"a": 1})).await.unwrap();
        let value: Vec<String> = store
            .get("weibo.lists.keywords", vec!["x".to_string()])
            .await
            .unwrap();
        assert_eq!(value, vec!["x"]);
    }

    #[tokio::test]
    async fn string_list_coerces_legacy_text() {
        let store = memory_store().await;
        store
            .put_raw("weibo.lists.keywords", "spam\n  eggs \n\n")
            .await
            .unwrap();
        let list = store
            .get_string_list("weibo.lists.keywords", &[])
            .await
            .unwrap();
        assert_eq!(list, vec!["spam", "eggs"]);

        store.put_raw("weibo.lists.authors", "null").await.unwrap();
        let list = store
            .get_string_list("weibo.lists.authors", &[])
            .await
            .unwrap();
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn set_many_writes_all_entries() {
        let store = memory_store().await;
        store
            .set_many(&[
                ("zhihu.lists.keywords".to_string(), json!(["k"])),
                ("zhihu.lists.authors".to_string(), json!(["a"])),
                ("weibo.lists.keywords".to_string(), json!([])),
            ])
            .await
            .unwrap();
        let keys = store.keys_with_prefix("zhihu.").await.unwrap();
        assert_eq!(keys, vec!["zhihu.lists.authors", "zhihu.lists.keywords"]);
    }

    #[tokio::test]
    async fn open_creates_database_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/state.db");
        {
            let store = StateStore::open(&path).await.unwrap();
            store.set("weibo.lists.keywords", &["a"]).await.unwrap();
        }
        assert!(path.exists());

        let reopened = StateStore::open(&path).await.unwrap();
        let list = reopened
            .get_string_list("weibo.lists.keywords", &[])
            .await
            .unwrap();
        assert_eq!(list, vec!["a"]);
    }
}
