pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

pub use sqlite::SqliteKvStore;

/// One page of keys from [`KvStore::list`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyPage {
    pub keys: Vec<String>,
    /// Pass back to `list` to continue; `None` once the listing is exhausted.
    pub cursor: Option<String>,
}

/// String key to string value storage with cursor-based listing.
///
/// Get and put are independent operations; there is no read-modify-write
/// atomicity across them.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RelayError>;

    async fn put(&self, key: &str, value: &str) -> Result<(), RelayError>;

    /// Keys in ascending order, strictly after `cursor`, at most `limit` of them.
    async fn list(&self, cursor: Option<&str>, limit: usize) -> Result<KeyPage, RelayError>;

    async fn count(&self) -> Result<u64, RelayError> {
        let mut total = 0u64;
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list(cursor.as_deref(), 1000).await?;
            total += page.keys.len() as u64;
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(total),
            }
        }
    }
}

/// Per-user usage counter stored as JSON under the chat/user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub message_count: u64,
    pub last_reset: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            message_count: 0,
            last_reset: now,
        }
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.message_count = 0;
        self.last_reset = now;
    }

    pub fn decode(raw: &str) -> Result<Self, RelayError> {
        serde_json::from_str(raw)
            .map_err(|e| RelayError::Storage(format!("malformed user record: {e}")))
    }

    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self)
            .map_err(|e| RelayError::Storage(format!("failed to encode user record: {e}")))
    }
}

/// Load the record for `key`, or a fresh one when none exists yet.
pub async fn load_user(
    store: &dyn KvStore,
    key: &str,
    now: DateTime<Utc>,
) -> Result<UserRecord, RelayError> {
    match store.get(key).await? {
        Some(raw) => UserRecord::decode(&raw),
        None => Ok(UserRecord::new(now)),
    }
}

pub async fn save_user(
    store: &dyn KvStore,
    key: &str,
    record: &UserRecord,
) -> Result<(), RelayError> {
    store.put(key, &record.encode()?).await
}
