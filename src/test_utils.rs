//! In-process fakes for the Telegram API and the key-value store.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::bot::Settings;
use crate::error::RelayError;
use crate::platform::telegram::{OutboundReply, TelegramApi};
use crate::store::{KeyPage, KvStore, SqliteKvStore};

pub fn test_settings() -> Settings {
    Settings {
        environment: "test".to_string(),
        track_usage: true,
        daily_message_limit: None,
    }
}

/// Records every reply; optionally fails sends or webhook-info lookups.
#[derive(Default)]
pub struct RecordingTelegram {
    sent: Mutex<Vec<OutboundReply>>,
    fail: bool,
}

impl RecordingTelegram {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<OutboundReply> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl TelegramApi for RecordingTelegram {
    async fn send_message(&self, reply: &OutboundReply) -> Result<(), RelayError> {
        self.sent.lock().await.push(reply.clone());
        if self.fail {
            return Err(RelayError::Upstream("sendMessage failed (502)".to_string()));
        }
        Ok(())
    }

    async fn get_webhook_info(&self) -> Result<serde_json::Value, RelayError> {
        if self.fail {
            return Err(RelayError::Upstream("getWebhookInfo failed (502)".to_string()));
        }
        Ok(serde_json::json!({
            "ok": true,
            "result": {"url": "https://relay.test/", "pending_update_count": 0}
        }))
    }
}

/// SQLite store that fails writes for chosen keys, or every operation.
pub struct FlakyStore {
    inner: SqliteKvStore,
    bad_puts: HashSet<String>,
    fail_all: bool,
}

impl FlakyStore {
    pub fn failing_all() -> Self {
        Self {
            inner: SqliteKvStore::open_in_memory().unwrap(),
            bad_puts: HashSet::new(),
            fail_all: true,
        }
    }

    pub fn failing_puts(inner: SqliteKvStore, keys: &[&str]) -> Self {
        Self {
            inner,
            bad_puts: keys.iter().map(|k| k.to_string()).collect(),
            fail_all: false,
        }
    }

    fn check(&self) -> Result<(), RelayError> {
        if self.fail_all {
            return Err(RelayError::Storage("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RelayError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), RelayError> {
        self.check()?;
        if self.bad_puts.contains(key) {
            return Err(RelayError::Storage(format!("write rejected for {key}")));
        }
        self.inner.put(key, value).await
    }

    async fn list(&self, cursor: Option<&str>, limit: usize) -> Result<KeyPage, RelayError> {
        self.check()?;
        self.inner.list(cursor, limit).await
    }
}
