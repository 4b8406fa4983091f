use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::{KeyPage, KvStore};
use crate::error::RelayError;

/// Thread-safe SQLite-backed key-value store
#[derive(Clone)]
pub struct SqliteKvStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKvStore {
    /// Open or create the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, RelayError> {
        let conn = Connection::open(path).map_err(|e| {
            RelayError::Storage(format!("failed to open {}: {e}", path.display()))
        })?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn)?;

        info!("Key-value store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, RelayError> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<(), RelayError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RelayError> {
        let conn = self.conn.lock().await;
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), RelayError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    async fn list(&self, cursor: Option<&str>, limit: usize) -> Result<KeyPage, RelayError> {
        let conn = self.conn.lock().await;
        // Fetch one extra row to learn whether another page follows.
        let fetch = (limit as i64).saturating_add(1);
        let mut stmt = conn.prepare(
            "SELECT key FROM kv
             WHERE ?1 IS NULL OR key > ?1
             ORDER BY key ASC
             LIMIT ?2",
        )?;
        let mut keys = stmt
            .query_map(rusqlite::params![cursor, fetch], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let cursor = if keys.len() > limit {
            keys.truncate(limit);
            keys.last().cloned()
        } else {
            None
        };
        Ok(KeyPage { keys, cursor })
    }

    async fn count(&self) -> Result<u64, RelayError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(keys: &[&str]) -> SqliteKvStore {
        let store = SqliteKvStore::open_in_memory().unwrap();
        for key in keys {
            store.put(key, "{}").await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = SqliteKvStore::open_in_memory().unwrap();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = SqliteKvStore::open_in_memory().unwrap();
        store.put("a", "1").await.unwrap();
        store.put("a", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_paginates_in_key_order() {
        let store = seeded(&["c", "a", "e", "b", "d"]).await;

        let first = store.list(None, 2).await.unwrap();
        assert_eq!(first.keys, vec!["a", "b"]);
        assert_eq!(first.cursor.as_deref(), Some("b"));

        let second = store.list(first.cursor.as_deref(), 2).await.unwrap();
        assert_eq!(second.keys, vec!["c", "d"]);

        let last = store.list(second.cursor.as_deref(), 2).await.unwrap();
        assert_eq!(last.keys, vec!["e"]);
        assert_eq!(last.cursor, None);
    }

    #[tokio::test]
    async fn test_exact_page_has_no_cursor() {
        let store = seeded(&["a", "b"]).await;
        let page = store.list(None, 2).await.unwrap();
        assert_eq!(page.keys.len(), 2);
        assert_eq!(page.cursor, None);
    }

    #[tokio::test]
    async fn test_count() {
        let store = seeded(&["1", "2", "3"]).await;
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let path = std::env::temp_dir().join(format!("tg-relay-kv-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        {
            let store = SqliteKvStore::open(&path).unwrap();
            store.put("k", "v").await.unwrap();
        }
        let reopened = SqliteKvStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").await.unwrap().as_deref(), Some("v"));
        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }
}
