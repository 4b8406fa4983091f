use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::store::{self, KvStore, UserRecord};

/// Outcome of one counter reset pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Keys seen in the listing.
    pub scanned: usize,
    /// Records written back with a zero count.
    pub reset: usize,
    /// Records that could not be loaded, decoded, or written.
    pub failed: usize,
}

/// Returns `false` when the key disappeared between listing and loading.
async fn reset_one(
    store: &dyn KvStore,
    key: &str,
    now: DateTime<Utc>,
) -> Result<bool, RelayError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(false);
    };
    let mut record = UserRecord::decode(&raw)?;
    record.reset(now);
    store::save_user(store, key, &record).await?;
    Ok(true)
}

/// Zero every user's message count, page by page.
///
/// A bad record is logged and counted, and the sweep moves on. Only a failed
/// listing ends the run early.
pub async fn reset_counters(
    store: &dyn KvStore,
    batch_size: usize,
) -> Result<SweepReport, RelayError> {
    let started = Utc::now();
    let mut report = SweepReport::default();
    let mut cursor: Option<String> = None;

    loop {
        let page = store.list(cursor.as_deref(), batch_size).await?;
        debug!("Sweep page: {} key(s)", page.keys.len());

        for key in &page.keys {
            report.scanned += 1;
            match reset_one(store, key, started).await {
                Ok(true) => report.reset += 1,
                Ok(false) => debug!("Key {} vanished before reset", key),
                Err(e) => {
                    warn!("Failed to reset counter for {}: {}", key, e);
                    report.failed += 1;
                }
            }
        }

        match page.cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteKvStore;
    use crate::test_utils::FlakyStore;
    use chrono::TimeZone;

    async fn seed(store: &dyn KvStore, keys: &[&str]) {
        let old = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        for (i, key) in keys.iter().enumerate() {
            let record = UserRecord {
                message_count: i as u64 + 1,
                last_reset: old,
            };
            store::save_user(store, key, &record).await.unwrap();
        }
    }

    async fn record(store: &dyn KvStore, key: &str) -> UserRecord {
        UserRecord::decode(&store.get(key).await.unwrap().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_resets_every_record_across_pages() {
        let store = SqliteKvStore::open_in_memory().unwrap();
        let keys = ["1", "2", "3", "4", "5", "6", "7"];
        seed(&store, &keys).await;

        let before = Utc::now();
        let report = reset_counters(&store, 3).await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                scanned: 7,
                reset: 7,
                failed: 0
            }
        );
        for key in keys {
            let r = record(&store, key).await;
            assert_eq!(r.message_count, 0);
            assert!(r.last_reset >= before);
        }
    }

    #[tokio::test]
    async fn test_bad_record_does_not_stop_sweep() {
        let store = SqliteKvStore::open_in_memory().unwrap();
        seed(&store, &["a", "c"]).await;
        store.put("b", "garbage").await.unwrap();

        let report = reset_counters(&store, 1).await.unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.reset, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(record(&store, "a").await.message_count, 0);
        assert_eq!(record(&store, "c").await.message_count, 0);
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("garbage"));
    }

    #[tokio::test]
    async fn test_failed_write_is_counted() {
        let inner = SqliteKvStore::open_in_memory().unwrap();
        seed(&inner, &["x", "y"]).await;
        let store = FlakyStore::failing_puts(inner.clone(), &["x"]);

        let report = reset_counters(&store, 10).await.unwrap();

        assert_eq!(report.reset, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(record(&inner, "x").await.message_count, 1);
        assert_eq!(record(&inner, "y").await.message_count, 0);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = SqliteKvStore::open_in_memory().unwrap();
        assert_eq!(
            reset_counters(&store, 10).await.unwrap(),
            SweepReport::default()
        );
    }

    #[tokio::test]
    async fn test_listing_failure_is_returned() {
        let store = FlakyStore::failing_all();
        let err = reset_counters(&store, 10).await.unwrap_err();
        assert_eq!(err.kind(), "storage");
    }
}
