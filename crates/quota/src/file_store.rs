//! JSON file backend for usage counters

use crate::clock::Clock;
use crate::store::QuotaStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};
use upscale_common::{Error, Result, UsageRecord};

/// Usage counters kept in a single JSON file.
///
/// The map is loaded once at startup and every mutation is written through
/// (temp file + rename) while the lock is held, so the in-memory view never
/// runs ahead of what is on disk. The lock is the single writer for all keys.
pub struct FileQuotaStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, UsageRecord>>,
}

impl FileQuotaStore {
    /// Open the store at `path`, creating its directory if needed
    pub async fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let records = match tokio::fs::read(&path).await {
            Ok(data) if data.iter().all(u8::is_ascii_whitespace) => HashMap::new(),
            Ok(data) => serde_json::from_slice::<HashMap<String, UsageRecord>>(&data)
                .map_err(|e| {
                    Error::Storage(format!("Corrupt usage file {}: {}", path.display(), e))
                })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Loaded {} usage records from {}",
            records.len(),
            path.display()
        );

        Ok(Self {
            path,
            clock,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &HashMap<String, UsageRecord>) -> Result<()> {
        let json = serde_json::to_vec_pretty(records)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        self.sync_dir().await?;

        debug!("Persisted {} usage records", records.len());
        Ok(())
    }

    /// Make the rename itself durable
    #[cfg(unix)]
    async fn sync_dir(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        tokio::fs::File::open(dir).await?.sync_all().await?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn sync_dir(&self) -> Result<()> {
        Ok(())
    }

    /// Insert `record`, persist, and roll the map back if the write fails
    async fn commit(
        &self,
        records: &mut HashMap<String, UsageRecord>,
        record: UsageRecord,
    ) -> Result<()> {
        let key = record.identity_key.clone();
        let previous = records.insert(key.clone(), record);

        if let Err(e) = self.persist(records).await {
            match previous {
                Some(old) => {
                    records.insert(key, old);
                }
                None => {
                    records.remove(&key);
                }
            }
            return Err(e);
        }

        Ok(())
    }
}

#[async_trait]
impl QuotaStore for FileQuotaStore {
    async fn get_usage(&self, identity_key: &str) -> Result<UsageRecord> {
        let today = self.clock.today();
        let mut records = self.records.lock().await;

        let Some(mut record) = records.get(identity_key).cloned() else {
            return Ok(UsageRecord::fresh(identity_key, today));
        };

        if record.roll_over(today) {
            debug!("Daily reset for {}", identity_key);
            self.commit(&mut records, record.clone()).await?;
        }

        Ok(record)
    }

    async fn increment(
        &self,
        identity_key: &str,
        display_name: Option<&str>,
    ) -> Result<UsageRecord> {
        let today = self.clock.today();
        let mut records = self.records.lock().await;

        let mut record = records
            .get(identity_key)
            .cloned()
            .unwrap_or_else(|| UsageRecord::fresh(identity_key, today));

        record.roll_over(today);
        record.count += 1;
        if let Some(name) = display_name {
            record.display_name = Some(name.to_string());
        }

        self.commit(&mut records, record.clone()).await?;

        debug!("Usage for {} is now {}", identity_key, record.count);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    async fn open_store(dir: &TempDir, clock: Arc<ManualClock>) -> FileQuotaStore {
        FileQuotaStore::open(dir.path().join("data/usage.json"), clock)
            .await
            .expect("Failed to open usage file")
    }

    #[tokio::test]
    async fn test_unknown_identity_is_zero_and_not_created() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(day(1)));
        let store = open_store(&dir, clock).await;

        let usage = store.get_usage("nobody@example.com").await.unwrap();
        assert_eq!(usage.count, 0);
        assert_eq!(usage.last_reset_date, day(1));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_sequential_increments_same_day() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(day(1)));
        let store = open_store(&dir, clock).await;

        for expected in 1..=5 {
            let record = store
                .increment("ada@example.com", Some("Ada"))
                .await
                .unwrap();
            assert_eq!(record.count, expected);
        }

        let usage = store.get_usage("ada@example.com").await.unwrap();
        assert_eq!(usage.count, 5);
        assert_eq!(usage.display_name.as_deref(), Some("Ada"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_do_not_lose_updates() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(day(1)));
        let store = Arc::new(open_store(&dir, clock.clone()).await);

        let mut handles = Vec::new();
        for _ in 0..40 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment("burst@example.com", None).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get_usage("burst@example.com").await.unwrap().count, 40);

        // And what landed on disk agrees
        let reopened = open_store(&dir, clock).await;
        assert_eq!(
            reopened.get_usage("burst@example.com").await.unwrap().count,
            40
        );
    }

    #[tokio::test]
    async fn test_write_leaves_complete_file_and_no_temp() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(day(1)));
        let store = open_store(&dir, clock).await;

        for _ in 0..3 {
            store
                .increment("ada@example.com", Some("Ada"))
                .await
                .unwrap();
        }

        let mut tmp = store.path().to_path_buf().into_os_string();
        tmp.push(".tmp");
        assert!(!PathBuf::from(tmp).exists());

        let data = std::fs::read(store.path()).unwrap();
        let on_disk: HashMap<String, UsageRecord> = serde_json::from_slice(&data).unwrap();
        assert_eq!(on_disk["ada@example.com"].count, 3);
    }

    #[tokio::test]
    async fn test_stale_record_reads_as_zero_and_reset_is_persisted() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(day(1)));
        let store = open_store(&dir, clock.clone()).await;

        for _ in 0..9 {
            store.increment("ada@example.com", None).await.unwrap();
        }

        clock.advance_day();
        let usage = store.get_usage("ada@example.com").await.unwrap();
        assert_eq!(usage.count, 0);
        assert_eq!(usage.last_reset_date, day(2));

        let reopened = open_store(&dir, clock).await;
        let records = reopened.records.lock().await;
        let stored = records.get("ada@example.com").unwrap();
        assert_eq!(stored.count, 0);
        assert_eq!(stored.last_reset_date, day(2));
    }

    #[tokio::test]
    async fn test_increment_after_midnight_resets_exactly_once() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(day(1)));
        let store = open_store(&dir, clock.clone()).await;

        // Last use of the day just before midnight
        for _ in 0..3 {
            store.increment("ada@example.com", None).await.unwrap();
        }

        // First uses just after midnight
        clock.advance_day();
        assert_eq!(store.increment("ada@example.com", None).await.unwrap().count, 1);
        assert_eq!(store.increment("ada@example.com", None).await.unwrap().count, 2);
        assert_eq!(store.get_usage("ada@example.com").await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(day(1)));
        let store = open_store(&dir, clock).await;

        store.increment("a@example.com", None).await.unwrap();
        store.increment("a@example.com", None).await.unwrap();
        store.increment("b@example.com", None).await.unwrap();

        assert_eq!(store.get_usage("a@example.com").await.unwrap().count, 2);
        assert_eq!(store.get_usage("b@example.com").await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(&path, b"{not json").unwrap();

        let clock = Arc::new(ManualClock::new(day(1)));
        let result = FileQuotaStore::open(&path, clock).await;
        assert!(matches!(result, Err(Error::Storage(_))));
    }
}
