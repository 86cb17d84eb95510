//! Redis backend for usage counters

use crate::clock::Clock;
use crate::store::QuotaStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::sync::Arc;
use tracing::{debug, info};
use upscale_common::{Error, Result, UsageRecord};

/// Reset a stale hash and read it. Missing keys are not created.
const GET_USAGE_SCRIPT: &str = r#"
local last = redis.call('HGET', KEYS[1], 'last_reset_date')
if not last then
  return {0, ''}
end
if last ~= ARGV[1] then
  redis.call('HSET', KEYS[1], 'count', 0, 'last_reset_date', ARGV[1])
end
local count = tonumber(redis.call('HGET', KEYS[1], 'count') or '0')
local name = redis.call('HGET', KEYS[1], 'display_name') or ''
return {count, name}
"#;

/// Reset a stale hash, then add one.
const INCREMENT_SCRIPT: &str = r#"
local last = redis.call('HGET', KEYS[1], 'last_reset_date')
if last ~= ARGV[1] then
  redis.call('HSET', KEYS[1], 'count', 0, 'last_reset_date', ARGV[1])
end
if ARGV[2] ~= '' then
  redis.call('HSET', KEYS[1], 'display_name', ARGV[2])
end
local count = redis.call('HINCRBY', KEYS[1], 'count', 1)
local name = redis.call('HGET', KEYS[1], 'display_name') or ''
return {count, name}
"#;

/// Usage counters stored as one Redis hash per identity (`usage:{key}`).
///
/// Each operation runs as a single script, so Redis itself is the
/// serialization point for concurrent requests on the same key.
pub struct RedisQuotaStore {
    conn: ConnectionManager,
    clock: Arc<dyn Clock>,
    get_script: Script,
    increment_script: Script,
}

impl RedisQuotaStore {
    /// Create a new store connected to `redis_url`
    pub async fn new(redis_url: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| Error::Redis(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            clock,
            get_script: Script::new(GET_USAGE_SCRIPT),
            increment_script: Script::new(INCREMENT_SCRIPT),
        })
    }

    fn key(identity_key: &str) -> String {
        format!("usage:{}", identity_key)
    }
}

fn into_record(
    identity_key: &str,
    today: chrono::NaiveDate,
    (count, name): (u32, String),
) -> UsageRecord {
    UsageRecord {
        identity_key: identity_key.to_string(),
        count,
        last_reset_date: today,
        display_name: (!name.is_empty()).then_some(name),
    }
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn get_usage(&self, identity_key: &str) -> Result<UsageRecord> {
        let today = self.clock.today();
        let mut conn = self.conn.clone();

        let reply: (u32, String) = self
            .get_script
            .key(Self::key(identity_key))
            .arg(today.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;

        Ok(into_record(identity_key, today, reply))
    }

    async fn increment(
        &self,
        identity_key: &str,
        display_name: Option<&str>,
    ) -> Result<UsageRecord> {
        let today = self.clock.today();
        let mut conn = self.conn.clone();

        let reply: (u32, String) = self
            .increment_script
            .key(Self::key(identity_key))
            .arg(today.to_string())
            .arg(display_name.unwrap_or(""))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;

        debug!("Usage for {} is now {}", identity_key, reply.0);
        Ok(into_record(identity_key, today, reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;
    use redis::AsyncCommands;

    async fn get_test_store(clock: Arc<ManualClock>) -> RedisQuotaStore {
        RedisQuotaStore::new("redis://127.0.0.1:6379/15", clock)
            .await
            .expect("Failed to connect to test Redis")
    }

    async fn clear(store: &RedisQuotaStore, identity_key: &str) {
        let mut conn = store.conn.clone();
        let _: () = conn.del(RedisQuotaStore::key(identity_key)).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_increment_and_daily_reset() {
        let clock = Arc::new(ManualClock::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        let store = get_test_store(clock.clone()).await;
        clear(&store, "redis-reset@example.com").await;

        assert_eq!(store.get_usage("redis-reset@example.com").await.unwrap().count, 0);

        store.increment("redis-reset@example.com", Some("Ada")).await.unwrap();
        let record = store.increment("redis-reset@example.com", None).await.unwrap();
        assert_eq!(record.count, 2);
        assert_eq!(record.display_name.as_deref(), Some("Ada"));

        clock.advance_day();
        assert_eq!(store.get_usage("redis-reset@example.com").await.unwrap().count, 0);
        assert_eq!(
            store.increment("redis-reset@example.com", None).await.unwrap().count,
            1
        );

        clear(&store, "redis-reset@example.com").await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires Redis to be running
    async fn test_concurrent_increments() {
        let clock = Arc::new(ManualClock::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        let store = Arc::new(get_test_store(clock).await);
        clear(&store, "redis-burst@example.com").await;

        let mut handles = Vec::new();
        for _ in 0..25 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment("redis-burst@example.com", None).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(
            store.get_usage("redis-burst@example.com").await.unwrap().count,
            25
        );

        clear(&store, "redis-burst@example.com").await;
    }
}
