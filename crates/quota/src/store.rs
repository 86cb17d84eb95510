//! Quota store trait

use async_trait::async_trait;
use std::sync::Arc;
use upscale_common::{Result, UsageRecord};

/// Durable per-identity usage counters with daily reset.
///
/// Implementations must serialize `get_usage`/`increment` for the same
/// identity key so that concurrent increments never lose an update, and
/// must have persisted every mutation before returning.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Current usage for `identity_key`.
    ///
    /// A record whose `last_reset_date` is not today is reset to zero and the
    /// reset is persisted before returning. Unknown keys yield a zeroed record
    /// without creating one.
    async fn get_usage(&self, identity_key: &str) -> Result<UsageRecord>;

    /// Reset if stale, add exactly one, persist and return the new record.
    async fn increment(&self, identity_key: &str, display_name: Option<&str>)
        -> Result<UsageRecord>;
}

#[async_trait]
impl<S: QuotaStore + ?Sized> QuotaStore for Arc<S> {
    async fn get_usage(&self, identity_key: &str) -> Result<UsageRecord> {
        (**self).get_usage(identity_key).await
    }

    async fn increment(
        &self,
        identity_key: &str,
        display_name: Option<&str>,
    ) -> Result<UsageRecord> {
        (**self).increment(identity_key, display_name).await
    }
}
