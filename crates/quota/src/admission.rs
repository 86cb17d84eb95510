//! Admission control
//!
//! Anonymous callers are always admitted: their limit lives in the
//! caller's own storage and cannot be enforced here. Authenticated callers
//! are denied once today's count has reached the daily limit.
//!
//! The check and the later increment are separate operations, so a burst
//! of concurrent requests at the boundary can exceed the limit.

use crate::store::QuotaStore;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use upscale_common::{Identity, Result, UsageRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Proceed; carries the usage snapshot the decision was based on
    Allow(Option<UsageRecord>),
    Deny(DenyReason),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    LimitReached { count: u32, limit: u32 },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::LimitReached { count, limit } => {
                write!(f, "daily limit reached ({}/{})", count, limit)
            }
        }
    }
}

/// Allow/deny decision against a configured daily limit
#[derive(Clone)]
pub struct AdmissionController {
    store: Arc<dyn QuotaStore>,
    daily_limit: u32,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn QuotaStore>, daily_limit: u32) -> Self {
        Self { store, daily_limit }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub async fn check_admission(&self, identity: &Identity) -> Result<Admission> {
        let Some(key) = identity.identity_key() else {
            return Ok(Admission::Allow(None));
        };

        let usage = self.store.get_usage(key).await?;

        if usage.count >= self.daily_limit {
            info!(
                "Denying {}: {} of {} used today",
                key, usage.count, self.daily_limit
            );
            return Ok(Admission::Deny(DenyReason::LimitReached {
                count: usage.count,
                limit: self.daily_limit,
            }));
        }

        Ok(Admission::Allow(Some(usage)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::file_store::FileQuotaStore;
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use upscale_common::UserProfile;

    fn user(email: &str) -> Identity {
        Identity::Authenticated(UserProfile {
            id: "1".to_string(),
            email: email.to_string(),
            name: "Test User".to_string(),
            photo: None,
            provider: "google".to_string(),
        })
    }

    async fn store_with_count(dir: &TempDir, email: &str, count: u32) -> Arc<dyn QuotaStore> {
        let clock = Arc::new(ManualClock::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));
        let store = FileQuotaStore::open(dir.path().join("usage.json"), clock)
            .await
            .unwrap();
        for _ in 0..count {
            store.increment(email, None).await.unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_deny_at_limit() {
        let dir = TempDir::new().unwrap();
        let store = store_with_count(&dir, "full@example.com", 10).await;
        let controller = AdmissionController::new(store, 10);

        let admission = controller
            .check_admission(&user("full@example.com"))
            .await
            .unwrap();
        assert_eq!(
            admission,
            Admission::Deny(DenyReason::LimitReached { count: 10, limit: 10 })
        );
    }

    #[tokio::test]
    async fn test_allow_one_below_limit() {
        let dir = TempDir::new().unwrap();
        let store = store_with_count(&dir, "almost@example.com", 9).await;
        let controller = AdmissionController::new(store, 10);

        let admission = controller
            .check_admission(&user("almost@example.com"))
            .await
            .unwrap();
        assert!(admission.is_allowed());
        match admission {
            Admission::Allow(Some(usage)) => assert_eq!(usage.count, 9),
            other => panic!("unexpected admission: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_anonymous_always_allowed() {
        let dir = TempDir::new().unwrap();
        let store = store_with_count(&dir, "someone@example.com", 0).await;
        let controller = AdmissionController::new(store, 0);

        let admission = controller.check_admission(&Identity::Anonymous).await.unwrap();
        assert_eq!(admission, Admission::Allow(None));
    }
}
