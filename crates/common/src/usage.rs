//! Per-identity daily usage counters

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stored usage for one authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Identity key (verified email)
    pub identity_key: String,

    /// Successful enhancements on `last_reset_date`
    pub count: u32,

    /// Calendar day on which `count` is meaningful
    pub last_reset_date: NaiveDate,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl UsageRecord {
    /// A zeroed record for `today`
    pub fn fresh(identity_key: &str, today: NaiveDate) -> Self {
        Self {
            identity_key: identity_key.to_string(),
            count: 0,
            last_reset_date: today,
            display_name: None,
        }
    }

    /// Apply the daily reset rule. Returns true if the record changed.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.last_reset_date == today {
            return false;
        }
        self.count = 0;
        self.last_reset_date = today;
        true
    }

    pub fn summary(&self, limit: u32) -> UsageSummary {
        UsageSummary::new(self.count, limit)
    }
}

/// Usage as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub count: u32,
    pub limit: u32,
    pub remaining: u32,
}

impl UsageSummary {
    pub fn new(count: u32, limit: u32) -> Self {
        Self {
            count,
            limit,
            remaining: limit.saturating_sub(count),
        }
    }
}
