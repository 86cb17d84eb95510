//! Source of "today" for the daily reset rule

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use std::sync::Mutex;
use upscale_common::{Error, Result};

pub trait Clock: Send + Sync {
    /// Current calendar date in the store's fixed zone
    fn today(&self) -> NaiveDate;
}

/// Wall clock pinned to one UTC offset
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Clock whose day boundary is at local midnight for `minutes` east of UTC
    pub fn with_offset_minutes(minutes: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(minutes * 60).ok_or_else(|| {
            Error::Storage(format!("UTC offset out of range: {} minutes", minutes))
        })?;
        Ok(Self { offset })
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    today: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    /// Move to the next calendar day
    pub fn advance_day(&self) {
        let mut today = self.today.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = today.succ_opt() {
            *today = next;
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_validation() {
        assert!(SystemClock::with_offset_minutes(330).is_ok());
        assert!(SystemClock::with_offset_minutes(-24 * 60).is_err());
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
        clock.advance_day();
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        clock.advance_day();
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }
}
