//! Fixed-Boundary Daily Quota

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc};
use tracing::debug;

use crate::error::EngineError;
use crate::store::Store;

/// Quota state as shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub remaining: i64,
    /// Next UTC midnight, when the counter resets.
    pub reset_at: DateTime<Utc>,
}

/// Per-account counter keyed by UTC calendar day. Unlike the sliding
/// window it resets at a fixed boundary, which is what "N left today"
/// user quotas mean. Counter keys expire after two days so stale days
/// never accumulate.
pub struct DailyQuota {
    store: Arc<dyn Store>,
}

impl DailyQuota {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Consume `amount` from today's budget. When the budget would be
    /// exceeded the consumption is rolled back and the status reports
    /// zero remaining.
    pub async fn consume(
        &self,
        kind: &str,
        account_id: &str,
        amount: i64,
        max: i64,
    ) -> Result<(bool, QuotaStatus), EngineError> {
        let key = day_key(kind, account_id, Utc::now());
        let used = self
            .store
            .incr(&key, amount, Some(RETENTION))
            .await
            .map_err(EngineError::LimiterUnavailable)?;
        if used > max {
            // Roll back so an over-limit attempt does not skew the count.
            self.store
                .incr(&key, -amount, Some(RETENTION))
                .await
                .map_err(EngineError::LimiterUnavailable)?;
            debug!(kind = %kind, account_id = %account_id, max = max, "Daily quota exhausted");
            return Ok((
                false,
                QuotaStatus {
                    remaining: 0,
                    reset_at: next_utc_midnight(Utc::now()),
                },
            ));
        }
        Ok((
            true,
            QuotaStatus {
                remaining: (max - used).max(0),
                reset_at: next_utc_midnight(Utc::now()),
            },
        ))
    }

    /// Return `amount` to today's budget (e.g. when a later step of the
    /// operation turned out to be a no-op).
    pub async fn refund(
        &self,
        kind: &str,
        account_id: &str,
        amount: i64,
    ) -> Result<(), EngineError> {
        let key = day_key(kind, account_id, Utc::now());
        self.store
            .incr(&key, -amount, Some(RETENTION))
            .await
            .map_err(EngineError::LimiterUnavailable)?;
        Ok(())
    }

    /// Read-only view of the remaining budget.
    pub async fn peek(
        &self,
        kind: &str,
        account_id: &str,
        max: i64,
    ) -> Result<QuotaStatus, EngineError> {
        let key = day_key(kind, account_id, Utc::now());
        let used = match self
            .store
            .get(&key)
            .await
            .map_err(EngineError::LimiterUnavailable)?
        {
            Some(raw) => String::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(0),
            None => 0,
        };
        Ok(QuotaStatus {
            remaining: (max - used).max(0),
            reset_at: next_utc_midnight(Utc::now()),
        })
    }
}

const RETENTION: Duration = Duration::from_secs(48 * 3600);

fn day_key(kind: &str, account_id: &str, now: DateTime<Utc>) -> String {
    format!(
        "dq:{}:{}:{:04}{:02}{:02}",
        kind,
        account_id,
        now.year(),
        now.month(),
        now.day()
    )
}

pub(crate) fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + ChronoDuration::days(1);
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).expect("midnight is valid"))
}
