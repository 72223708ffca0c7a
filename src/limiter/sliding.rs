//! Sliding-Window Limiter

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::error::EngineError;
use crate::store::Store;

/// Outcome of one `allow` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterDecision {
    pub allowed: bool,
    /// Events still available in the current window after this call.
    pub remaining: u32,
    /// When the oldest counted event falls out of the window.
    pub reset_at: DateTime<Utc>,
}

/// Generic per-key limiter over a rolling time window.
pub struct SlidingWindowLimiter {
    store: Arc<dyn Store>,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Atomically prune markers older than `now − window_ms`, count the
    /// rest, and insert a new marker iff the count is below
    /// `max_events`. `allowed` is true iff a marker was inserted.
    pub async fn allow(
        &self,
        key: &str,
        window_ms: i64,
        max_events: u32,
    ) -> Result<LimiterDecision, EngineError> {
        let now = Utc::now().timestamp_millis();
        let marker = rand::random::<u64>();
        let slide = self
            .store
            .window_slide(
                &window_key(key),
                now - window_ms,
                now,
                marker,
                Some(max_events),
                Duration::from_millis(window_ms.max(0) as u64),
            )
            .await
            .map_err(EngineError::LimiterUnavailable)?;

        let reset_ms = slide.oldest_ms.unwrap_or(now) + window_ms;
        let decision = LimiterDecision {
            allowed: slide.inserted,
            remaining: max_events.saturating_sub(slide.count),
            reset_at: ms_to_datetime(reset_ms),
        };
        if !decision.allowed {
            debug!(key = %key, max = max_events, "Sliding window exhausted");
        }
        Ok(decision)
    }

    /// Record an event unconditionally and return how many distinct
    /// members the window then holds, this one included. Used for
    /// provenance tracking (device/origin activity), where `member`
    /// dedupes repeat appearances of the same identity.
    pub async fn observe(
        &self,
        key: &str,
        window_ms: i64,
        member: u64,
    ) -> Result<u32, EngineError> {
        let now = Utc::now().timestamp_millis();
        let slide = self
            .store
            .window_slide(
                &window_key(key),
                now - window_ms,
                now,
                member,
                None,
                Duration::from_millis(window_ms.max(0) as u64),
            )
            .await
            .map_err(EngineError::LimiterUnavailable)?;
        Ok(slide.count)
    }

    /// Count window members without inserting anything.
    pub async fn peek(&self, key: &str, window_ms: i64) -> Result<u32, EngineError> {
        let now = Utc::now().timestamp_millis();
        let slide = self
            .store
            .window_slide(
                &window_key(key),
                now - window_ms,
                now,
                0,
                Some(0),
                Duration::from_millis(window_ms.max(0) as u64),
            )
            .await
            .map_err(EngineError::LimiterUnavailable)?;
        Ok(slide.count)
    }
}

fn window_key(key: &str) -> String {
    format!("rl:{}", key)
}

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}
