//! Score Engine
//!
//! Two purely functional ranking formulas recomputed from current
//! counters, never stored as ground truth:
//!
//! - Trending: `(max(votes, 0) − 1) / (age_hours + 2)^1.8`, decaying
//!   monotonically with age. Goes negative for zero-vote items, which is
//!   fine for relative ordering.
//! - Hot: Wilson lower confidence bound (z = 1.96) over
//!   `n = votes + 0.01 · views`, so a single early vote cannot outrank
//!   many votes with a lower ratio.
//!
//! [`ScoreEngine::recompute`] writes both values to cache keys; they are
//! always safe to discard and regenerate from the counters.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::store::Store;
use crate::vote::keys;

/// Age decay exponent for the trending score.
pub const GRAVITY: f64 = 1.8;

/// z for the 95% Wilson lower confidence bound.
pub const WILSON_Z: f64 = 1.96;

/// Weight of a view relative to a vote in the hot-score sample size.
pub const VIEW_WEIGHT: f64 = 0.01;

/// `(max(votes, 0) − 1) / (age_hours + 2)^gravity`.
pub fn trending_score(vote_count: i64, age_hours: f64) -> f64 {
    let votes = vote_count.max(0) as f64;
    (votes - 1.0) / (age_hours.max(0.0) + 2.0).powf(GRAVITY)
}

/// Wilson lower bound on the vote ratio; exactly 0 when the weighted
/// sample size is 0.
pub fn hot_score(vote_count: i64, view_count: i64) -> f64 {
    let votes = vote_count.max(0) as f64;
    let n = votes + VIEW_WEIGHT * view_count.max(0) as f64;
    if n == 0.0 {
        return 0.0;
    }
    let z = WILSON_Z;
    let p_hat = votes / n;
    let z2 = z * z;
    (p_hat + z2 / (2.0 * n) - z * ((p_hat * (1.0 - p_hat) + z2 / (4.0 * n)) / n).sqrt())
        / (1.0 + z2 / n)
}

/// Recomputes and caches derived scores for content targets.
pub struct ScoreEngine {
    store: Arc<dyn Store>,
}

impl ScoreEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Recompute both scores for `target` from its counters and cache
    /// them. Cheap enough to run synchronously; callers typically defer
    /// it off the request path.
    pub async fn recompute(&self, target_id: &str) -> Result<(f64, f64), EngineError> {
        let votes = self.read_counter(&keys::vote_count(target_id)).await?;
        let views = self.read_counter(&keys::view_count(target_id)).await?;
        let created_ms = self.read_counter(&keys::created_ms(target_id)).await?;

        let age_hours = if created_ms > 0 {
            (Utc::now().timestamp_millis() - created_ms).max(0) as f64 / 3_600_000.0
        } else {
            0.0
        };

        let trending = trending_score(votes, age_hours);
        let hot = hot_score(votes, views);

        self.store
            .set(&keys::trending(target_id), trending.to_string().into_bytes(), None)
            .await?;
        self.store
            .set(&keys::hot(target_id), hot.to_string().into_bytes(), None)
            .await?;

        debug!(
            target_id = %target_id,
            votes = votes,
            views = views,
            trending = trending,
            hot = hot,
            "Recomputed target scores"
        );
        Ok((trending, hot))
    }

    /// Read back the cached scores, recomputing on a miss.
    pub async fn cached(&self, target_id: &str) -> Result<(f64, f64), EngineError> {
        let trending = self.read_float(&keys::trending(target_id)).await?;
        let hot = self.read_float(&keys::hot(target_id)).await?;
        match (trending, hot) {
            (Some(t), Some(h)) => Ok((t, h)),
            _ => self.recompute(target_id).await,
        }
    }

    async fn read_counter(&self, key: &str) -> Result<i64, EngineError> {
        match self.store.get(key).await? {
            Some(raw) => String::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| EngineError::Internal(format!("bad counter at {}", key))),
            None => Ok(0),
        }
    }

    async fn read_float(&self, key: &str) -> Result<Option<f64>, EngineError> {
        match self.store.get(key).await? {
            Some(raw) => match String::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
                Some(v) => Ok(Some(v)),
                None => {
                    warn!(key = %key, "Discarding unparsable cached score");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}
