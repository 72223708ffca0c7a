//! Account Status Directory
//!
//! Two-tier lookup for account standing: a cache with a fixed staleness
//! bound over the store record written by the profile service. The cache
//! is invalidated explicitly on suspension events — there is no implicit
//! "read cache, maybe fall back" side channel.
//!
//! Accounts the profile service has not written yet resolve to a neutral
//! default (trust 50, created now), so a missing record degrades to
//! cautious scoring rather than a hard failure.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountStatus {
    /// Reputation value, 0–100.
    pub trust_score: u8,
    pub created_at: DateTime<Utc>,
    pub suspended: bool,
}

impl AccountStatus {
    pub fn age_days(&self, now: DateTime<Utc>) -> u32 {
        (now - self.created_at).num_days().max(0) as u32
    }
}

struct CachedStatus {
    status: AccountStatus,
    fetched_at_ms: i64,
}

pub struct AccountDirectory {
    store: Arc<dyn Store>,
    cache: DashMap<String, CachedStatus>,
    ttl_ms: i64,
}

impl AccountDirectory {
    pub fn new(store: Arc<dyn Store>, ttl_ms: i64) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            ttl_ms,
        }
    }

    /// Resolve an account's standing, serving from cache within the
    /// staleness bound.
    pub async fn status(&self, account_id: &str) -> Result<AccountStatus, EngineError> {
        let now_ms = Utc::now().timestamp_millis();
        if let Some(cached) = self.cache.get(account_id) {
            if now_ms - cached.fetched_at_ms < self.ttl_ms {
                return Ok(cached.status.clone());
            }
        }

        let status = match self.store.get(&record_key(account_id)).await? {
            Some(raw) => serde_json::from_slice(&raw)
                .map_err(|e| EngineError::Internal(format!("bad account record: {}", e)))?,
            None => AccountStatus {
                trust_score: 50,
                created_at: Utc::now(),
                suspended: false,
            },
        };

        self.cache.insert(
            account_id.to_string(),
            CachedStatus {
                status: status.clone(),
                fetched_at_ms: now_ms,
            },
        );
        debug!(account_id = %account_id, trust = status.trust_score, "Refreshed account status");
        Ok(status)
    }

    /// Write or update an account record and refresh the cache.
    pub async fn upsert(
        &self,
        account_id: &str,
        status: AccountStatus,
    ) -> Result<(), EngineError> {
        let raw = serde_json::to_vec(&status)
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        self.store.set(&record_key(account_id), raw, None).await?;
        self.cache.insert(
            account_id.to_string(),
            CachedStatus {
                status,
                fetched_at_ms: Utc::now().timestamp_millis(),
            },
        );
        Ok(())
    }

    /// Suspend an account and invalidate immediately; the next lookup
    /// sees the suspension regardless of cache freshness.
    pub async fn suspend(&self, account_id: &str) -> Result<(), EngineError> {
        let mut status = self.status(account_id).await?;
        status.suspended = true;
        self.upsert(account_id, status).await?;
        self.invalidate(account_id);
        info!(account_id = %account_id, "Account suspended");
        Ok(())
    }

    /// Drop a cached entry, forcing the next lookup to hit the store.
    pub fn invalidate(&self, account_id: &str) {
        self.cache.remove(account_id);
    }
}

fn record_key(account_id: &str) -> String {
    format!("acct:{}", account_id)
}
