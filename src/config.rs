//! Configuration
//!
//! Env-driven configuration with validated defaults. Every tunable the
//! engine exposes lives here; components receive the relevant sub-struct
//! at construction and never read the environment themselves.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

use crate::fraud::FraudPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub limits: LimitConfig,
    pub fraud: FraudConfig,
    pub rewards: RewardConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Rolling window for the cast-vote limiter, in milliseconds.
    pub vote_window_ms: i64,
    /// Votes allowed per account inside the rolling window.
    pub votes_per_window: u32,
    /// Votes allowed per account per UTC calendar day.
    pub daily_votes: i64,
    /// Vote record retention in days (age-based expiry).
    pub vote_ttl_days: u64,
    /// Whether read-only quota display may fail open when the limiter
    /// store is down. The cast path always fails closed.
    pub fail_open_reads: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudConfig {
    /// Suspicion threshold on the fraud score, in [0, 1].
    pub threshold: f64,
    /// Window for device/origin provenance tracking, in milliseconds.
    pub provenance_window_ms: i64,
    /// Same-target votes per device before the device signal saturates.
    pub device_vote_bound: u32,
    /// Same-origin accounts on one target before the origin signal
    /// saturates.
    pub origin_collision_bound: u32,
    /// Accounts younger than this many days look riskier.
    pub young_account_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Gems credited to a target's owner per accepted vote.
    pub base_amount: i64,
    /// Active reward multiplier, resolved here and passed into the
    /// ledger already decided (e.g. 2.0 during a referral bonus).
    pub multiplier: f64,
    /// Gems an owner can earn from votes per UTC day.
    pub daily_gem_cap: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Staleness bound for cached account status, in milliseconds.
    pub account_ttl_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
    /// Enable per-request logging in the API layer.
    pub log_requests: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8420,
            },
            limits: LimitConfig {
                vote_window_ms: 60_000,
                votes_per_window: 10,
                daily_votes: 100,
                vote_ttl_days: 90,
                fail_open_reads: true,
            },
            fraud: FraudConfig {
                threshold: 0.7,
                provenance_window_ms: 600_000,
                device_vote_bound: 3,
                origin_collision_bound: 5,
                young_account_days: 7,
            },
            rewards: RewardConfig {
                base_amount: 5,
                multiplier: 1.0,
                daily_gem_cap: 500,
            },
            cache: CacheConfig {
                account_ttl_ms: 30_000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                log_requests: false,
            },
        }
    }
}

impl EngineConfig {
    /// Load from `LAZULI_*` environment variables over the defaults and
    /// validate the result.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = env::var("LAZULI_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = env::var("LAZULI_PORT") {
            config.server.port = port.parse().context("Invalid LAZULI_PORT value")?;
        }

        if let Ok(v) = env::var("LAZULI_VOTE_WINDOW_MS") {
            config.limits.vote_window_ms =
                v.parse().context("Invalid LAZULI_VOTE_WINDOW_MS value")?;
        }
        if let Ok(v) = env::var("LAZULI_VOTES_PER_WINDOW") {
            config.limits.votes_per_window =
                v.parse().context("Invalid LAZULI_VOTES_PER_WINDOW value")?;
        }
        if let Ok(v) = env::var("LAZULI_DAILY_VOTES") {
            config.limits.daily_votes = v.parse().context("Invalid LAZULI_DAILY_VOTES value")?;
        }
        if let Ok(v) = env::var("LAZULI_VOTE_TTL_DAYS") {
            config.limits.vote_ttl_days =
                v.parse().context("Invalid LAZULI_VOTE_TTL_DAYS value")?;
        }
        if let Ok(v) = env::var("LAZULI_LIMITER_FAIL_OPEN_READS") {
            config.limits.fail_open_reads = v
                .parse()
                .context("Invalid LAZULI_LIMITER_FAIL_OPEN_READS value")?;
        }

        if let Ok(v) = env::var("LAZULI_FRAUD_THRESHOLD") {
            config.fraud.threshold = v.parse().context("Invalid LAZULI_FRAUD_THRESHOLD value")?;
        }
        if let Ok(v) = env::var("LAZULI_PROVENANCE_WINDOW_MS") {
            config.fraud.provenance_window_ms = v
                .parse()
                .context("Invalid LAZULI_PROVENANCE_WINDOW_MS value")?;
        }
        if let Ok(v) = env::var("LAZULI_DEVICE_VOTE_BOUND") {
            config.fraud.device_vote_bound =
                v.parse().context("Invalid LAZULI_DEVICE_VOTE_BOUND value")?;
        }
        if let Ok(v) = env::var("LAZULI_ORIGIN_COLLISION_BOUND") {
            config.fraud.origin_collision_bound = v
                .parse()
                .context("Invalid LAZULI_ORIGIN_COLLISION_BOUND value")?;
        }
        if let Ok(v) = env::var("LAZULI_YOUNG_ACCOUNT_DAYS") {
            config.fraud.young_account_days = v
                .parse()
                .context("Invalid LAZULI_YOUNG_ACCOUNT_DAYS value")?;
        }

        if let Ok(v) = env::var("LAZULI_REWARD_BASE") {
            config.rewards.base_amount = v.parse().context("Invalid LAZULI_REWARD_BASE value")?;
        }
        if let Ok(v) = env::var("LAZULI_REWARD_MULTIPLIER") {
            config.rewards.multiplier =
                v.parse().context("Invalid LAZULI_REWARD_MULTIPLIER value")?;
        }
        if let Ok(v) = env::var("LAZULI_DAILY_GEM_CAP") {
            config.rewards.daily_gem_cap =
                v.parse().context("Invalid LAZULI_DAILY_GEM_CAP value")?;
        }

        if let Ok(v) = env::var("LAZULI_ACCOUNT_CACHE_TTL_MS") {
            config.cache.account_ttl_ms = v
                .parse()
                .context("Invalid LAZULI_ACCOUNT_CACHE_TTL_MS value")?;
        }

        if let Ok(v) = env::var("LAZULI_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = env::var("LAZULI_LOG_REQUESTS") {
            config.logging.log_requests =
                v.parse().context("Invalid LAZULI_LOG_REQUESTS value")?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }
        if self.limits.vote_window_ms <= 0 {
            return Err(anyhow::anyhow!("Vote window must be positive"));
        }
        if self.limits.votes_per_window == 0 {
            return Err(anyhow::anyhow!("Votes per window must be non-zero"));
        }
        if self.limits.daily_votes <= 0 {
            return Err(anyhow::anyhow!("Daily vote quota must be positive"));
        }
        if !(0.0..=1.0).contains(&self.fraud.threshold) {
            return Err(anyhow::anyhow!(
                "Fraud threshold must be in [0, 1], got {}",
                self.fraud.threshold
            ));
        }
        if self.fraud.provenance_window_ms <= 0 {
            return Err(anyhow::anyhow!("Provenance window must be positive"));
        }
        if self.rewards.base_amount < 0 {
            return Err(anyhow::anyhow!("Reward base amount cannot be negative"));
        }
        if self.rewards.multiplier <= 0.0 {
            return Err(anyhow::anyhow!(
                "Reward multiplier must be positive, got {}",
                self.rewards.multiplier
            ));
        }
        if self.rewards.daily_gem_cap < 0 {
            return Err(anyhow::anyhow!("Daily gem cap cannot be negative"));
        }
        if self.cache.account_ttl_ms <= 0 {
            return Err(anyhow::anyhow!("Account cache TTL must be positive"));
        }
        Ok(())
    }

    /// The fraud policy as the scorer consumes it.
    pub fn fraud_policy(&self) -> FraudPolicy {
        FraudPolicy {
            threshold: self.fraud.threshold,
            device_vote_bound: self.fraud.device_vote_bound,
            origin_collision_bound: self.fraud.origin_collision_bound,
            young_account_days: self.fraud.young_account_days,
        }
    }
}
