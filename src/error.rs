//! Engine Error Taxonomy
//!
//! Every storage-layer failure is mapped to one of these kinds at the
//! ledger/limiter boundary; no raw store error crosses into the vote
//! state machine. Rejections that carry counters (rate limited, already
//! voted, daily limit) are not errors — they are outcome variants on the
//! vote ledger so callers must handle every case.

use thiserror::Error;

/// Failures of the backing key-value store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    #[error("backing store round trip timed out after {0}ms")]
    Timeout(u64),

    #[error("corrupt record at {key}: {detail}")]
    Corrupt { key: String, detail: String },
}

/// Failures surfaced by the engine to its callers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Debit would push the gem balance below zero. Terminal.
    #[error("insufficient gem balance: need {needed}, have {available}")]
    InsufficientBalance { needed: i64, available: i64 },

    /// Concurrent balance updates kept winning the compare-and-set.
    /// Retried internally with backoff; surfaced only when exhausted.
    #[error("ledger balance conflict persisted after {attempts} attempts")]
    LedgerConflict { attempts: u32 },

    /// The rate-limiter backing store is down. Never silently treated as
    /// allowed or denied; the caller's configured policy decides.
    #[error("rate limiter unavailable")]
    LimiterUnavailable(#[source] StoreError),

    /// The acting account is suspended; no vote processing happens.
    #[error("account {0} is suspended")]
    AccountSuspended(String),

    /// The target content item was never registered with the engine.
    #[error("target {0} is not registered")]
    UnknownTarget(String),

    /// Anything internal the caller cannot act on. Full context is logged
    /// where the failure happened; only a generic kind crosses upward.
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Internal(e.to_string())
    }
}
