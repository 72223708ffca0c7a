//! Ledger Entry Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction/category of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Earn,
    Spend,
    Refund,
    AdminAdjust,
}

/// One immutable ledger entry. `amount` is signed and already has the
/// multiplier applied; `base_amount` and `multiplier` are kept alongside
/// so the effective amount can be reconstructed for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GemTransaction {
    pub id: Uuid,
    pub account_id: String,
    pub kind: TxKind,
    /// Source tag, e.g. `votes`, `referral`, `purchase`.
    pub source: String,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub base_amount: i64,
    pub multiplier: f64,
    /// Id of the triggering record (a vote id, purchase id, ...).
    pub reference_id: Option<String>,
    pub reference_kind: Option<String>,
    pub description: String,
    /// Globally unique; the exactly-once anchor for retries.
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// `base × multiplier`, rounded to the ledger's integer gem unit.
pub fn effective_amount(base_amount: i64, multiplier: f64) -> i64 {
    (base_amount as f64 * multiplier).round() as i64
}
