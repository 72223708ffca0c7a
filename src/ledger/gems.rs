//! Gem Ledger Implementation

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, StoreError};
use crate::store::Store;

use super::transaction::{effective_amount, GemTransaction, TxKind};

/// Parameters of one posting. The multiplier is resolved by the caller
/// (e.g. an active referral bonus) and arrives already decided; the
/// ledger applies and records it.
#[derive(Debug, Clone)]
pub struct Posting {
    pub account_id: String,
    pub base_amount: i64,
    pub multiplier: f64,
    pub source: String,
    pub reference_id: Option<String>,
    pub reference_kind: Option<String>,
    pub description: String,
    pub idempotency_key: String,
}

/// Outcome of a posting: the committed (or previously committed) entry.
#[derive(Debug, Clone)]
pub struct LedgerReceipt {
    pub transaction: GemTransaction,
    pub new_balance: i64,
    /// True when the idempotency key had already committed and this call
    /// was a no-op replay.
    pub replayed: bool,
}

/// Versioned balance head; the compare-and-set target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BalanceHead {
    balance: i64,
    version: u64,
}

pub struct GemLedger {
    store: Arc<dyn Store>,
    /// Per-account critical sections; accounts never block each other.
    account_locks: DashMap<String, Arc<Mutex<()>>>,
    max_attempts: u32,
}

const CONFLICT_BACKOFF: Duration = Duration::from_millis(10);

impl GemLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            account_locks: DashMap::new(),
            max_attempts: 5,
        }
    }

    /// Add gems to an account. Exactly-once per idempotency key.
    pub async fn credit(&self, posting: Posting) -> Result<LedgerReceipt, EngineError> {
        self.post(posting, TxKind::Earn, 1).await
    }

    /// Remove gems from an account; fails with `InsufficientBalance`
    /// rather than letting the balance go negative.
    pub async fn debit(&self, posting: Posting, kind: TxKind) -> Result<LedgerReceipt, EngineError> {
        self.post(posting, kind, -1).await
    }

    /// Operator correction; either sign via the posting's base amount
    /// sign, still bounded below by zero.
    pub async fn adjust(&self, posting: Posting) -> Result<LedgerReceipt, EngineError> {
        let sign = if posting.base_amount < 0 { -1 } else { 1 };
        let posting = Posting {
            base_amount: posting.base_amount.abs(),
            ..posting
        };
        self.post(posting, TxKind::AdminAdjust, sign).await
    }

    pub async fn balance(&self, account_id: &str) -> Result<i64, EngineError> {
        Ok(self.load_head(account_id).await?.0.balance)
    }

    /// Most recent entries first, like a statement.
    pub async fn history(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<GemTransaction>, EngineError> {
        let raw = self.store.log_scan(&log_key(account_id)).await?;
        let mut entries = Vec::with_capacity(raw.len().min(limit));
        for bytes in raw.iter().rev().take(limit) {
            entries.push(decode_tx(account_id, bytes)?);
        }
        Ok(entries)
    }

    /// Look up the committed entry for an idempotency key, if any.
    /// Compensating flows use this to mirror the original amounts
    /// instead of recomputing them under possibly-changed config.
    pub async fn find_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<GemTransaction>, EngineError> {
        self.load_idem(idempotency_key).await
    }

    /// Full history in commit order, for balance replay/audit.
    pub async fn replay(&self, account_id: &str) -> Result<Vec<GemTransaction>, EngineError> {
        let raw = self.store.log_scan(&log_key(account_id)).await?;
        raw.iter().map(|bytes| decode_tx(account_id, bytes)).collect()
    }

    async fn post(
        &self,
        posting: Posting,
        kind: TxKind,
        sign: i64,
    ) -> Result<LedgerReceipt, EngineError> {
        let amount = sign * effective_amount(posting.base_amount, posting.multiplier);

        // Fast replay check outside the lock; retries of confirmed
        // postings never touch the balance path.
        if let Some(existing) = self.load_idem(&posting.idempotency_key).await? {
            return self.replay_receipt(existing).await;
        }

        let lock = self.lock_for(&posting.account_id);
        let _guard = lock.lock().await;

        // Re-check under the lock: a concurrent call with the same key
        // may have committed while we waited.
        if let Some(existing) = self.load_idem(&posting.idempotency_key).await? {
            return self.replay_receipt(existing).await;
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let (head, head_raw) = self.load_head(&posting.account_id).await?;
            let balance_before = head.balance;
            let balance_after = balance_before + amount;
            if balance_after < 0 {
                return Err(EngineError::InsufficientBalance {
                    needed: -amount,
                    available: balance_before,
                });
            }

            let new_head = BalanceHead {
                balance: balance_after,
                version: head.version + 1,
            };
            let committed = self
                .store
                .compare_and_set(
                    &head_key(&posting.account_id),
                    head_raw.as_deref(),
                    encode(&new_head)?,
                    None,
                )
                .await?;

            if committed {
                let tx = GemTransaction {
                    id: Uuid::new_v4(),
                    account_id: posting.account_id.clone(),
                    kind,
                    source: posting.source.clone(),
                    amount,
                    balance_before,
                    balance_after,
                    base_amount: posting.base_amount,
                    multiplier: posting.multiplier,
                    reference_id: posting.reference_id.clone(),
                    reference_kind: posting.reference_kind.clone(),
                    description: posting.description.clone(),
                    idempotency_key: posting.idempotency_key.clone(),
                    created_at: Utc::now(),
                };
                let encoded = encode(&tx)?;
                let fresh = self
                    .store
                    .insert_unique(&idem_key(&posting.idempotency_key), encoded.clone(), None)
                    .await?;
                if !fresh {
                    // Unreachable under the per-account lock; an external
                    // writer sharing the keyspace would show up here.
                    warn!(
                        idempotency_key = %posting.idempotency_key,
                        "Idempotency key appeared mid-commit"
                    );
                }
                self.store
                    .log_append(&log_key(&posting.account_id), encoded)
                    .await?;

                info!(
                    account_id = %posting.account_id,
                    kind = ?kind,
                    amount = amount,
                    balance_after = balance_after,
                    idempotency_key = %posting.idempotency_key,
                    "Ledger entry committed"
                );
                return Ok(LedgerReceipt {
                    transaction: tx,
                    new_balance: balance_after,
                    replayed: false,
                });
            }

            if attempts >= self.max_attempts {
                warn!(
                    account_id = %posting.account_id,
                    attempts = attempts,
                    "Balance compare-and-set kept losing"
                );
                return Err(EngineError::LedgerConflict { attempts });
            }
            debug!(
                account_id = %posting.account_id,
                attempt = attempts,
                "Balance head moved, retrying"
            );
            tokio::time::sleep(CONFLICT_BACKOFF * attempts).await;
        }
    }

    async fn replay_receipt(&self, tx: GemTransaction) -> Result<LedgerReceipt, EngineError> {
        let balance = self.balance(&tx.account_id).await?;
        debug!(
            idempotency_key = %tx.idempotency_key,
            account_id = %tx.account_id,
            "Replayed existing ledger entry"
        );
        Ok(LedgerReceipt {
            transaction: tx,
            new_balance: balance,
            replayed: true,
        })
    }

    async fn load_idem(&self, key: &str) -> Result<Option<GemTransaction>, EngineError> {
        match self.store.get(&idem_key(key)).await? {
            Some(bytes) => Ok(Some(decode_tx(key, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_head(
        &self,
        account_id: &str,
    ) -> Result<(BalanceHead, Option<Vec<u8>>), EngineError> {
        match self.store.get(&head_key(account_id)).await? {
            Some(raw) => {
                let head = serde_json::from_slice(&raw).map_err(|e| {
                    EngineError::from(StoreError::Corrupt {
                        key: head_key(account_id),
                        detail: e.to_string(),
                    })
                })?;
                Ok((head, Some(raw)))
            }
            None => Ok((BalanceHead::default(), None)),
        }
    }

    fn lock_for(&self, account_id: &str) -> Arc<Mutex<()>> {
        self.account_locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn head_key(account_id: &str) -> String {
    format!("gl:head:{}", account_id)
}

fn idem_key(key: &str) -> String {
    format!("gl:idem:{}", key)
}

fn log_key(account_id: &str) -> String {
    format!("gl:log:{}", account_id)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, EngineError> {
    serde_json::to_vec(value).map_err(|e| EngineError::Internal(e.to_string()))
}

fn decode_tx(context: &str, bytes: &[u8]) -> Result<GemTransaction, EngineError> {
    serde_json::from_slice(bytes).map_err(|e| {
        EngineError::from(StoreError::Corrupt {
            key: context.to_string(),
            detail: e.to_string(),
        })
    })
}
