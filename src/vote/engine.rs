//! Vote Processing State Machine

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::accounts::AccountDirectory;
use crate::config::EngineConfig;
use crate::error::{EngineError, StoreError};
use crate::fraud::{self, FraudPolicy, FraudSignals};
use crate::ledger::{GemLedger, Posting, TxKind};
use crate::limiter::{DailyQuota, SlidingWindowLimiter};
use crate::scoring::ScoreEngine;
use crate::store::Store;

use super::keys;
use super::record::Vote;

/// Input to one cast. Fixed field set; the routing layer rejects
/// anything extra before it gets here.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CastRequest {
    pub actor_id: String,
    pub target_id: String,
    pub device_id: String,
    pub origin_hash: String,
    pub session_id: Option<String>,
}

/// Every way a cast can resolve. Rejections are variants, not errors,
/// and each carries the counters the caller needs to render state
/// without a second fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CastOutcome {
    Accepted {
        vote_id: Uuid,
        new_vote_count: i64,
        daily_votes_remaining: i64,
        reward_granted: bool,
        flagged: bool,
    },
    /// Idempotent success: the pair already voted, nothing changed.
    AlreadyVoted {
        vote_count: i64,
        daily_votes_remaining: i64,
    },
    RateLimited {
        vote_count: i64,
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    DailyLimitExceeded {
        vote_count: i64,
        reset_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UndoOutcome {
    Reversed { new_vote_count: i64 },
    /// No vote to undo; a no-op, not an error.
    NoSuchVote { vote_count: i64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyStatus {
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
    /// True when the limiter store was down and the figure is the
    /// configured fail-open default rather than a real count.
    pub degraded: bool,
}

pub struct VoteLedger {
    store: Arc<dyn Store>,
    limiter: SlidingWindowLimiter,
    daily: DailyQuota,
    ledger: Arc<GemLedger>,
    scores: Arc<ScoreEngine>,
    accounts: Arc<AccountDirectory>,
    policy: FraudPolicy,
    config: EngineConfig,
}

impl VoteLedger {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<GemLedger>,
        scores: Arc<ScoreEngine>,
        accounts: Arc<AccountDirectory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            limiter: SlidingWindowLimiter::new(store.clone()),
            daily: DailyQuota::new(store.clone()),
            store,
            ledger,
            scores,
            accounts,
            policy: config.fraud_policy(),
            config,
        }
    }

    /// Register a content item so votes against it can resolve its
    /// owner and creation time. Called by the content ingestion path.
    pub async fn register_target(
        &self,
        target_id: &str,
        owner_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.store
            .set(
                &keys::owner(target_id),
                owner_id.as_bytes().to_vec(),
                None,
            )
            .await?;
        self.store
            .set(
                &keys::created_ms(target_id),
                created_at.timestamp_millis().to_string().into_bytes(),
                None,
            )
            .await?;
        debug!(target_id = %target_id, owner_id = %owner_id, "Registered vote target");
        Ok(())
    }

    /// Record a view; feeds the hot-score denominator.
    pub async fn record_view(&self, target_id: &str) -> Result<i64, EngineError> {
        Ok(self.store.incr(&keys::view_count(target_id), 1, None).await?)
    }

    pub async fn vote_count(&self, target_id: &str) -> Result<i64, EngineError> {
        match self.store.get(&keys::vote_count(target_id)).await? {
            Some(raw) => String::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| EngineError::Internal("bad vote counter".to_string())),
            None => Ok(0),
        }
    }

    /// Process one vote action; see the module diagram for the stages.
    pub async fn cast_vote(&self, request: CastRequest) -> Result<CastOutcome, EngineError> {
        let actor = self.accounts.status(&request.actor_id).await?;
        if actor.suspended {
            return Err(EngineError::AccountSuspended(request.actor_id.clone()));
        }

        let owner_id = self.target_owner(&request.target_id).await?;

        // Rolling per-account window first; cheapest rejection.
        let decision = self
            .limiter
            .allow(
                &keys::cast_limiter(&request.actor_id),
                self.config.limits.vote_window_ms,
                self.config.limits.votes_per_window,
            )
            .await?;
        if !decision.allowed {
            return Ok(CastOutcome::RateLimited {
                vote_count: self.vote_count(&request.target_id).await?,
                remaining: decision.remaining,
                reset_at: decision.reset_at,
            });
        }

        // Fixed-boundary daily quota, consumed up front and refunded if
        // the cast turns out to be a duplicate.
        let (within_quota, quota) = self
            .daily
            .consume("votes", &request.actor_id, 1, self.config.limits.daily_votes)
            .await?;
        if !within_quota {
            return Ok(CastOutcome::DailyLimitExceeded {
                vote_count: self.vote_count(&request.target_id).await?,
                reset_at: quota.reset_at,
            });
        }

        // Provenance counts read before the vote exists, so a rejected
        // duplicate leaves no trace in the windows.
        let signals = self.gather_signals(&actor, &request).await?;
        let verdict = fraud::score(&signals, &self.policy);

        let mut vote = Vote {
            id: Uuid::new_v4(),
            target_id: request.target_id.clone(),
            actor_id: request.actor_id.clone(),
            owner_id: owner_id.clone(),
            device_id: request.device_id.clone(),
            origin_hash: request.origin_hash.clone(),
            session_id: request.session_id.clone(),
            reward_granted: false,
            reward_batch_id: None,
            fraud_score: verdict.score,
            flagged: verdict.suspicious,
            created_at: Utc::now(),
        };

        // The storage-level uniqueness constraint is the only duplicate
        // guard; two concurrent casts race here and exactly one wins.
        let encoded = encode(&vote)?;
        let inserted = self
            .store
            .insert_unique(
                &keys::vote(&request.target_id, &request.actor_id),
                encoded.clone(),
                Some(self.vote_ttl()),
            )
            .await?;
        if !inserted {
            self.daily.refund("votes", &request.actor_id, 1).await?;
            // A prior cast may have died between insert and credit;
            // converge it instead of leaving the reward dangling.
            if let Some((existing, raw)) =
                self.load_vote(&request.target_id, &request.actor_id).await?
            {
                self.ensure_reward(existing, raw).await?;
            }
            let status = self
                .daily
                .peek("votes", &request.actor_id, self.config.limits.daily_votes)
                .await?;
            return Ok(CastOutcome::AlreadyVoted {
                vote_count: self.vote_count(&request.target_id).await?,
                daily_votes_remaining: status.remaining,
            });
        }

        if verdict.suspicious {
            warn!(
                actor_id = %request.actor_id,
                target_id = %request.target_id,
                score = verdict.score,
                "Vote flagged for moderation review"
            );
        }

        // Accepted: now the windows learn about this device/origin.
        self.observe_provenance(&request).await?;

        let new_vote_count = self
            .store
            .incr(&keys::vote_count(&request.target_id), 1, None)
            .await?;

        vote = self.ensure_reward(vote, encoded).await?;

        self.spawn_recompute(&request.target_id);

        info!(
            actor_id = %request.actor_id,
            target_id = %request.target_id,
            vote_id = %vote.id,
            vote_count = new_vote_count,
            reward_granted = vote.reward_granted,
            flagged = vote.flagged,
            "Vote accepted"
        );
        Ok(CastOutcome::Accepted {
            vote_id: vote.id,
            new_vote_count,
            daily_votes_remaining: quota.remaining,
            reward_granted: vote.reward_granted,
            flagged: vote.flagged,
        })
    }

    /// Withdraw a vote. The compensating debit happens before the record
    /// is deleted: if anything dies in between, a retry finds the vote
    /// still present and the debit replays as a no-op.
    pub async fn undo_vote(
        &self,
        actor_id: &str,
        target_id: &str,
    ) -> Result<UndoOutcome, EngineError> {
        let vote = match self.load_vote(target_id, actor_id).await? {
            Some((vote, _)) => vote,
            None => {
                return Ok(UndoOutcome::NoSuchVote {
                    vote_count: self.vote_count(target_id).await?,
                })
            }
        };

        if vote.reward_granted {
            // Mirror the original credit's amounts; config may have
            // changed since the reward was paid.
            let original = self
                .ledger
                .find_by_key(&vote.reward_key())
                .await?
                .ok_or_else(|| {
                    EngineError::Internal(format!(
                        "vote {} marked rewarded but ledger entry is missing",
                        vote.id
                    ))
                })?;
            let receipt = self
                .ledger
                .debit(
                    Posting {
                        account_id: original.account_id.clone(),
                        base_amount: original.base_amount,
                        multiplier: original.multiplier,
                        source: "votes".to_string(),
                        reference_id: Some(vote.id.to_string()),
                        reference_kind: Some("vote".to_string()),
                        description: format!("vote withdrawn on {}", vote.target_id),
                        idempotency_key: vote.reversal_key(),
                    },
                    TxKind::Refund,
                )
                .await?;
            debug!(
                vote_id = %vote.id,
                owner_id = %vote.owner_id,
                transaction_id = %receipt.transaction.id,
                replayed = receipt.replayed,
                "Compensating debit for withdrawn vote"
            );
        }

        let removed = self
            .store
            .remove(&keys::vote(target_id, actor_id))
            .await?;
        if !removed {
            // Lost the race to a concurrent undo; that one owns the
            // counter decrement.
            return Ok(UndoOutcome::NoSuchVote {
                vote_count: self.vote_count(target_id).await?,
            });
        }

        let new_vote_count = self.store.incr(&keys::vote_count(target_id), -1, None).await?;
        self.spawn_recompute(target_id);

        info!(
            actor_id = %actor_id,
            target_id = %target_id,
            vote_id = %vote.id,
            vote_count = new_vote_count,
            "Vote withdrawn"
        );
        Ok(UndoOutcome::Reversed { new_vote_count })
    }

    /// Remaining daily quota and its reset time. May fail open when so
    /// configured; the cast path never does.
    pub async fn daily_status(&self, actor_id: &str) -> Result<DailyStatus, EngineError> {
        match self
            .daily
            .peek("votes", actor_id, self.config.limits.daily_votes)
            .await
        {
            Ok(status) => Ok(DailyStatus {
                remaining: status.remaining,
                reset_at: status.reset_at,
                degraded: false,
            }),
            Err(EngineError::LimiterUnavailable(cause)) if self.config.limits.fail_open_reads => {
                warn!(error = %cause, "Quota store down; serving fail-open daily status");
                Ok(DailyStatus {
                    remaining: self.config.limits.daily_votes,
                    reset_at: crate::limiter::daily::next_utc_midnight(Utc::now()),
                    degraded: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Grant the owner's reward for `vote` if it is still owed. Safe to
    /// call repeatedly: the ledger key is derived from the vote id.
    /// `prior` is the stored record's bytes as last seen by the caller;
    /// the updated record is written back with compare-and-set so a
    /// concurrent undo's delete is never overwritten.
    async fn ensure_reward(&self, mut vote: Vote, prior: Vec<u8>) -> Result<Vote, EngineError> {
        if vote.reward_granted {
            return Ok(vote);
        }
        // Self-votes earn nothing.
        if vote.actor_id == vote.owner_id {
            return Ok(vote);
        }

        let effective =
            crate::ledger::effective_amount(self.config.rewards.base_amount, self.config.rewards.multiplier);
        let (under_cap, _) = self
            .daily
            .consume(
                "gems",
                &vote.owner_id,
                effective,
                self.config.rewards.daily_gem_cap,
            )
            .await?;
        if !under_cap {
            debug!(
                owner_id = %vote.owner_id,
                vote_id = %vote.id,
                "Owner at daily gem cap; no reward"
            );
            return Ok(vote);
        }

        let receipt = match self
            .ledger
            .credit(Posting {
                account_id: vote.owner_id.clone(),
                base_amount: self.config.rewards.base_amount,
                multiplier: self.config.rewards.multiplier,
                source: "votes".to_string(),
                reference_id: Some(vote.id.to_string()),
                reference_kind: Some("vote".to_string()),
                description: format!("vote received on {}", vote.target_id),
                idempotency_key: vote.reward_key(),
            })
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                // The credit never landed; hand the cap headroom back.
                if let Err(refund_err) =
                    self.daily.refund("gems", &vote.owner_id, effective).await
                {
                    warn!(
                        owner_id = %vote.owner_id,
                        error = %refund_err,
                        "Gem cap refund failed after credit error"
                    );
                }
                return Err(e);
            }
        };
        if receipt.replayed {
            // A racing retry already paid this reward; hand the cap back.
            self.daily.refund("gems", &vote.owner_id, effective).await?;
        }

        vote.reward_granted = true;
        vote.reward_batch_id = Some(receipt.transaction.id.to_string());
        let written = self
            .store
            .compare_and_set(
                &keys::vote(&vote.target_id, &vote.actor_id),
                Some(prior.as_slice()),
                encode(&vote)?,
                Some(self.vote_ttl()),
            )
            .await?;
        if !written {
            if self
                .store
                .get(&keys::vote(&vote.target_id, &vote.actor_id))
                .await?
                .is_some()
            {
                // Another writer updated the record; its version stands
                // and the credit is recorded under the same key either way.
                return Ok(vote);
            }
            // The vote was withdrawn while the reward was in flight. The
            // undo path saw reward_granted=false and debited nothing, so
            // compensate here and leave no record behind.
            warn!(
                vote_id = %vote.id,
                owner_id = %vote.owner_id,
                "Vote withdrawn mid-reward; compensating the credit"
            );
            self.ledger
                .debit(
                    Posting {
                        account_id: receipt.transaction.account_id.clone(),
                        base_amount: receipt.transaction.base_amount,
                        multiplier: receipt.transaction.multiplier,
                        source: "votes".to_string(),
                        reference_id: Some(vote.id.to_string()),
                        reference_kind: Some("vote".to_string()),
                        description: format!("vote withdrawn on {}", vote.target_id),
                        idempotency_key: vote.reversal_key(),
                    },
                    TxKind::Refund,
                )
                .await?;
            if !receipt.replayed {
                self.daily.refund("gems", &vote.owner_id, effective).await?;
            }
            vote.reward_granted = false;
            vote.reward_batch_id = None;
        }
        Ok(vote)
    }

    async fn gather_signals(
        &self,
        actor: &crate::accounts::AccountStatus,
        request: &CastRequest,
    ) -> Result<FraudSignals, EngineError> {
        let window = self.config.fraud.provenance_window_ms;
        let device_votes = self
            .limiter
            .peek(
                &keys::device_window(&request.device_id, &request.target_id),
                window,
            )
            .await?;
        let origin_accounts = self
            .limiter
            .peek(
                &keys::origin_window(&request.origin_hash, &request.target_id),
                window,
            )
            .await?;
        Ok(FraudSignals {
            trust_score: actor.trust_score,
            account_age_days: actor.age_days(Utc::now()),
            device_votes_on_target: device_votes,
            origin_accounts_on_target: origin_accounts,
        })
    }

    async fn observe_provenance(&self, request: &CastRequest) -> Result<(), EngineError> {
        let window = self.config.fraud.provenance_window_ms;
        // Each device event counts; origin entries dedupe per account so
        // the count approximates distinct accounts behind one origin.
        self.limiter
            .observe(
                &keys::device_window(&request.device_id, &request.target_id),
                window,
                rand::random::<u64>(),
            )
            .await?;
        self.limiter
            .observe(
                &keys::origin_window(&request.origin_hash, &request.target_id),
                window,
                member_hash(&request.actor_id),
            )
            .await?;
        Ok(())
    }

    async fn target_owner(&self, target_id: &str) -> Result<String, EngineError> {
        match self.store.get(&keys::owner(target_id)).await? {
            Some(raw) => String::from_utf8(raw)
                .map_err(|_| EngineError::Internal("bad owner record".to_string())),
            None => Err(EngineError::UnknownTarget(target_id.to_string())),
        }
    }

    /// Load a vote record together with its stored bytes, so callers
    /// can write back with compare-and-set against what they read.
    async fn load_vote(
        &self,
        target_id: &str,
        actor_id: &str,
    ) -> Result<Option<(Vote, Vec<u8>)>, EngineError> {
        match self.store.get(&keys::vote(target_id, actor_id)).await? {
            Some(raw) => {
                let vote = serde_json::from_slice(&raw).map_err(|e| {
                    EngineError::from(StoreError::Corrupt {
                        key: keys::vote(target_id, actor_id),
                        detail: e.to_string(),
                    })
                })?;
                Ok(Some((vote, raw)))
            }
            None => Ok(None),
        }
    }

    fn spawn_recompute(&self, target_id: &str) {
        let scores = self.scores.clone();
        let target_id = target_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = scores.recompute(&target_id).await {
                error!(target_id = %target_id, error = %e, "Deferred score recompute failed");
            }
        });
    }

    fn vote_ttl(&self) -> Duration {
        Duration::from_secs(self.config.limits.vote_ttl_days * 24 * 3600)
    }
}

fn member_hash(id: &str) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn encode(vote: &Vote) -> Result<Vec<u8>, EngineError> {
    serde_json::to_vec(vote).map_err(|e| EngineError::Internal(e.to_string()))
}
