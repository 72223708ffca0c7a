//! Vote Record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One accepted vote. At most one exists per (actor, target) pair,
/// enforced by the store's uniqueness constraint on the vote key.
/// Deleted outright on undo; expires with the retention TTL otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Vote {
    pub id: Uuid,
    pub target_id: String,
    pub actor_id: String,
    /// Owner of the target at cast time; the reward recipient.
    pub owner_id: String,
    pub device_id: String,
    pub origin_hash: String,
    pub session_id: Option<String>,
    pub reward_granted: bool,
    /// Ledger transaction id of the reward, once granted.
    pub reward_batch_id: Option<String>,
    /// Fraud score persisted at cast time, 0–1.
    pub fraud_score: f64,
    /// Flagged for moderation review; never blocks the vote itself.
    pub flagged: bool,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    /// Deterministic idempotency key for this vote's reward credit, so
    /// retries after a crash cannot double-credit.
    pub fn reward_key(&self) -> String {
        format!("vote:{}", self.id)
    }

    /// Deterministic idempotency key for the compensating debit on undo.
    pub fn reversal_key(&self) -> String {
        format!("undo:{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_keys_are_deterministic_and_distinct() {
        let vote = Vote {
            id: Uuid::new_v4(),
            target_id: "t1".into(),
            actor_id: "a1".into(),
            owner_id: "o1".into(),
            device_id: "d1".into(),
            origin_hash: "h1".into(),
            session_id: None,
            reward_granted: false,
            reward_batch_id: None,
            fraud_score: 0.0,
            flagged: false,
            created_at: Utc::now(),
        };
        assert_eq!(vote.reward_key(), format!("vote:{}", vote.id));
        assert_eq!(vote.reward_key(), vote.reward_key());
        assert_ne!(vote.reward_key(), vote.reversal_key());
    }
}
