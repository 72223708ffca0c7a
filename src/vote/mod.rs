//! Vote Ledger
//!
//! Orchestrates a single vote action end to end:
//!
//! ```text
//! cast_vote ──► account standing ──► sliding window ──► daily quota
//!                     │                                     │
//!                     ▼                                     ▼
//!              unique vote insert ──► fraud score (flag) ──► counter++
//!                     │                                     │
//!                     ▼                                     ▼
//!              idempotent gem credit (vote:<voteId>) ──► score recompute
//! ```
//!
//! The (actor, target) uniqueness constraint in the store is the sole
//! duplicate-vote guard; everything downstream of it is idempotent, so a
//! retried or half-completed cast converges instead of double-counting.

mod engine;
mod record;

pub use engine::{CastOutcome, CastRequest, DailyStatus, UndoOutcome, VoteLedger};
pub use record::Vote;

/// Key layout shared by the vote ledger and the score engine.
pub mod keys {
    pub fn vote(target_id: &str, actor_id: &str) -> String {
        format!("v:{}:{}", target_id, actor_id)
    }

    pub fn vote_count(target_id: &str) -> String {
        format!("t:{}:votes", target_id)
    }

    pub fn view_count(target_id: &str) -> String {
        format!("t:{}:views", target_id)
    }

    pub fn created_ms(target_id: &str) -> String {
        format!("t:{}:created", target_id)
    }

    pub fn owner(target_id: &str) -> String {
        format!("t:{}:owner", target_id)
    }

    pub fn trending(target_id: &str) -> String {
        format!("t:{}:trending", target_id)
    }

    pub fn hot(target_id: &str) -> String {
        format!("t:{}:hot", target_id)
    }

    pub fn cast_limiter(actor_id: &str) -> String {
        format!("cast:{}", actor_id)
    }

    pub fn device_window(device_id: &str, target_id: &str) -> String {
        format!("dev:{}:{}", device_id, target_id)
    }

    pub fn origin_window(origin_hash: &str, target_id: &str) -> String {
        format!("org:{}:{}", origin_hash, target_id)
    }
}
