//! Fraud Scorer
//!
//! Stateless heuristic over request provenance. A pure function of its
//! inputs — no I/O, no clock — so identical signals always produce the
//! identical score and the scorer stays independently testable.
//!
//! The score lands in [0, 1]. The suspicion threshold is supplied by the
//! caller's policy, never baked in here: a flagged vote routes to
//! moderation, it is not blocked.

use serde::{Deserialize, Serialize};

/// Provenance signals gathered by the vote ledger before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudSignals {
    /// Account reputation, 0–100.
    pub trust_score: u8,
    /// Age of the acting account in days.
    pub account_age_days: u32,
    /// Votes seen from this device on this target inside the device
    /// window.
    pub device_votes_on_target: u32,
    /// Distinct recent accounts sharing this origin hash that voted on
    /// the same target.
    pub origin_accounts_on_target: u32,
}

/// Tunable bounds and the suspicion threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudPolicy {
    /// Score at or above which the vote is flagged.
    pub threshold: f64,
    /// Same-target votes per device before the device signal saturates.
    pub device_vote_bound: u32,
    /// Same-origin accounts on one target before the origin signal
    /// saturates.
    pub origin_collision_bound: u32,
    /// Accounts younger than this contribute the age signal.
    pub young_account_days: u32,
}

impl Default for FraudPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            device_vote_bound: 3,
            origin_collision_bound: 5,
            young_account_days: 7,
        }
    }
}

/// Scorer output: the raw score plus the thresholded flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub score: f64,
    pub suspicious: bool,
}

// Relative weight of each signal; sums to 1 so the score stays in [0, 1].
const WEIGHT_TRUST: f64 = 0.35;
const WEIGHT_DEVICE: f64 = 0.30;
const WEIGHT_ORIGIN: f64 = 0.25;
const WEIGHT_AGE: f64 = 0.10;

/// Score the signals against the policy bounds.
pub fn score(signals: &FraudSignals, policy: &FraudPolicy) -> Verdict {
    let trust = 1.0 - f64::from(signals.trust_score.min(100)) / 100.0;

    let device = if policy.device_vote_bound == 0 {
        0.0
    } else {
        (f64::from(signals.device_votes_on_target) / f64::from(policy.device_vote_bound)).min(1.0)
    };

    let origin = if policy.origin_collision_bound == 0 {
        0.0
    } else {
        (f64::from(signals.origin_accounts_on_target) / f64::from(policy.origin_collision_bound))
            .min(1.0)
    };

    let age = if policy.young_account_days == 0 {
        0.0
    } else {
        (1.0 - f64::from(signals.account_age_days.min(policy.young_account_days))
            / f64::from(policy.young_account_days))
        .max(0.0)
    };

    let score = (WEIGHT_TRUST * trust
        + WEIGHT_DEVICE * device
        + WEIGHT_ORIGIN * origin
        + WEIGHT_AGE * age)
        .clamp(0.0, 1.0);

    Verdict {
        score,
        suspicious: score >= policy.threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_signals() -> FraudSignals {
        FraudSignals {
            trust_score: 100,
            account_age_days: 365,
            device_votes_on_target: 0,
            origin_accounts_on_target: 0,
        }
    }

    #[test]
    fn test_clean_account_scores_zero() {
        let verdict = score(&clean_signals(), &FraudPolicy::default());
        assert_eq!(verdict.score, 0.0);
        assert!(!verdict.suspicious);
    }

    #[test]
    fn test_worst_case_saturates_at_one() {
        let signals = FraudSignals {
            trust_score: 0,
            account_age_days: 0,
            device_votes_on_target: 100,
            origin_accounts_on_target: 100,
        };
        let verdict = score(&signals, &FraudPolicy::default());
        assert_eq!(verdict.score, 1.0);
        assert!(verdict.suspicious);
    }

    #[test]
    fn test_deterministic_for_identical_inputs() {
        let signals = FraudSignals {
            trust_score: 50,
            account_age_days: 2,
            device_votes_on_target: 1,
            origin_accounts_on_target: 3,
        };
        let policy = FraudPolicy::default();
        assert_eq!(score(&signals, &policy), score(&signals, &policy));
    }

    #[test]
    fn test_threshold_comes_from_policy() {
        let signals = FraudSignals {
            trust_score: 50,
            account_age_days: 0,
            device_votes_on_target: 0,
            origin_accounts_on_target: 0,
        };
        // trust contributes 0.175, age 0.10 -> 0.275
        let lenient = FraudPolicy {
            threshold: 0.5,
            ..FraudPolicy::default()
        };
        let strict = FraudPolicy {
            threshold: 0.2,
            ..FraudPolicy::default()
        };
        assert!(!score(&signals, &lenient).suspicious);
        assert!(score(&signals, &strict).suspicious);
    }

    #[test]
    fn test_trust_lowers_score() {
        let mut low_trust = clean_signals();
        low_trust.trust_score = 10;
        let policy = FraudPolicy::default();
        assert!(score(&low_trust, &policy).score > score(&clean_signals(), &policy).score);
    }
}
