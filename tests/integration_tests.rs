//! Integration tests for the Lazuli engagement engine
//!
//! These tests verify end-to-end behavior across components: vote
//! intake under rate limits, exactly-once reward crediting, ledger
//! audit invariants, fraud flagging, and degraded-store handling.

use std::sync::Arc;

use chrono::{Duration, Utc};
use lazuli_engine::{
    scoring, AccountDirectory, AccountStatus, CastOutcome, CastRequest, EngineConfig, GemLedger,
    MemoryStore, Posting, ScoreEngine, Store, TxKind, UndoOutcome, VoteLedger,
};

// ============================================================================
// Test Helpers
// ============================================================================

struct TestEngine {
    votes: Arc<VoteLedger>,
    ledger: Arc<GemLedger>,
    scores: Arc<ScoreEngine>,
    accounts: Arc<AccountDirectory>,
    store: Arc<MemoryStore>,
}

/// Wire up a full engine over one in-process store.
fn create_test_engine(config: EngineConfig) -> TestEngine {
    let store = Arc::new(MemoryStore::new());
    let store_dyn: Arc<dyn Store> = store.clone();
    let ledger = Arc::new(GemLedger::new(store_dyn.clone()));
    let scores = Arc::new(ScoreEngine::new(store_dyn.clone()));
    let accounts = Arc::new(AccountDirectory::new(
        store_dyn.clone(),
        config.cache.account_ttl_ms,
    ));
    let votes = Arc::new(VoteLedger::new(
        store_dyn,
        ledger.clone(),
        scores.clone(),
        accounts.clone(),
        config,
    ));
    TestEngine {
        votes,
        ledger,
        scores,
        accounts,
        store,
    }
}

fn default_engine() -> TestEngine {
    create_test_engine(EngineConfig::default())
}

fn cast_request(actor: &str, target: &str) -> CastRequest {
    CastRequest {
        actor_id: actor.to_string(),
        target_id: target.to_string(),
        device_id: format!("device-{}", actor),
        origin_hash: format!("origin-{}", actor),
        session_id: None,
    }
}

async fn seed_target(engine: &TestEngine, target: &str, owner: &str) {
    engine
        .votes
        .register_target(target, owner, Utc::now())
        .await
        .unwrap();
}

// ============================================================================
// Vote Intake & Rate Limits
// ============================================================================

#[tokio::test]
async fn test_full_cast_flow_updates_count_quota_and_balance() {
    let engine = default_engine();
    seed_target(&engine, "post-1", "carol").await;

    let outcome = engine
        .votes
        .cast_vote(cast_request("alice", "post-1"))
        .await
        .unwrap();
    match outcome {
        CastOutcome::Accepted {
            new_vote_count,
            daily_votes_remaining,
            reward_granted,
            flagged,
            ..
        } => {
            assert_eq!(new_vote_count, 1);
            assert_eq!(daily_votes_remaining, 99);
            assert!(reward_granted);
            assert!(!flagged);
        }
        other => panic!("expected acceptance, got {:?}", other),
    }
    assert_eq!(engine.ledger.balance("carol").await.unwrap(), 5);
}

#[tokio::test]
async fn test_sliding_window_allows_max_then_denies() {
    let mut config = EngineConfig::default();
    config.limits.votes_per_window = 10;
    let engine = create_test_engine(config);
    for i in 0..11 {
        seed_target(&engine, &format!("post-{}", i), "carol").await;
    }

    for i in 0..10 {
        let outcome = engine
            .votes
            .cast_vote(cast_request("alice", &format!("post-{}", i)))
            .await
            .unwrap();
        assert!(
            matches!(outcome, CastOutcome::Accepted { .. }),
            "cast {} should be allowed",
            i
        );
    }
    let outcome = engine
        .votes
        .cast_vote(cast_request("alice", "post-10"))
        .await
        .unwrap();
    assert!(matches!(outcome, CastOutcome::RateLimited { .. }));
}

#[tokio::test]
async fn test_sliding_window_reopens_after_rollover() {
    let mut config = EngineConfig::default();
    config.limits.votes_per_window = 1;
    config.limits.vote_window_ms = 60;
    let engine = create_test_engine(config);
    seed_target(&engine, "post-0", "carol").await;
    seed_target(&engine, "post-1", "carol").await;

    engine
        .votes
        .cast_vote(cast_request("alice", "post-0"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(90)).await;
    let outcome = engine
        .votes
        .cast_vote(cast_request("alice", "post-1"))
        .await
        .unwrap();
    assert!(matches!(outcome, CastOutcome::Accepted { .. }));
}

#[tokio::test]
async fn test_daily_quota_is_independent_of_window() {
    let mut config = EngineConfig::default();
    config.limits.votes_per_window = 100;
    config.limits.daily_votes = 3;
    let engine = create_test_engine(config);
    for i in 0..4 {
        seed_target(&engine, &format!("post-{}", i), "carol").await;
    }

    for i in 0..3 {
        let outcome = engine
            .votes
            .cast_vote(cast_request("alice", &format!("post-{}", i)))
            .await
            .unwrap();
        assert!(matches!(outcome, CastOutcome::Accepted { .. }));
    }
    let outcome = engine
        .votes
        .cast_vote(cast_request("alice", "post-3"))
        .await
        .unwrap();
    match outcome {
        CastOutcome::DailyLimitExceeded { reset_at, .. } => assert!(reset_at > Utc::now()),
        other => panic!("expected DailyLimitExceeded, got {:?}", other),
    }
}

// ============================================================================
// Idempotency & Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_double_cast_yields_one_vote_and_one_credit() {
    let engine = default_engine();
    seed_target(&engine, "post-1", "carol").await;

    let a = {
        let votes = engine.votes.clone();
        tokio::spawn(async move { votes.cast_vote(cast_request("alice", "post-1")).await })
    };
    let b = {
        let votes = engine.votes.clone();
        tokio::spawn(async move { votes.cast_vote(cast_request("alice", "post-1")).await })
    };
    let first = a.await.unwrap().unwrap();
    let second = b.await.unwrap().unwrap();

    let accepted = |o: &CastOutcome| matches!(o, CastOutcome::Accepted { .. });
    let duplicate = |o: &CastOutcome| matches!(o, CastOutcome::AlreadyVoted { .. });
    assert!(
        (accepted(&first) && duplicate(&second)) || (duplicate(&first) && accepted(&second)),
        "exactly one of two racing casts must win: {:?} / {:?}",
        first,
        second
    );

    assert_eq!(engine.votes.vote_count("post-1").await.unwrap(), 1);
    assert_eq!(engine.ledger.balance("carol").await.unwrap(), 5);
    assert_eq!(engine.ledger.replay("carol").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_ledger_credit_is_exactly_once_per_key() {
    let engine = default_engine();

    let posting = || Posting {
        account_id: "carol".to_string(),
        base_amount: 5,
        multiplier: 1.0,
        source: "votes".to_string(),
        reference_id: None,
        reference_kind: None,
        description: "test credit".to_string(),
        idempotency_key: "vote:fixed-key".to_string(),
    };

    let first = engine.ledger.credit(posting()).await.unwrap();
    let second = engine.ledger.credit(posting()).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.transaction.id, second.transaction.id);
    assert_eq!(engine.ledger.balance("carol").await.unwrap(), 5);
}

#[tokio::test]
async fn test_concurrent_postings_linearize_without_lost_updates() {
    let engine = default_engine();

    let mut handles = Vec::new();
    for i in 0..25 {
        let ledger = engine.ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .credit(Posting {
                    account_id: "carol".to_string(),
                    base_amount: 2,
                    multiplier: 1.0,
                    source: "votes".to_string(),
                    reference_id: None,
                    reference_kind: None,
                    description: format!("credit {}", i),
                    idempotency_key: format!("vote:k{}", i),
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(engine.ledger.balance("carol").await.unwrap(), 50);

    // Replaying history in commit order reproduces every intermediate
    // balance and the final one.
    let history = engine.ledger.replay("carol").await.unwrap();
    assert_eq!(history.len(), 25);
    let mut running = 0;
    for tx in &history {
        assert_eq!(tx.balance_before, running);
        running += tx.amount;
        assert_eq!(tx.balance_after, running);
    }
    assert_eq!(running, 50);
}

// ============================================================================
// Undo & Compensation
// ============================================================================

#[tokio::test]
async fn test_undo_leaves_audit_trail_instead_of_deleting() {
    let engine = default_engine();
    seed_target(&engine, "post-1", "carol").await;

    engine
        .votes
        .cast_vote(cast_request("alice", "post-1"))
        .await
        .unwrap();
    let outcome = engine.votes.undo_vote("alice", "post-1").await.unwrap();
    assert!(matches!(outcome, UndoOutcome::Reversed { new_vote_count: 0 }));

    assert_eq!(engine.ledger.balance("carol").await.unwrap(), 0);
    let history = engine.ledger.replay("carol").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, TxKind::Earn);
    assert_eq!(history[1].kind, TxKind::Refund);
    assert_eq!(history[0].amount + history[1].amount, 0);
}

#[tokio::test]
async fn test_double_undo_compensates_once() {
    let engine = default_engine();
    seed_target(&engine, "post-1", "carol").await;

    engine
        .votes
        .cast_vote(cast_request("alice", "post-1"))
        .await
        .unwrap();
    engine.votes.undo_vote("alice", "post-1").await.unwrap();
    let outcome = engine.votes.undo_vote("alice", "post-1").await.unwrap();
    assert!(matches!(outcome, UndoOutcome::NoSuchVote { .. }));

    assert_eq!(engine.ledger.balance("carol").await.unwrap(), 0);
    assert_eq!(engine.ledger.replay("carol").await.unwrap().len(), 2);
    assert_eq!(engine.votes.vote_count("post-1").await.unwrap(), 0);
}

// ============================================================================
// Fraud Scoring
// ============================================================================

#[tokio::test]
async fn test_trust_fifty_young_account_is_not_flagged_at_default_threshold() {
    let engine = default_engine();
    seed_target(&engine, "post-1", "carol").await;
    // trust 50, brand-new account: trust signal 0.175 + age 0.10 = 0.275
    engine
        .accounts
        .upsert(
            "alice",
            AccountStatus {
                trust_score: 50,
                created_at: Utc::now(),
                suspended: false,
            },
        )
        .await
        .unwrap();

    let outcome = engine
        .votes
        .cast_vote(cast_request("alice", "post-1"))
        .await
        .unwrap();
    match outcome {
        CastOutcome::Accepted { flagged, .. } => assert!(!flagged),
        other => panic!("expected acceptance, got {:?}", other),
    }
}

#[tokio::test]
async fn test_shared_device_piles_up_suspicion() {
    let mut config = EngineConfig::default();
    // Low threshold so the device signal alone crosses it.
    config.fraud.threshold = 0.25;
    let engine = create_test_engine(config);
    seed_target(&engine, "post-1", "carol").await;

    // Several accounts voting on one target from the same device.
    let mut last_flagged = false;
    for actor in ["a1", "a2", "a3", "a4"] {
        let mut request = cast_request(actor, "post-1");
        request.device_id = "shared-device".to_string();
        let outcome = engine.votes.cast_vote(request).await.unwrap();
        match outcome {
            CastOutcome::Accepted { flagged, .. } => last_flagged = flagged,
            other => panic!("expected acceptance, got {:?}", other),
        }
    }
    assert!(last_flagged, "fourth vote from one device should be flagged");
    // Flagging never blocks: all four counted.
    assert_eq!(engine.votes.vote_count("post-1").await.unwrap(), 4);
}

// ============================================================================
// Ranking Scores
// ============================================================================

#[tokio::test]
async fn test_scores_recompute_deterministically() {
    let engine = default_engine();
    engine
        .votes
        .register_target("post-1", "carol", Utc::now() - Duration::hours(10))
        .await
        .unwrap();

    for actor in ["a1", "a2", "a3", "a4", "a5", "a6"] {
        engine
            .votes
            .cast_vote(cast_request(actor, "post-1"))
            .await
            .unwrap();
    }

    let (trending_a, hot_a) = engine.scores.recompute("post-1").await.unwrap();
    let (trending_b, hot_b) = engine.scores.recompute("post-1").await.unwrap();
    // Hot has no time input; trending only drifts with the clock.
    assert_eq!(hot_a, hot_b);
    assert!((trending_a - trending_b).abs() < 1e-6);

    // (6 - 1) / (10 + 2)^1.8, age pinned by the registration timestamp.
    let expected = 5.0 / 12.0_f64.powf(1.8);
    assert!((trending_a - expected).abs() < 1e-3);
}

#[tokio::test]
async fn test_views_dampen_hot_score() {
    let engine = default_engine();
    seed_target(&engine, "post-1", "carol").await;
    seed_target(&engine, "post-2", "carol").await;

    for (actor, target) in [("a1", "post-1"), ("a1", "post-2")] {
        engine
            .votes
            .cast_vote(cast_request(actor, target))
            .await
            .unwrap();
    }
    for _ in 0..1000 {
        engine.votes.record_view("post-2").await.unwrap();
    }

    let (_, hot_few_views) = engine.scores.recompute("post-1").await.unwrap();
    let (_, hot_many_views) = engine.scores.recompute("post-2").await.unwrap();
    assert!(
        hot_many_views < hot_few_views,
        "same votes over more views must rank lower: {} vs {}",
        hot_many_views,
        hot_few_views
    );
}

#[tokio::test]
async fn test_pure_score_functions_match_engine_output() {
    let engine = default_engine();
    engine
        .votes
        .register_target("post-1", "carol", Utc::now())
        .await
        .unwrap();
    engine
        .votes
        .cast_vote(cast_request("a1", "post-1"))
        .await
        .unwrap();
    engine.votes.record_view("post-1").await.unwrap();

    let (_, hot) = engine.scores.recompute("post-1").await.unwrap();
    assert_eq!(hot, scoring::hot_score(1, 1));
}

// ============================================================================
// Degraded Store
// ============================================================================

#[tokio::test]
async fn test_cast_never_succeeds_during_store_outage() {
    let engine = default_engine();
    seed_target(&engine, "post-1", "carol").await;
    engine.store.set_unavailable(true);

    let result = engine.votes.cast_vote(cast_request("alice", "post-1")).await;
    assert!(result.is_err(), "cast must fail closed when the store is down");

    engine.store.set_unavailable(false);
    let outcome = engine
        .votes
        .cast_vote(cast_request("alice", "post-1"))
        .await
        .unwrap();
    assert!(matches!(outcome, CastOutcome::Accepted { .. }));
}

#[tokio::test]
async fn test_quota_read_fails_open_while_cast_fails_closed() {
    let mut config = EngineConfig::default();
    config.limits.fail_open_reads = true;
    let engine = create_test_engine(config);
    seed_target(&engine, "post-1", "carol").await;
    engine.store.set_unavailable(true);

    let status = engine.votes.daily_status("alice").await.unwrap();
    assert!(status.degraded);
    assert_eq!(status.remaining, 100);

    assert!(engine
        .votes
        .cast_vote(cast_request("alice", "post-1"))
        .await
        .is_err());
}

#[tokio::test]
async fn test_quota_read_fails_closed_when_configured() {
    let mut config = EngineConfig::default();
    config.limits.fail_open_reads = false;
    let engine = create_test_engine(config);
    engine.store.set_unavailable(true);

    assert!(engine.votes.daily_status("alice").await.is_err());
}
