//! Vote and Ledger Endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{GemLedger, GemTransaction, Posting};
use crate::scoring::ScoreEngine;
use crate::vote::{CastOutcome, CastRequest, UndoOutcome, VoteLedger};

use super::ApiError;

/// API state for vote and ledger endpoints
#[derive(Clone)]
pub struct EngineApiState {
    pub votes: Arc<VoteLedger>,
    pub ledger: Arc<GemLedger>,
    pub scores: Arc<ScoreEngine>,
}

// Response types

#[derive(Debug, Serialize)]
pub struct QuotaResponse {
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterTargetRequest {
    pub target_id: String,
    pub owner_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub target_id: String,
    pub view_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ScoresResponse {
    pub target_id: String,
    pub trending: f64,
    pub hot: f64,
    pub vote_count: i64,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: String,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdjustRequest {
    /// Signed gem delta; negative values deduct.
    pub amount: i64,
    pub description: String,
    pub idempotency_key: String,
}

#[derive(Debug, Serialize)]
pub struct AdjustResponse {
    pub transaction_id: String,
    pub new_balance: i64,
    pub replayed: bool,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub account_id: String,
    pub transactions: Vec<GemTransaction>,
}

// Endpoints

/// POST /votes - Cast a vote
pub async fn cast_vote(
    State(state): State<EngineApiState>,
    Json(payload): Json<CastRequest>,
) -> Result<Response, ApiError> {
    let outcome = state.votes.cast_vote(payload).await?;
    let response = match &outcome {
        CastOutcome::Accepted { .. } => (StatusCode::CREATED, Json(outcome)).into_response(),
        CastOutcome::AlreadyVoted { .. } => (StatusCode::OK, Json(outcome)).into_response(),
        CastOutcome::RateLimited {
            remaining,
            reset_at,
            ..
        } => {
            let headers = rate_limit_headers(i64::from(*remaining), *reset_at);
            (StatusCode::TOO_MANY_REQUESTS, headers, Json(outcome)).into_response()
        }
        CastOutcome::DailyLimitExceeded { reset_at, .. } => {
            let headers = rate_limit_headers(0, *reset_at);
            (StatusCode::TOO_MANY_REQUESTS, headers, Json(outcome)).into_response()
        }
    };
    Ok(response)
}

/// DELETE /votes/{target_id}/{actor_id} - Withdraw a vote
pub async fn undo_vote(
    State(state): State<EngineApiState>,
    Path((target_id, actor_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let outcome = state.votes.undo_vote(&actor_id, &target_id).await?;
    let status = match &outcome {
        UndoOutcome::Reversed { .. } => StatusCode::OK,
        UndoOutcome::NoSuchVote { .. } => StatusCode::NOT_FOUND,
    };
    Ok((status, Json(outcome)).into_response())
}

/// GET /votes/quota/{actor_id} - Remaining daily vote quota
pub async fn get_quota(
    State(state): State<EngineApiState>,
    Path(actor_id): Path<String>,
) -> Result<Json<QuotaResponse>, ApiError> {
    let status = state.votes.daily_status(&actor_id).await?;
    Ok(Json(QuotaResponse {
        remaining: status.remaining,
        reset_at: status.reset_at,
        degraded: status.degraded,
    }))
}

/// POST /targets - Register a vote target
pub async fn register_target(
    State(state): State<EngineApiState>,
    Json(payload): Json<RegisterTargetRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .votes
        .register_target(
            &payload.target_id,
            &payload.owner_id,
            payload.created_at.unwrap_or_else(Utc::now),
        )
        .await?;
    Ok(StatusCode::CREATED)
}

/// POST /targets/{target_id}/views - Record a view
pub async fn record_view(
    State(state): State<EngineApiState>,
    Path(target_id): Path<String>,
) -> Result<Json<ViewResponse>, ApiError> {
    let view_count = state.votes.record_view(&target_id).await?;
    Ok(Json(ViewResponse {
        target_id,
        view_count,
    }))
}

/// GET /targets/{target_id}/scores - Ranking scores
pub async fn get_scores(
    State(state): State<EngineApiState>,
    Path(target_id): Path<String>,
) -> Result<Json<ScoresResponse>, ApiError> {
    let (trending, hot) = state.scores.cached(&target_id).await?;
    let vote_count = state.votes.vote_count(&target_id).await?;
    Ok(Json(ScoresResponse {
        target_id,
        trending,
        hot,
        vote_count,
    }))
}

/// GET /gems/{account_id} - Current gem balance
pub async fn get_balance(
    State(state): State<EngineApiState>,
    Path(account_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger.balance(&account_id).await?;
    Ok(Json(BalanceResponse {
        account_id,
        balance,
    }))
}

/// GET /gems/{account_id}/history - Transaction history, newest first
pub async fn get_history(
    State(state): State<EngineApiState>,
    Path(account_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let transactions = state
        .ledger
        .history(&account_id, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(HistoryResponse {
        account_id,
        transactions,
    }))
}

/// POST /gems/{account_id}/adjust - Operator balance correction
pub async fn adjust_balance(
    State(state): State<EngineApiState>,
    Path(account_id): Path<String>,
    Json(payload): Json<AdjustRequest>,
) -> Result<Json<AdjustResponse>, ApiError> {
    let receipt = state
        .ledger
        .adjust(Posting {
            account_id,
            base_amount: payload.amount,
            multiplier: 1.0,
            source: "admin".to_string(),
            reference_id: None,
            reference_kind: None,
            description: payload.description,
            idempotency_key: payload.idempotency_key,
        })
        .await?;
    Ok(Json(AdjustResponse {
        transaction_id: receipt.transaction.id.to_string(),
        new_balance: receipt.new_balance,
        replayed: receipt.replayed,
    }))
}

fn rate_limit_headers(remaining: i64, reset_at: DateTime<Utc>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&remaining.max(0).to_string()) {
        headers.insert(HeaderName::from_static("x-ratelimit-remaining"), value);
    }
    if let Ok(value) = HeaderValue::from_str(&reset_at.timestamp().to_string()) {
        headers.insert(HeaderName::from_static("x-ratelimit-reset"), value);
    }
    headers
}

/// Create the engine API router
pub fn create_engine_router(state: EngineApiState) -> Router {
    Router::new()
        .route("/votes", post(cast_vote))
        .route("/votes/{target_id}/{actor_id}", axum::routing::delete(undo_vote))
        .route("/votes/quota/{actor_id}", get(get_quota))
        .route("/targets", post(register_target))
        .route("/targets/{target_id}/views", post(record_view))
        .route("/targets/{target_id}/scores", get(get_scores))
        .route("/gems/{account_id}", get(get_balance))
        .route("/gems/{account_id}/history", get(get_history))
        .route("/gems/{account_id}/adjust", post(adjust_balance))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_target_rejects_unknown_fields() {
        let result: Result<RegisterTargetRequest, _> = serde_json::from_str(
            r#"{"target_id": "t1", "owner_id": "owner", "extra": true}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_adjust_rejects_unknown_fields() {
        let result: Result<AdjustRequest, _> = serde_json::from_str(
            r#"{"amount": 5, "description": "fix", "idempotency_key": "k1", "account_id": "x"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_history_query_rejects_unknown_fields() {
        let result: Result<HistoryQuery, _> =
            serde_json::from_str(r#"{"limit": 10, "offset": 10}"#);
        assert!(result.is_err());
    }
}
