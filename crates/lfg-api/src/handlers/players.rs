use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use lfg_common::Candidate;
use lfg_common::criteria::Criteria;
use lfg_common::matching::FilterDecision;
use lfg_metrics::{SEARCH_REQUESTS_TOTAL, SEARCH_RESULTS, SEARCH_STORE_ERRORS_TOTAL};
use serde::Serialize;
use tracing::instrument;

use super::pagination::pagination_from_pairs;
use crate::SharedState;
use crate::error::ApiError;

/// Raw query pairs in request order, so repeated keys reach the parser.
pub type QueryPairs = Vec<(String, String)>;

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// Matches before pagination.
    pub total: usize,
    pub limit: i64,
    pub offset: i64,
    pub searched_at: DateTime<Utc>,
    pub players: Vec<Candidate>,
}

#[derive(Debug, Serialize)]
pub struct DecisionDto {
    pub check: &'static str,
    #[serde(flatten)]
    pub decision: FilterDecision,
}

#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub candidate_id: i64,
    pub matched: bool,
    pub decisions: Vec<DecisionDto>,
}

#[instrument(skip(state, pairs), fields(params = pairs.len()))]
pub async fn search_players(
    State(state): State<SharedState>,
    Query(pairs): Query<QueryPairs>,
) -> Result<Json<SearchResponse>, ApiError> {
    let (limit, offset) = pagination_from_pairs(&pairs).inspect_err(|_| {
        metrics::counter!(SEARCH_REQUESTS_TOTAL, "outcome" => "bad_request").increment(1);
    })?;
    let criteria = Criteria::from_pairs(pairs);

    let matched = state
        .engine
        .discover(&criteria, state.profiles.as_ref(), state.stats.as_ref())
        .await
        .inspect_err(|_| {
            metrics::counter!(SEARCH_REQUESTS_TOTAL, "outcome" => "store_error").increment(1);
            metrics::counter!(SEARCH_STORE_ERRORS_TOTAL).increment(1);
        })?;

    metrics::counter!(SEARCH_REQUESTS_TOTAL, "outcome" => "ok").increment(1);
    metrics::histogram!(SEARCH_RESULTS).record(matched.len() as f64);

    let total = matched.len();
    let players = matched
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect();

    Ok(Json(SearchResponse {
        total,
        limit,
        offset,
        searched_at: Utc::now(),
        players,
    }))
}

#[instrument(skip(state, pairs))]
pub async fn explain_player(
    State(state): State<SharedState>,
    Path(candidate_id): Path<i64>,
    Query(pairs): Query<QueryPairs>,
) -> Result<Json<ExplainResponse>, ApiError> {
    let criteria = Criteria::from_pairs(pairs);

    let outcome = state
        .engine
        .explain(&criteria, candidate_id, state.profiles.as_ref(), state.stats.as_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("player {candidate_id} not found")))?;

    Ok(Json(ExplainResponse {
        candidate_id,
        matched: outcome.is_match,
        decisions: outcome
            .decisions
            .into_iter()
            .map(|(check, decision)| DecisionDto { check, decision })
            .collect(),
    }))
}
