use axum::{extract::State, Json};
use chrono::Utc;

use noc_common::api::{MatchRequest, MatchResponse};
use noc_common::MatchEngine;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

pub async fn run_match(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Json(request): Json<MatchRequest>,
) -> Result<Json<Vec<MatchResponse>>, ApiError> {
    let top_k = request.top_k.unwrap_or(state.scoring.default_top_k);

    let index = state.current_index();
    let engine = MatchEngine::new(index.clone(), state.embedder.clone(), state.scoring.clone());

    // The embedding call blocks; keep it off the async workers.
    let outcome =
        tokio::task::spawn_blocking(move || engine.match_description(&request.description, top_k))
            .await
            .map_err(|err| ApiError::Internal(format!("match task failed: {err}")))??;

    let matched_at = Utc::now();
    let responses = outcome
        .results
        .iter()
        .enumerate()
        .map(|(position, ranked)| {
            MatchResponse::from_ranked(position + 1, ranked, &index, &outcome.keywords, matched_at)
        })
        .collect();

    Ok(Json(responses))
}
