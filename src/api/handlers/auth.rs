//! Challenge and verify handlers

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::domain::{AuthVerifyRequest, AuthVerifyResponse, ChallengeResponse};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ChallengeParams {
    pub did: String,
}

/// `GET /v1/auth/challenge?did=…`
pub async fn challenge(
    State(state): State<AppState>,
    Query(params): Query<ChallengeParams>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let response = state.pipeline.issue_challenge(&params.did).await?;
    Ok(Json(response))
}

/// `POST /v1/auth/verify`
///
/// The body is strict JSON (unknown fields rejected) and capped at 1 MiB
/// by the route's body limit layer.
pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<AuthVerifyRequest>,
) -> Result<Json<AuthVerifyResponse>, ApiError> {
    let response = state.pipeline.verify(&request).await?;
    Ok(Json(response))
}
