//! Admin surface: policies, issuers, revocation lists
//!
//! Guarded by the `X-Admin-Token` header matching the server-side
//! constant. Writes go through to the stores and invalidate the affected
//! cache keys so the data path converges within its TTLs.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::crypto::decode_public_key;
use crate::domain::{Did, Issuer, Policy, RevocationList};
use crate::infra::cache::keys;
use crate::server::AppState;

/// Header carrying the admin token
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = state
        .config
        .admin_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(ApiError::forbidden)?;

    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if presented != expected {
        return Err(ApiError::forbidden());
    }
    Ok(())
}

// ============================================================================
// Policies
// ============================================================================

/// `GET /v1/policies`
pub async fn list_policies(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Policy>>, ApiError> {
    require_admin(&state, &headers)?;
    Ok(Json(state.policies.list().await?))
}

/// `PUT /v1/policies/{id}`
pub async fn put_policy(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(mut policy): Json<Policy>,
) -> Result<Json<Policy>, ApiError> {
    require_admin(&state, &headers)?;

    policy.id = id;
    if !policy.route_prefix.starts_with('/') {
        return Err(ApiError::invalid_request(
            "route_prefix must start with '/'",
        ));
    }
    if policy.token_ttl_seconds == 0 {
        return Err(ApiError::invalid_request("token_ttl_seconds must be > 0"));
    }
    if let Some(rule) = &policy.rate_limit {
        if rule.window_seconds == 0 || rule.max_requests == 0 {
            return Err(ApiError::invalid_request(
                "rate_limit window and max_requests must be > 0",
            ));
        }
    }

    state.policies.upsert(&policy).await?;
    state.policy_engine.invalidate().await?;

    tracing::info!(policy = %policy.id, prefix = %policy.route_prefix, "policy updated");
    Ok(Json(policy))
}

// ============================================================================
// Issuers
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssuerUpsert {
    pub public_key: String,
    pub enabled: bool,
    pub trust_tier: i32,
}

/// `GET /v1/issuers`
pub async fn list_issuers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Issuer>>, ApiError> {
    require_admin(&state, &headers)?;
    Ok(Json(state.issuers.list().await?))
}

/// `PUT /v1/issuers/{did}`
pub async fn put_issuer(
    State(state): State<AppState>,
    Path(did): Path<String>,
    headers: HeaderMap,
    Json(body): Json<IssuerUpsert>,
) -> Result<Json<Issuer>, ApiError> {
    require_admin(&state, &headers)?;

    let did = Did::parse(&did)?;
    if !(1..=5).contains(&body.trust_tier) {
        return Err(ApiError::invalid_request("trust_tier must be 1..=5"));
    }
    decode_public_key(&body.public_key)?;

    let now = Utc::now();
    let created_at = state
        .issuers
        .get(did.as_str())
        .await?
        .map(|existing| existing.created_at)
        .unwrap_or(now);

    let issuer = Issuer {
        did: did.as_str().to_string(),
        public_key: body.public_key,
        enabled: body.enabled,
        trust_tier: body.trust_tier,
        created_at,
        updated_at: now,
    };
    state.issuers.upsert(&issuer).await?;

    tracing::info!(issuer = %issuer.did, enabled = issuer.enabled, "issuer updated");
    Ok(Json(issuer))
}

// ============================================================================
// Revocation lists
// ============================================================================

/// `PUT /v1/revocations/{listId}`
pub async fn put_revocation(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    headers: HeaderMap,
    Json(mut list): Json<RevocationList>,
) -> Result<Json<RevocationList>, ApiError> {
    require_admin(&state, &headers)?;

    list.list_id = list_id;
    state.revocations.upsert(&list).await?;

    // Drop the cached copy so the ≤60s staleness bound starts now
    state
        .shared_cache
        .delete(&format!("{}{}", keys::REVOCATION, list.list_id))
        .await?;

    tracing::info!(list = %list.list_id, revoked = list.revoked.len(), "revocation list updated");
    Ok(Json(list))
}
