//! Route table for the gateway

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get, post, put};
use axum::Router;

use crate::api::handlers::{admin, auth, health, proxy};
use crate::server::AppState;

/// Request body cap for the verify endpoint
const MAX_VERIFY_BODY_BYTES: usize = 1 << 20;

/// Build the full router: health, auth, admin, and the gated proxy.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/v1/auth/challenge", get(auth::challenge))
        .route(
            "/v1/auth/verify",
            post(auth::verify).layer(DefaultBodyLimit::max(MAX_VERIFY_BODY_BYTES)),
        )
        .route("/v1/policies", get(admin::list_policies))
        .route("/v1/policies/:id", put(admin::put_policy))
        .route("/v1/issuers", get(admin::list_issuers))
        .route("/v1/issuers/:did", put(admin::put_issuer))
        .route("/v1/revocations/:list_id", put(admin::put_revocation))
        .route("/api", any(proxy::proxy))
        .route("/api/*path", any(proxy::proxy))
}
