//! Authenticated reverse proxy
//!
//! Gates `/api/*` behind token verification, route policy, and the rate
//! limiter, then forwards to the upstream with `Authorization` stripped
//! and `X-DID-Subject` injected. The upstream response streams back
//! verbatim.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;

use crate::api::error::{ApiError, ErrorCode};
use crate::infra::GatewayError;
use crate::server::AppState;

/// Header carrying the authenticated subject to the upstream
pub const DID_SUBJECT_HEADER: &str = "x-did-subject";

/// Hop-by-hop headers never forwarded in either direction
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Authorize and forward an `/api/*` request.
pub async fn proxy(State(state): State<AppState>, req: Request) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::new(ErrorCode::InvalidAuth, "missing bearer token"))?
        .to_string();

    let path = req.uri().path().to_string();
    let auth = state.pipeline.authorize(&path, &token).await?;

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or(path);
    let url = format!(
        "{}{}",
        state.config.upstream_url.trim_end_matches('/'),
        path_and_query
    );

    let (parts, body) = req.into_parts();

    let mut headers = parts.headers;
    headers.remove(header::AUTHORIZATION);
    headers.remove(header::HOST);
    strip_hop_by_hop(&mut headers);
    headers.insert(
        HeaderName::from_static(DID_SUBJECT_HEADER),
        HeaderValue::from_str(&auth.claims.sub)
            .map_err(|_| ApiError::new(ErrorCode::InternalError, "invalid subject header"))?,
    );

    tracing::debug!(
        subject = %auth.claims.sub,
        policy = %auth.policy.id,
        %url,
        "forwarding to upstream"
    );

    let upstream = state
        .proxy_client
        .request(parts.method, &url)
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await
        .map_err(|e| GatewayError::Upstream(e.to_string()))?;

    let status = upstream.status();
    let mut builder = Response::builder().status(status);
    if let Some(response_headers) = builder.headers_mut() {
        for (name, value) in upstream.headers() {
            if !HOP_BY_HOP.contains(&name.as_str()) {
                response_headers.append(name.clone(), value.clone());
            }
        }
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ApiError::new(ErrorCode::InternalError, e.to_string()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Anything the Connection header names is hop-by-hop too
    let named: Vec<String> = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .collect()
        })
        .unwrap_or_default();

    for name in HOP_BY_HOP.iter().copied().chain(named.iter().map(String::as_str)) {
        if let Ok(name) = HeaderName::try_from(name) {
            headers.remove(name);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
