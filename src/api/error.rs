//! API error envelope
//!
//! Maps the internal error taxonomy to HTTP status codes and stable wire
//! codes. Every cryptographic or challenge failure collapses to the
//! uniform `invalid_auth` code so responses cannot be used as an oracle;
//! the precise kind is logged server-side only.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::infra::GatewayError;

/// Stable wire codes for API errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// DID failed format or method validation
    InvalidDidFormat,
    /// Request body or parameters are malformed
    InvalidRequest,
    /// Challenge, signature, credential, resolution, or token failure
    InvalidAuth,
    /// Requested scope exceeds the credential's entitlement
    ForbiddenScope,
    /// Token lacks a scope the route policy requires
    InsufficientScopes,
    /// Token lacks a VC type the route policy requires
    MissingVcType,
    /// Credential issuer is not allowed for the route
    IssuerNotAllowed,
    /// Issuer trust tier is below the route minimum
    TrustTierTooLow,
    /// Admin token missing or wrong
    Forbidden,
    /// Request budget exhausted
    RateLimited,
    /// The upstream behind the proxy failed
    UpstreamError,
    /// Anything unexpected
    InternalError,
}

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidDidFormat | ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidAuth => StatusCode::UNAUTHORIZED,
            ErrorCode::ForbiddenScope
            | ErrorCode::InsufficientScopes
            | ErrorCode::MissingVcType
            | ErrorCode::IssuerNotAllowed
            | ErrorCode::TrustTierTooLow
            | ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::UpstreamError => StatusCode::BAD_GATEWAY,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire envelope: `{"error": "<code>", "detail": "<msg>"}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorCode,
    pub detail: String,
}

/// An API-facing error ready to serialize
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    pub fn forbidden() -> Self {
        Self::new(ErrorCode::Forbidden, "admin token required")
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, detail)
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        if err.is_auth_failure() {
            // Uniform envelope; the specific kind stays in the logs
            tracing::info!(error = %err, "authentication failed");
            return ApiError::new(ErrorCode::InvalidAuth, "authentication failed");
        }

        match &err {
            GatewayError::InvalidDidFormat(_) | GatewayError::UnsupportedDidMethod(_) => {
                ApiError::new(ErrorCode::InvalidDidFormat, err.to_string())
            }
            GatewayError::InvalidRequest(_) => {
                ApiError::new(ErrorCode::InvalidRequest, err.to_string())
            }
            GatewayError::ForbiddenScope(_) => {
                ApiError::new(ErrorCode::ForbiddenScope, err.to_string())
            }
            GatewayError::InsufficientScopes => {
                ApiError::new(ErrorCode::InsufficientScopes, err.to_string())
            }
            GatewayError::MissingVcType => ApiError::new(ErrorCode::MissingVcType, err.to_string()),
            GatewayError::IssuerNotAllowed => {
                ApiError::new(ErrorCode::IssuerNotAllowed, err.to_string())
            }
            GatewayError::TrustTierTooLow => {
                ApiError::new(ErrorCode::TrustTierTooLow, err.to_string())
            }
            GatewayError::RateLimited => ApiError::new(ErrorCode::RateLimited, err.to_string()),
            GatewayError::Upstream(_) => {
                tracing::warn!(error = %err, "upstream failure");
                ApiError::new(ErrorCode::UpstreamError, "upstream request failed")
            }
            GatewayError::Timeout => {
                tracing::warn!(error = %err, "request deadline exceeded");
                ApiError::new(ErrorCode::UpstreamError, "upstream request timed out")
            }
            GatewayError::Store(_)
            | GatewayError::Kv(_)
            | GatewayError::Internal(_)
            | GatewayError::MalformedCredential(_)
            | GatewayError::ChallengeExpired
            | GatewayError::NonceUnknownOrReused
            | GatewayError::ChallengeSubjectMismatch
            | GatewayError::InvalidSignature
            | GatewayError::CredentialExpired
            | GatewayError::CredentialRevoked
            | GatewayError::UntrustedIssuer(_)
            | GatewayError::SubjectMismatch
            | GatewayError::DidResolutionFailed(_)
            | GatewayError::CircuitOpen(_)
            | GatewayError::InvalidToken
            | GatewayError::TokenExpired => {
                // Auth variants are unreachable (handled above); the rest
                // never leak internals to the client
                tracing::error!(error = %err, "internal error");
                ApiError::new(ErrorCode::InternalError, "internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();
        let body = Json(ErrorEnvelope {
            error: self.code,
            detail: self.detail,
        });
        (status, body).into_response()
    }
}

// ============================================================================
// Tests
// ============================================================================
