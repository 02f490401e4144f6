//! Error types for the DID gateway
//!
//! One stable taxonomy for the whole authentication pipeline. Components
//! return these variants; the API layer maps them to HTTP status codes and
//! envelope codes (crypto failures collapse to a uniform `invalid_auth`
//! code on the wire, the precise kind is only logged).

use thiserror::Error;

/// Errors that can occur anywhere in the gateway pipeline
#[derive(Error, Debug)]
pub enum GatewayError {
    // -- input parsing -------------------------------------------------------
    /// DID does not match `did:<method>:<id>` or fails method checks
    #[error("invalid DID format: {0}")]
    InvalidDidFormat(String),

    /// DID method is not one of key/web/ion
    #[error("unsupported DID method: {0}")]
    UnsupportedDidMethod(String),

    /// Request body failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // -- challenge lifecycle -------------------------------------------------
    /// Challenge lifetime elapsed before verification
    #[error("challenge expired")]
    ChallengeExpired,

    /// Nonce was never issued or was already consumed
    #[error("nonce unknown or already used")]
    NonceUnknownOrReused,

    /// Challenge was issued to a different DID, or the presented challenge
    /// does not match the stored canonical string
    #[error("challenge subject mismatch")]
    ChallengeSubjectMismatch,

    // -- crypto --------------------------------------------------------------
    /// Ed25519 signature did not verify
    #[error("invalid signature")]
    InvalidSignature,

    /// Credential is outside its validity window
    #[error("credential expired")]
    CredentialExpired,

    /// Credential jti appears in its revocation list
    #[error("credential revoked")]
    CredentialRevoked,

    /// Credential issuer is unknown or disabled
    #[error("untrusted issuer: {0}")]
    UntrustedIssuer(String),

    /// Credential subject does not match the authenticating DID
    #[error("credential subject mismatch")]
    SubjectMismatch,

    /// Credential is structurally malformed
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    // -- resolver ------------------------------------------------------------
    /// DID resolution failed after exhausting retries
    #[error("DID resolution failed: {0}")]
    DidResolutionFailed(String),

    /// Circuit breaker for the resolver host is open
    #[error("circuit breaker open for {0}")]
    CircuitOpen(String),

    /// Outbound call exceeded its deadline
    #[error("operation timed out")]
    Timeout,

    // -- tokens --------------------------------------------------------------
    /// Token failed parsing or MAC verification against every known key
    #[error("invalid token")]
    InvalidToken,

    /// Token expiry has passed
    #[error("token expired")]
    TokenExpired,

    // -- policy --------------------------------------------------------------
    /// Requested scope exceeds what the credential entitles
    #[error("forbidden scope: {0}")]
    ForbiddenScope(String),

    /// Token is missing a scope the policy requires
    #[error("insufficient scopes")]
    InsufficientScopes,

    /// Token is missing a VC type the policy requires
    #[error("missing required VC type")]
    MissingVcType,

    /// Credential issuer is not on the policy's allowlist
    #[error("issuer not allowed for this route")]
    IssuerNotAllowed,

    /// Issuer trust tier is below the policy minimum
    #[error("trust tier too low")]
    TrustTierTooLow,

    // -- limits --------------------------------------------------------------
    /// Per-DID request budget exhausted for the window
    #[error("rate limit exceeded")]
    RateLimited,

    // -- infrastructure ------------------------------------------------------
    /// Upstream service failed or refused the connection
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Relational store error
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Shared key-value store error
    #[error("kv error: {0}")]
    Kv(String),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// True for failures that must surface as the uniform `invalid_auth`
    /// envelope code to avoid giving attackers an oracle.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::ChallengeExpired
                | GatewayError::NonceUnknownOrReused
                | GatewayError::ChallengeSubjectMismatch
                | GatewayError::InvalidSignature
                | GatewayError::CredentialExpired
                | GatewayError::CredentialRevoked
                | GatewayError::UntrustedIssuer(_)
                | GatewayError::SubjectMismatch
                | GatewayError::MalformedCredential(_)
                | GatewayError::DidResolutionFailed(_)
                | GatewayError::CircuitOpen(_)
                | GatewayError::InvalidToken
                | GatewayError::TokenExpired
        )
    }
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
