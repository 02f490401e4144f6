//! Core domain types for the DID gateway
//!
//! Wire and storage models shared across the authentication pipeline:
//! DIDs, policies, issuers, revocation lists, challenges, and token claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::infra::GatewayError;

/// 32-byte Ed25519 public key
pub type PublicKey32 = [u8; 32];

/// 64-byte Ed25519 signature
pub type Signature64 = [u8; 64];

/// Scope granted to every authenticated subject
pub const SCOPE_BASIC: &str = "basic";

/// Scope granted only to holders of a premium credential
pub const SCOPE_PREMIUM: &str = "premium";

/// VC type that unlocks the premium scope
pub const PREMIUM_CREDENTIAL_TYPE: &str = "PremiumCredential";

/// Revocation list consulted when a credential does not name one
pub const DEFAULT_REVOCATION_LIST: &str = "default";

// ============================================================================
// DIDs
// ============================================================================

/// DID methods the gateway can resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DidMethod {
    /// Key material embedded in the identifier (no network)
    Key,
    /// Document served from the holder's domain
    Web,
    /// Document anchored on the ION network
    Ion,
}

impl DidMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DidMethod::Key => "key",
            DidMethod::Web => "web",
            DidMethod::Ion => "ion",
        }
    }
}

impl fmt::Display for DidMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated decentralized identifier.
///
/// Parsing enforces `did:<method>:<method-specific-id>` with a lowercase
/// alphanumeric method and an id drawn from `[A-Za-z0-9._%:-]`, then applies
/// per-method checks (`did:key` ids are multibase and must start with `z`,
/// `did:web` ids carry a domain).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Did {
    raw: String,
    method: DidMethod,
}

impl Did {
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        let rest = s
            .strip_prefix("did:")
            .ok_or_else(|| GatewayError::InvalidDidFormat(s.to_string()))?;

        let (method, id) = rest
            .split_once(':')
            .ok_or_else(|| GatewayError::InvalidDidFormat(s.to_string()))?;

        if method.is_empty()
            || !method
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(GatewayError::InvalidDidFormat(s.to_string()));
        }

        if id.is_empty() || !id.chars().all(is_method_id_char) {
            return Err(GatewayError::InvalidDidFormat(s.to_string()));
        }

        let method = match method {
            "key" => DidMethod::Key,
            "web" => DidMethod::Web,
            "ion" => DidMethod::Ion,
            other => return Err(GatewayError::UnsupportedDidMethod(other.to_string())),
        };

        match method {
            DidMethod::Key if !id.starts_with('z') => {
                return Err(GatewayError::InvalidDidFormat(s.to_string()));
            }
            DidMethod::Web if id.len() < 3 => {
                return Err(GatewayError::InvalidDidFormat(s.to_string()));
            }
            _ => {}
        }

        Ok(Self {
            raw: s.to_string(),
            method,
        })
    }

    pub fn method(&self) -> DidMethod {
        self.method
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Everything after `did:<method>:`
    pub fn method_specific_id(&self) -> &str {
        let prefix_len = "did:".len() + self.method.as_str().len() + 1;
        &self.raw[prefix_len..]
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_method_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '-' | ':')
}

// ============================================================================
// Trust data
// ============================================================================

/// Rate limit attached to a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub window_seconds: u64,
    pub max_requests: u64,
}

/// Route policy: who may call what, and how often.
///
/// `route_prefix` values are unique across policies; route matching picks
/// the longest prefix of the request path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub route_prefix: String,
    #[serde(default)]
    pub required_scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_vc_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_issuers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_trust_tier: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitRule>,
    pub token_ttl_seconds: u64,
}

impl Policy {
    /// Sentinel returned when no policy prefix matches a path.
    /// Evaluation always denies it.
    pub fn deny_all() -> Self {
        Self {
            id: "deny-all".to_string(),
            name: "deny-all".to_string(),
            route_prefix: String::new(),
            required_scopes: Vec::new(),
            required_vc_types: Vec::new(),
            allowed_issuers: Vec::new(),
            min_trust_tier: None,
            rate_limit: None,
            token_ttl_seconds: 0,
        }
    }

    pub fn is_deny_all(&self) -> bool {
        self.id == "deny-all"
    }
}

/// Credential issuer trusted by the gateway.
///
/// Only `enabled` issuers may sign accepted credentials. The public key is
/// stored as unpadded base64url of the 32 raw bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issuer {
    pub did: String,
    pub public_key: String,
    pub enabled: bool,
    pub trust_tier: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Set of revoked credential ids (`jti` values)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevocationList {
    #[serde(rename = "listId")]
    pub list_id: String,
    pub revoked: Vec<String>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl RevocationList {
    pub fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.iter().any(|r| r == jti)
    }
}

// ============================================================================
// Auth wire types
// ============================================================================

/// Response for `GET /v1/auth/challenge`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge: String,
    pub nonce: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
    pub audience: String,
    pub domain: String,
}

/// Request body for `POST /v1/auth/verify`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthVerifyRequest {
    pub did: String,
    pub challenge: String,
    pub signature: String,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default)]
    pub credential: Option<String>,
}

/// Token envelope returned by a successful verify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthVerifyResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Claims carried inside a gateway access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vc_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vc_issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vc_trust_tier: Option<i32>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub kid: String,
}

impl AccessTokenClaims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Payload claims of a JWT verifiable credential
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialClaims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub vc: serde_json::Value,
}

impl CredentialClaims {
    /// VC types carried in the credential's `vc.type` array
    pub fn vc_types(&self) -> Vec<String> {
        self.vc
            .get("type")
            .and_then(|t| t.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Revocation list the credential belongs to, if it names one
    pub fn revocation_list(&self) -> &str {
        self.vc
            .get("credentialStatus")
            .and_then(|s| s.get("statusListCredential"))
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_REVOCATION_LIST)
    }
}

/// Outcome of a successful credential verification
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedCredential {
    pub types: Vec<String>,
    pub issuer: String,
    pub trust_tier: i32,
    pub jti: String,
}

/// Validate requested scopes against the known scope set.
///
/// An empty list is allowed: the pipeline substitutes the scopes the
/// credential entitles the caller to.
pub fn validate_scopes(scopes: &[String]) -> Result<(), GatewayError> {
    for scope in scopes {
        if scope != SCOPE_BASIC && scope != SCOPE_PREMIUM {
            return Err(GatewayError::ForbiddenScope(scope.clone()));
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
