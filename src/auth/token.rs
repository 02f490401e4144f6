//! Access token signing and verification
//!
//! Opaque bearer tokens: compact `header.payload.mac` with an HMAC-SHA256
//! tag. The signer holds an ordered key list; the first key signs, the
//! rest verify. Rotation is prepending a new active key and keeping the
//! old ones around for at least the longest outstanding token TTL.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::domain::AccessTokenClaims;
use crate::infra::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// One symmetric signing key with its rotation id
#[derive(Clone, Deserialize)]
pub struct TokenKey {
    pub kid: String,
    pub secret: String,
}

impl std::fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    kid: String,
}

/// Signs and verifies gateway access tokens.
pub struct TokenSigner {
    keys: Vec<TokenKey>,
}

impl TokenSigner {
    /// Build a signer from an ordered key list; the first key is active.
    pub fn new(keys: Vec<TokenKey>) -> Result<Self> {
        if keys.is_empty() {
            return Err(GatewayError::Internal(
                "token signer requires at least one key".to_string(),
            ));
        }
        if keys.iter().any(|k| k.kid.is_empty() || k.secret.is_empty()) {
            return Err(GatewayError::Internal(
                "token keys must have non-empty kid and secret".to_string(),
            ));
        }
        Ok(Self { keys })
    }

    /// Parse the `TOKEN_SECRET` value: either a bare secret (single key,
    /// kid `primary`) or a JSON array of `{kid, secret}` objects ordered
    /// active-first.
    pub fn from_secret_config(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.starts_with('[') {
            let keys: Vec<TokenKey> = serde_json::from_str(trimmed)
                .map_err(|e| GatewayError::Internal(format!("invalid TOKEN_SECRET JSON: {e}")))?;
            Self::new(keys)
        } else {
            Self::new(vec![TokenKey {
                kid: "primary".to_string(),
                secret: trimmed.to_string(),
            }])
        }
    }

    pub fn active_kid(&self) -> &str {
        &self.keys[0].kid
    }

    /// Sign `claims` with the active key. The `kid` claim is stamped with
    /// the active key id regardless of what the caller set.
    pub fn sign(&self, claims: &AccessTokenClaims) -> Result<String> {
        let active = &self.keys[0];

        let mut claims = claims.clone();
        claims.kid = active.kid.clone();

        let header = TokenHeader {
            alg: "HS256".to_string(),
            kid: active.kid.clone(),
        };
        let header_b64 = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&header)
                .map_err(|e| GatewayError::Internal(format!("encode header: {e}")))?,
        );
        let payload_b64 = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&claims)
                .map_err(|e| GatewayError::Internal(format!("encode claims: {e}")))?,
        );

        let signing_input = format!("{header_b64}.{payload_b64}");
        let tag = mac_tag(&active.secret, signing_input.as_bytes())?;

        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(tag)))
    }

    /// Verify a token and return its claims.
    ///
    /// The key named by the header `kid` is tried first; on miss or MAC
    /// failure every known key is tried, and only when all fail does the
    /// token read as invalid. Expiry is checked after authenticity.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims> {
        let mut parts = token.split('.');
        let (header_b64, payload_b64, tag_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(t), None) => (h, p, t),
                _ => return Err(GatewayError::InvalidToken),
            };

        let header: TokenHeader = URL_SAFE_NO_PAD
            .decode(header_b64)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or(GatewayError::InvalidToken)?;
        if header.alg != "HS256" {
            return Err(GatewayError::InvalidToken);
        }

        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| GatewayError::InvalidToken)?;
        let signing_input = format!("{header_b64}.{payload_b64}");

        let by_kid = self.keys.iter().filter(|k| k.kid == header.kid);
        let others = self.keys.iter().filter(|k| k.kid != header.kid);
        let verified = by_kid
            .chain(others)
            .any(|key| mac_verify(&key.secret, signing_input.as_bytes(), &tag));
        if !verified {
            return Err(GatewayError::InvalidToken);
        }

        let claims: AccessTokenClaims = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or(GatewayError::InvalidToken)?;

        if Utc::now().timestamp() >= claims.exp {
            return Err(GatewayError::TokenExpired);
        }

        Ok(claims)
    }
}

fn mac_tag(secret: &str, input: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::Internal(format!("hmac init: {e}")))?;
    mac.update(input);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn mac_verify(secret: &str, input: &[u8], tag: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(input);
    mac.verify_slice(tag).is_ok()
}

// ============================================================================
// Tests
// ============================================================================
