//! Verifiable credential verification
//!
//! Verifies compact JWT-VCs (EdDSA/Ed25519): structural parse, issuer
//! registry lookup, signature check over the signing input, validity
//! window, and status-list revocation. Revocation lists are read through
//! the cache with a short TTL so a revocation takes effect within a
//! minute.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;

use crate::crypto::{decode_public_key, decode_signature, verify_signature};
use crate::domain::{CredentialClaims, RevocationList, VerifiedCredential};
use crate::infra::cache::keys;
use crate::infra::{
    GatewayError, IssuerRegistry, MultiLayerCache, Result, RevocationStore,
};

/// Upper bound on revocation staleness
const REVOCATION_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct JwtHeader {
    alg: String,
}

/// Verifies JWT verifiable credentials against the issuer registry and
/// revocation store.
pub struct VcVerifier {
    issuers: Arc<dyn IssuerRegistry>,
    revocations: Arc<dyn RevocationStore>,
    cache: Arc<MultiLayerCache>,
}

impl VcVerifier {
    pub fn new(
        issuers: Arc<dyn IssuerRegistry>,
        revocations: Arc<dyn RevocationStore>,
        cache: Arc<MultiLayerCache>,
    ) -> Self {
        Self {
            issuers,
            revocations,
            cache,
        }
    }

    /// Verify a compact JWT-VC presented by `expected_subject`.
    pub async fn verify_credential(
        &self,
        jwt: &str,
        expected_subject: &str,
    ) -> Result<VerifiedCredential> {
        let (header_b64, payload_b64, signature_b64) = split_jwt(jwt)?;

        let header: JwtHeader = decode_segment(header_b64)?;
        if header.alg != "EdDSA" {
            return Err(GatewayError::MalformedCredential(format!(
                "unsupported credential algorithm: {}",
                header.alg
            )));
        }

        let claims: CredentialClaims = decode_segment(payload_b64)?;
        if claims.iss.is_empty() || claims.jti.is_empty() {
            return Err(GatewayError::MalformedCredential(
                "missing iss or jti".to_string(),
            ));
        }

        if claims.sub != expected_subject {
            return Err(GatewayError::SubjectMismatch);
        }

        let now = Utc::now().timestamp();
        if now < claims.iat || now >= claims.exp {
            return Err(GatewayError::CredentialExpired);
        }

        let issuer = self
            .issuers
            .get(&claims.iss)
            .await?
            .filter(|i| i.enabled)
            .ok_or_else(|| GatewayError::UntrustedIssuer(claims.iss.clone()))?;
        let issuer_key = decode_public_key(&issuer.public_key)
            .map_err(|_| GatewayError::UntrustedIssuer(claims.iss.clone()))?;

        // EdDSA signs the raw `header.payload` bytes
        let signing_input = format!("{header_b64}.{payload_b64}");
        let signature = decode_signature(signature_b64)?;
        verify_signature(&issuer_key, signing_input.as_bytes(), &signature)?;

        let revocation_list = self.load_revocation_list(claims.revocation_list()).await?;
        if revocation_list.is_revoked(&claims.jti) {
            return Err(GatewayError::CredentialRevoked);
        }

        Ok(VerifiedCredential {
            types: claims.vc_types(),
            issuer: claims.iss,
            trust_tier: issuer.trust_tier,
            jti: claims.jti,
        })
    }

    /// Load a revocation list through the cache (staleness ≤ 60 s).
    ///
    /// A list that was never uploaded behaves as empty.
    async fn load_revocation_list(&self, list_id: &str) -> Result<RevocationList> {
        let cache_key = format!("{}{}", keys::REVOCATION, list_id);
        let store = self.revocations.clone();
        let id = list_id.to_string();

        let raw = self
            .cache
            .get_or_load(&cache_key, REVOCATION_CACHE_TTL, || async move {
                let list = store.get(&id).await?.unwrap_or(RevocationList {
                    list_id: id,
                    revoked: Vec::new(),
                    updated_at: Utc::now(),
                });
                serde_json::to_vec(&list)
                    .map_err(|e| GatewayError::Internal(format!("encode revocation list: {e}")))
            })
            .await?;

        serde_json::from_slice(&raw)
            .map_err(|e| GatewayError::Internal(format!("decode revocation list: {e}")))
    }
}

fn split_jwt(jwt: &str) -> Result<(&str, &str, &str)> {
    let mut parts = jwt.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => {
            Ok((h, p, s))
        }
        _ => Err(GatewayError::MalformedCredential(
            "expected three dot-separated segments".to_string(),
        )),
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| GatewayError::MalformedCredential(format!("invalid base64url: {e}")))?;
    serde_json::from_slice(&raw)
        .map_err(|e| GatewayError::MalformedCredential(format!("invalid JSON segment: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
