//! DID Document parsing and key extraction
//!
//! Key extraction is strict: the FIRST verification method must be an
//! Ed25519 key in JWK or multibase form, and the decoded key must be
//! exactly 32 bytes. Anything else fails resolution.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::domain::PublicKey32;
use crate::infra::GatewayError;

/// Verification method types accepted as Ed25519-compatible
const ED25519_METHOD_TYPES: [&str; 3] = [
    "Ed25519VerificationKey2020",
    "Ed25519VerificationKey2018",
    "JsonWebKey2020",
];

/// A DID Document as served by did:web hosts and the ION resolver.
///
/// Only the fields the gateway consumes are modeled; everything else is
/// ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidDocument {
    pub id: String,
    #[serde(default, rename = "verificationMethod")]
    pub verification_method: Vec<VerificationMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    #[serde(default, rename = "publicKeyJwk", skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<PublicKeyJwk>,
    #[serde(
        default,
        rename = "publicKeyMultibase",
        skip_serializing_if = "Option::is_none"
    )]
    pub public_key_multibase: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
}

impl DidDocument {
    /// Extract the Ed25519 public key from the document's first
    /// verification method.
    pub fn extract_ed25519_key(&self) -> Result<PublicKey32, GatewayError> {
        let method = self.verification_method.first().ok_or_else(|| {
            GatewayError::DidResolutionFailed(format!(
                "DID document for {} has no verification methods",
                self.id
            ))
        })?;

        if !ED25519_METHOD_TYPES.contains(&method.method_type.as_str()) {
            return Err(GatewayError::DidResolutionFailed(format!(
                "unsupported verification method type: {}",
                method.method_type
            )));
        }

        if let Some(jwk) = &method.public_key_jwk {
            return decode_jwk(jwk);
        }
        if let Some(multibase) = &method.public_key_multibase {
            return decode_multibase(multibase);
        }

        Err(GatewayError::DidResolutionFailed(format!(
            "verification method {} carries no key material",
            method.id
        )))
    }
}

fn decode_jwk(jwk: &PublicKeyJwk) -> Result<PublicKey32, GatewayError> {
    if jwk.kty != "OKP" || jwk.crv != "Ed25519" {
        return Err(GatewayError::DidResolutionFailed(format!(
            "JWK is not an Ed25519 key: kty={} crv={}",
            jwk.kty, jwk.crv
        )));
    }

    let raw = URL_SAFE_NO_PAD
        .decode(&jwk.x)
        .map_err(|e| GatewayError::DidResolutionFailed(format!("invalid JWK x value: {e}")))?;
    raw.try_into()
        .map_err(|_| GatewayError::DidResolutionFailed("JWK key is not 32 bytes".to_string()))
}

fn decode_multibase(multibase: &str) -> Result<PublicKey32, GatewayError> {
    let encoded = multibase.strip_prefix('z').ok_or_else(|| {
        GatewayError::DidResolutionFailed("publicKeyMultibase must be base58btc".to_string())
    })?;

    let raw = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| GatewayError::DidResolutionFailed(format!("invalid multibase key: {e}")))?;

    // Ed25519VerificationKey2020 prepends the 0xED 0x01 multicodec prefix;
    // 2018-style documents encode the bare key.
    let key_bytes = match raw.as_slice() {
        [0xed, 0x01, rest @ ..] if rest.len() == 32 => rest,
        rest => rest,
    };

    key_bytes
        .try_into()
        .map_err(|_| GatewayError::DidResolutionFailed("multibase key is not 32 bytes".to_string()))
}

// ============================================================================
// Tests
// ============================================================================
