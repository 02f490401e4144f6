//! Ed25519 key encoding
//!
//! `did:key` multibase codec plus the base64url helpers used for persisted
//! issuer keys. The multibase form is `z` (base58btc) over the multicodec
//! prefix `0xED 0x01` followed by the 32 raw key bytes.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::domain::{PublicKey32, Signature64};
use crate::infra::GatewayError;

/// Multicodec prefix for Ed25519 public keys
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Encode a public key as `did:key:z<base58btc(0xed01 || key)>`
pub fn encode_did_key(public_key: &PublicKey32) -> String {
    let mut buf = Vec::with_capacity(2 + public_key.len());
    buf.extend_from_slice(&ED25519_MULTICODEC);
    buf.extend_from_slice(public_key);
    format!("did:key:z{}", bs58::encode(buf).into_string())
}

/// Decode a `did:key` identifier back to the 32 raw key bytes.
///
/// Rejects anything that is not `did:key:z…`, carries the wrong multicodec
/// prefix, or decodes to a key of the wrong length.
pub fn decode_did_key(did: &str) -> Result<PublicKey32, GatewayError> {
    let encoded = did
        .strip_prefix("did:key:z")
        .ok_or_else(|| GatewayError::InvalidDidFormat(did.to_string()))?;

    let raw = bs58::decode(encoded)
        .into_vec()
        .map_err(|_| GatewayError::InvalidDidFormat(did.to_string()))?;

    if raw.len() != ED25519_MULTICODEC.len() + 32 {
        return Err(GatewayError::InvalidDidFormat(did.to_string()));
    }
    if raw[..2] != ED25519_MULTICODEC {
        return Err(GatewayError::InvalidDidFormat(did.to_string()));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&raw[2..]);
    Ok(key)
}

/// Encode a public key as unpadded base64url (the persisted issuer form)
pub fn encode_public_key(public_key: &PublicKey32) -> String {
    URL_SAFE_NO_PAD.encode(public_key)
}

/// Decode an unpadded base64url public key, enforcing the 32-byte length
pub fn decode_public_key(encoded: &str) -> Result<PublicKey32, GatewayError> {
    let raw = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid public key encoding: {e}")))?;
    raw.try_into()
        .map_err(|_| GatewayError::InvalidRequest("invalid public key size".to_string()))
}

/// Decode an unpadded base64url Ed25519 signature (64 bytes)
pub fn decode_signature(encoded: &str) -> Result<Signature64, GatewayError> {
    let raw = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| GatewayError::InvalidSignature)?;
    raw.try_into().map_err(|_| GatewayError::InvalidSignature)
}

/// Verify a detached Ed25519 signature over `message`.
///
/// All failure modes (malformed key, malformed signature, bad signature)
/// collapse to `InvalidSignature`.
pub fn verify_signature(
    public_key: &PublicKey32,
    message: &[u8],
    signature: &Signature64,
) -> Result<(), GatewayError> {
    let key = VerifyingKey::from_bytes(public_key).map_err(|_| GatewayError::InvalidSignature)?;
    let sig = Signature::from_bytes(signature);
    key.verify(message, &sig)
        .map_err(|_| GatewayError::InvalidSignature)
}

// ============================================================================
// Tests
// ============================================================================
