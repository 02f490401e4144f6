//! Challenge issuance and single-use consumption
//!
//! A challenge is a canonical five-line string the holder signs to prove
//! key possession. The nonce is stored in the shared KV with a TTL equal
//! to the challenge lifetime and removed by an atomic pop on first use:
//! of N concurrent verifies for the same nonce, exactly one can succeed.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::domain::{ChallengeResponse, Did};
use crate::infra::cache::keys;
use crate::infra::{GatewayError, KvStore, Result};

/// Default challenge lifetime
pub const CHALLENGE_TTL: Duration = Duration::from_secs(120);

/// Nonce entropy in bytes (128 bits)
const NONCE_BYTES: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct StoredChallenge {
    did: String,
    challenge: String,
    exp: i64,
}

#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    pub audience: String,
    pub domain: String,
    pub ttl: Duration,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            audience: "did-gateway".to_string(),
            domain: "localhost".to_string(),
            ttl: CHALLENGE_TTL,
        }
    }
}

/// Mints single-use challenges and consumes them on verify.
pub struct ChallengeService {
    kv: Arc<dyn KvStore>,
    config: ChallengeConfig,
}

impl ChallengeService {
    pub fn new(kv: Arc<dyn KvStore>, config: ChallengeConfig) -> Self {
        Self { kv, config }
    }

    /// Issue a challenge for `did`.
    pub async fn issue(&self, did: &Did) -> Result<ChallengeResponse> {
        let mut nonce_bytes = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = URL_SAFE_NO_PAD.encode(nonce_bytes);

        let exp = Utc::now().timestamp() + self.config.ttl.as_secs() as i64;
        let challenge = canonical_challenge(
            did.as_str(),
            &nonce,
            &self.config.audience,
            &self.config.domain,
            exp,
        );

        let stored = StoredChallenge {
            did: did.as_str().to_string(),
            challenge: challenge.clone(),
            exp,
        };
        let payload = serde_json::to_vec(&stored)
            .map_err(|e| GatewayError::Internal(format!("encode challenge: {e}")))?;

        self.kv
            .set_with_ttl(&nonce_key(&nonce), &payload, self.config.ttl)
            .await?;

        tracing::debug!(did = %did, nonce = %nonce, "issued challenge");

        Ok(ChallengeResponse {
            challenge,
            nonce,
            expires_at: exp,
            audience: self.config.audience.clone(),
            domain: self.config.domain.clone(),
        })
    }

    /// Consume the challenge bound to `nonce`.
    ///
    /// The atomic pop makes this linearizable: a nonce can never be
    /// accepted twice, even under concurrent verifies.
    pub async fn consume(&self, nonce: &str, did: &str, presented: &str) -> Result<()> {
        let payload = self
            .kv
            .pop(&nonce_key(nonce))
            .await?
            .ok_or(GatewayError::NonceUnknownOrReused)?;

        let stored: StoredChallenge = serde_json::from_slice(&payload)
            .map_err(|e| GatewayError::Internal(format!("decode challenge: {e}")))?;

        if stored.did != did {
            return Err(GatewayError::ChallengeSubjectMismatch);
        }
        // The signature covers the exact canonical bytes; anything else is
        // a different challenge
        if stored.challenge != presented {
            return Err(GatewayError::ChallengeSubjectMismatch);
        }
        if Utc::now().timestamp() >= stored.exp {
            return Err(GatewayError::ChallengeExpired);
        }

        Ok(())
    }
}

/// The canonical challenge string: five lines, each `\n`-terminated, in
/// this exact order. The byte sequence of this string is what gets signed.
pub fn canonical_challenge(did: &str, nonce: &str, aud: &str, domain: &str, exp: i64) -> String {
    format!("did={did}\nnonce={nonce}\naud={aud}\ndomain={domain}\nexp={exp}\n")
}

/// Pull the nonce out of a presented challenge string.
pub fn parse_nonce(challenge: &str) -> Result<&str> {
    challenge
        .lines()
        .find_map(|line| line.strip_prefix("nonce="))
        .filter(|n| !n.is_empty())
        .ok_or_else(|| GatewayError::InvalidRequest("challenge is missing a nonce".to_string()))
}

fn nonce_key(nonce: &str) -> String {
    format!("{}{}", keys::NONCE, nonce)
}

// ============================================================================
// Tests
// ============================================================================
