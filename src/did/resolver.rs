//! DID resolution
//!
//! Resolves a DID to its Ed25519 public key. `did:key` decodes locally;
//! `did:web` and `did:ion` fetch DID Documents over HTTPS behind a
//! per-method circuit breaker and retry budget. Successful resolutions
//! land in the two-layer cache with a method-specific TTL; the cache keeps
//! serving prior successes while a breaker is open.

use std::sync::Arc;
use std::time::Duration;

use crate::crypto::decode_did_key;
use crate::did::document::DidDocument;
use crate::domain::{Did, DidMethod, PublicKey32};
use crate::infra::{
    classify, with_backoff, CircuitBreaker, CircuitBreakerConfig, DidKeyCache, GatewayError,
    Result, RetryConfig, RetryError,
};

/// Resolver tuning; defaults match the per-method profiles the gateway
/// ships with.
#[derive(Debug, Clone)]
pub struct DidResolverConfig {
    /// Base URL of the ION resolver (`/identifiers/<did>` is appended)
    pub ion_resolver_url: String,
    /// Hard ceiling for one resolution attempt chain
    pub call_timeout: Duration,
    /// Cache TTL for did:key (effectively permanent)
    pub key_ttl: Duration,
    /// Cache TTL for did:web documents
    pub web_ttl: Duration,
    /// Cache TTL for did:ion documents
    pub ion_ttl: Duration,
}

impl Default for DidResolverConfig {
    fn default() -> Self {
        Self {
            ion_resolver_url: "https://beta.discover.did.microsoft.com".to_string(),
            call_timeout: Duration::from_secs(10),
            key_ttl: Duration::from_secs(365 * 24 * 3600),
            web_ttl: Duration::from_secs(3600),
            ion_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

/// Resolves DIDs to public keys, caching aggressively.
pub struct DidResolver {
    cache: Arc<DidKeyCache>,
    http: reqwest::Client,
    config: DidResolverConfig,
    web_breaker: CircuitBreaker,
    ion_breaker: CircuitBreaker,
    web_retry: RetryConfig,
    ion_retry: RetryConfig,
}

impl DidResolver {
    pub fn new(cache: Arc<DidKeyCache>, config: DidResolverConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("did-gateway/", env!("CARGO_PKG_VERSION")))
            .timeout(config.call_timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("http client: {e}")))?;

        Ok(Self {
            cache,
            http,
            web_breaker: CircuitBreaker::new(
                "did-web",
                CircuitBreakerConfig {
                    max_failures: 5,
                    call_timeout: config.call_timeout,
                    reset_timeout: Duration::from_secs(60),
                },
            ),
            ion_breaker: CircuitBreaker::new(
                "did-ion",
                CircuitBreakerConfig {
                    max_failures: 5,
                    call_timeout: config.call_timeout,
                    // The blockchain-backed resolver recovers slowly
                    reset_timeout: Duration::from_secs(120),
                },
            ),
            web_retry: RetryConfig::web_resolver(),
            ion_retry: RetryConfig::ion_resolver(),
            config,
        })
    }

    /// Resolve a DID to its 32-byte Ed25519 public key.
    pub async fn resolve(&self, did: &Did) -> Result<PublicKey32> {
        if let Some(key) = self.cache.get(did.as_str()).await? {
            return Ok(key);
        }

        let (key, ttl) = match did.method() {
            DidMethod::Key => (decode_did_key(did.as_str())?, self.config.key_ttl),
            DidMethod::Web => (self.resolve_web(did).await?, self.config.web_ttl),
            DidMethod::Ion => (self.resolve_ion(did).await?, self.config.ion_ttl),
        };

        if let Err(e) = self.cache.set(did.as_str(), &key, ttl).await {
            tracing::warn!(did = %did, error = %e, "failed to cache resolved key");
        }

        tracing::debug!(did = %did, method = %did.method(), "resolved DID");
        Ok(key)
    }

    async fn resolve_web(&self, did: &Did) -> Result<PublicKey32> {
        let url = web_document_url(did)?;
        let result = self
            .web_breaker
            .call(with_backoff(&self.web_retry, || {
                self.fetch_document(url.clone())
            }))
            .await;
        finish_resolution(result)
    }

    async fn resolve_ion(&self, did: &Did) -> Result<PublicKey32> {
        let url = format!(
            "{}/identifiers/{}",
            self.config.ion_resolver_url.trim_end_matches('/'),
            did.as_str()
        );
        let result = self
            .ion_breaker
            .call(with_backoff(&self.ion_retry, || {
                self.fetch_document(url.clone())
            }))
            .await;
        finish_resolution(result)
    }

    async fn fetch_document(&self, url: String) -> std::result::Result<PublicKey32, RetryError> {
        let response = self.http.get(&url).send().await.map_err(|e| {
            let err = GatewayError::Upstream(format!("fetch {url}: {e}"));
            if e.is_timeout() {
                RetryError::Retryable(GatewayError::Timeout)
            } else {
                classify(err)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let err = GatewayError::Upstream(format!("{url} returned {status}"));
            // 4xx means the document is not there; retrying will not help
            return if status.is_client_error() {
                Err(RetryError::NonRetryable(err))
            } else {
                Err(RetryError::Retryable(err))
            };
        }

        let document: DidDocument = response.json().await.map_err(|e| {
            RetryError::NonRetryable(GatewayError::DidResolutionFailed(format!(
                "invalid DID document: {e}"
            )))
        })?;

        document.extract_ed25519_key().map_err(RetryError::NonRetryable)
    }

    /// Breaker states, surfaced by the readiness endpoint.
    pub async fn breaker_states(&self) -> [(String, String); 2] {
        [
            (
                self.web_breaker.name().to_string(),
                self.web_breaker.state().await.to_string(),
            ),
            (
                self.ion_breaker.name().to_string(),
                self.ion_breaker.state().await.to_string(),
            ),
        ]
    }
}

/// Map a finished breaker/retry outcome to the resolver's error contract:
/// breaker-open stays `CircuitOpen`, everything else collapses to
/// `DidResolutionFailed` wrapping the cause.
fn finish_resolution(result: Result<PublicKey32>) -> Result<PublicKey32> {
    match result {
        Ok(key) => Ok(key),
        Err(e @ GatewayError::CircuitOpen(_)) => Err(e),
        Err(e @ GatewayError::DidResolutionFailed(_)) => Err(e),
        Err(e) => Err(GatewayError::DidResolutionFailed(e.to_string())),
    }
}

/// Build the document URL for a did:web identifier.
///
/// `did:web:example.com` maps to `https://example.com/.well-known/did.json`;
/// `did:web:example.com:users:alice` to `https://example.com/users/alice/did.json`.
fn web_document_url(did: &Did) -> Result<String> {
    let id = did.method_specific_id();
    let mut parts = id.split(':');
    let host = parts
        .next()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| GatewayError::InvalidDidFormat(did.as_str().to_string()))?;

    // did:web percent-encodes ports as %3A
    let host = host.replace("%3A", ":");

    let path: Vec<&str> = parts.collect();
    if path.is_empty() {
        Ok(format!("https://{host}/.well-known/did.json"))
    } else {
        Ok(format!("https://{host}/{}/did.json", path.join("/")))
    }
}

// ============================================================================
// Tests
// ============================================================================
