//! Authentication pipeline orchestration
//!
//! Ties the challenge service, DID resolver, credential verifier, policy
//! engine, token signer, and rate limiter into the three operations the
//! HTTP surface exposes: issue a challenge, verify a signed challenge
//! into a token, and authorize a proxied request.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::auth::challenge::{parse_nonce, ChallengeService};
use crate::auth::policy::{evaluate, PolicyEngine};
use crate::auth::rate_limit::RateLimiter;
use crate::auth::token::TokenSigner;
use crate::crypto::{decode_signature, verify_signature};
use crate::did::DidResolver;
use crate::domain::{
    AccessTokenClaims, AuthVerifyRequest, AuthVerifyResponse, ChallengeResponse, Did, Policy,
    validate_scopes, PREMIUM_CREDENTIAL_TYPE, SCOPE_BASIC, SCOPE_PREMIUM,
};
use crate::infra::{GatewayError, Result};
use crate::vc::VcVerifier;

/// Pipeline-level configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// `iss` claim stamped into minted tokens
    pub token_issuer: String,
    /// Token TTL when no policy supplies one
    pub default_token_ttl: Duration,
    /// Route prefix whose policy supplies the mint-time token TTL
    pub proxy_root: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            token_issuer: "did-gateway".to_string(),
            default_token_ttl: Duration::from_secs(300),
            proxy_root: "/api".to_string(),
        }
    }
}

/// The authenticated context a proxied request runs under
#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub claims: AccessTokenClaims,
    pub policy: Policy,
}

/// Orchestrates challenge issuance, verification, token minting, and the proxy gate.
pub struct AuthPipeline {
    challenges: ChallengeService,
    resolver: Arc<DidResolver>,
    vc_verifier: VcVerifier,
    policy_engine: Arc<PolicyEngine>,
    token_signer: TokenSigner,
    rate_limiter: RateLimiter,
    config: PipelineConfig,
}

impl AuthPipeline {
    pub fn new(
        challenges: ChallengeService,
        resolver: Arc<DidResolver>,
        vc_verifier: VcVerifier,
        policy_engine: Arc<PolicyEngine>,
        token_signer: TokenSigner,
        rate_limiter: RateLimiter,
        config: PipelineConfig,
    ) -> Self {
        Self {
            challenges,
            resolver,
            vc_verifier,
            policy_engine,
            token_signer,
            rate_limiter,
            config,
        }
    }

    /// `GET /v1/auth/challenge`
    ///
    /// Malformed DIDs fail here; resolution failures do not: the key
    /// lookup only warms the cache, and verify surfaces any real problem.
    pub async fn issue_challenge(&self, did: &str) -> Result<ChallengeResponse> {
        let did = Did::parse(did)?;

        if let Err(e) = self.resolver.resolve(&did).await {
            tracing::debug!(did = %did, error = %e, "eager resolution failed; deferred to verify");
        }

        self.challenges.issue(&did).await
    }

    /// `POST /v1/auth/verify`
    pub async fn verify(&self, req: &AuthVerifyRequest) -> Result<AuthVerifyResponse> {
        let did = Did::parse(&req.did)?;

        // Consume before any crypto: a replayed nonce must die here even
        // if the rest of the request is pristine
        let nonce = parse_nonce(&req.challenge)?;
        self.challenges
            .consume(nonce, did.as_str(), &req.challenge)
            .await?;

        let public_key = self.resolver.resolve(&did).await?;
        let signature = decode_signature(&req.signature)?;
        verify_signature(&public_key, req.challenge.as_bytes(), &signature)?;

        let credential = match &req.credential {
            Some(jwt) => Some(self.vc_verifier.verify_credential(jwt, did.as_str()).await?),
            None => None,
        };

        let mut allowed = vec![SCOPE_BASIC.to_string()];
        if credential
            .as_ref()
            .is_some_and(|vc| vc.types.iter().any(|t| t == PREMIUM_CREDENTIAL_TYPE))
        {
            allowed.push(SCOPE_PREMIUM.to_string());
        }

        let scopes = match req.scopes.as_deref() {
            None | Some([]) => allowed,
            Some(requested) => {
                validate_scopes(requested)?;
                if let Some(denied) = requested.iter().find(|s| !allowed.contains(s)) {
                    return Err(GatewayError::ForbiddenScope(denied.clone()));
                }
                requested.to_vec()
            }
        };

        let ttl = self.mint_ttl().await;
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            sub: did.as_str().to_string(),
            scopes,
            vc_types: credential.as_ref().map(|vc| vc.types.clone()).unwrap_or_default(),
            vc_issuer: credential.as_ref().map(|vc| vc.issuer.clone()),
            vc_trust_tier: credential.as_ref().map(|vc| vc.trust_tier),
            iss: self.config.token_issuer.clone(),
            iat: now,
            exp: now + ttl as i64,
            jti: Uuid::new_v4().to_string(),
            kid: String::new(), // stamped by the signer
        };

        let access_token = self.token_signer.sign(&claims)?;

        tracing::info!(did = %did, scopes = ?claims.scopes, "minted access token");

        Ok(AuthVerifyResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: ttl as i64,
        })
    }

    /// Authorize a request to `path` carrying `token`.
    ///
    /// Order matters: authenticity first, then route policy, then the
    /// rate budget last, so a 429 is only spent on requests that would
    /// otherwise pass.
    pub async fn authorize(&self, path: &str, token: &str) -> Result<ProxyAuth> {
        let claims = self.token_signer.verify(token)?;
        let policy = self.policy_engine.match_path(path).await?;

        evaluate(&policy, &claims)?;
        self.rate_limiter.check(&claims.sub, &policy).await?;

        Ok(ProxyAuth { claims, policy })
    }

    /// Token TTL at mint time: verify has no target route, so the policy
    /// matched at the proxy root supplies it, defaulting otherwise.
    async fn mint_ttl(&self) -> u64 {
        match self.policy_engine.match_path(&self.config.proxy_root).await {
            Ok(policy) if !policy.is_deny_all() && policy.token_ttl_seconds > 0 => {
                policy.token_ttl_seconds
            }
            Ok(_) => self.config.default_token_ttl.as_secs(),
            Err(e) => {
                tracing::warn!(error = %e, "policy lookup failed at mint; using default TTL");
                self.config.default_token_ttl.as_secs()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
