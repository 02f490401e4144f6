//! Policy matching and evaluation
//!
//! Route policies are matched by longest prefix and evaluated against the
//! claims of a verified access token. The policy table is read through
//! the cache with a short TTL; admin writes invalidate it.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{AccessTokenClaims, Policy};
use crate::infra::{GatewayError, MultiLayerCache, PolicyStore, Result};

/// How stale the cached policy table may get
const POLICY_CACHE_TTL: Duration = Duration::from_secs(30);

/// Cache key for the whole policy table
const POLICY_TABLE_KEY: &str = "policy:all";

/// Longest-prefix route matching plus predicate evaluation.
pub struct PolicyEngine {
    store: Arc<dyn PolicyStore>,
    cache: Arc<MultiLayerCache>,
}

impl PolicyEngine {
    pub fn new(store: Arc<dyn PolicyStore>, cache: Arc<MultiLayerCache>) -> Self {
        Self { store, cache }
    }

    /// All policies, read through the cache.
    pub async fn policies(&self) -> Result<Vec<Policy>> {
        let store = self.store.clone();
        let raw = self
            .cache
            .get_or_load(POLICY_TABLE_KEY, POLICY_CACHE_TTL, || async move {
                let policies = store.list().await?;
                serde_json::to_vec(&policies)
                    .map_err(|e| GatewayError::Internal(format!("encode policies: {e}")))
            })
            .await?;
        serde_json::from_slice(&raw)
            .map_err(|e| GatewayError::Internal(format!("decode policies: {e}")))
    }

    /// Pick the policy whose `route_prefix` is the longest prefix of
    /// `path`, or the deny-all sentinel when nothing matches. Prefixes are
    /// unique, so there is never a tie to break.
    pub async fn match_path(&self, path: &str) -> Result<Policy> {
        let policies = self.policies().await?;
        Ok(match_path(&policies, path))
    }

    /// Drop the cached policy table after an admin write.
    pub async fn invalidate(&self) -> Result<()> {
        self.cache.delete(POLICY_TABLE_KEY).await
    }
}

/// Pure longest-prefix match over a policy slice.
pub fn match_path(policies: &[Policy], path: &str) -> Policy {
    policies
        .iter()
        .filter(|p| !p.route_prefix.is_empty() && path.starts_with(&p.route_prefix))
        .max_by_key(|p| p.route_prefix.len())
        .cloned()
        .unwrap_or_else(Policy::deny_all)
}

/// Evaluate a policy against token claims. Checks run in a fixed order so
/// the first failing predicate names the denial reason.
pub fn evaluate(policy: &Policy, claims: &AccessTokenClaims) -> Result<()> {
    if policy.is_deny_all() {
        return Err(GatewayError::InsufficientScopes);
    }

    if !policy
        .required_scopes
        .iter()
        .all(|scope| claims.has_scope(scope))
    {
        return Err(GatewayError::InsufficientScopes);
    }

    if !policy.required_vc_types.is_empty()
        && !policy
            .required_vc_types
            .iter()
            .all(|t| claims.vc_types.contains(t))
    {
        return Err(GatewayError::MissingVcType);
    }

    if !policy.allowed_issuers.is_empty() {
        let allowed = claims
            .vc_issuer
            .as_ref()
            .is_some_and(|issuer| policy.allowed_issuers.contains(issuer));
        if !allowed {
            return Err(GatewayError::IssuerNotAllowed);
        }
    }

    if let Some(min_tier) = policy.min_trust_tier {
        let tier_ok = claims.vc_trust_tier.is_some_and(|tier| tier >= min_tier);
        if !tier_ok {
            return Err(GatewayError::TrustTierTooLow);
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
