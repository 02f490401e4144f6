//! Trait definitions for the gateway's trust data stores
//!
//! The pipeline reads policy and trust data through these traits; the
//! production implementations live in [`super::postgres`], the in-memory
//! ones (tests, dev mode) in [`super::memory`].

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::error::Result;
use crate::domain::{Issuer, Policy, RevocationList};

/// Route policy storage.
///
/// Invariant: `route_prefix` values are unique. Mutations happen only via
/// the admin surface, which invalidates the `policy:` cache keys.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Policy>>;

    async fn get(&self, id: &str) -> Result<Option<Policy>>;

    async fn upsert(&self, policy: &Policy) -> Result<()>;
}

/// Registry of credential issuers the gateway trusts.
///
/// Invariant: only `enabled` issuers may sign accepted credentials.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IssuerRegistry: Send + Sync {
    async fn get(&self, did: &str) -> Result<Option<Issuer>>;

    async fn list(&self) -> Result<Vec<Issuer>>;

    async fn upsert(&self, issuer: &Issuer) -> Result<()>;
}

/// Storage for credential revocation lists.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RevocationStore: Send + Sync {
    async fn get(&self, list_id: &str) -> Result<Option<RevocationList>>;

    async fn upsert(&self, list: &RevocationList) -> Result<()>;
}
