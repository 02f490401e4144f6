//! In-memory trust data stores
//!
//! Back the integration tests and single-node dev mode. Semantics match
//! the PostgreSQL implementations (upsert-by-key, list ordering by id).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::error::Result;
use super::traits::{IssuerRegistry, PolicyStore, RevocationStore};
use crate::domain::{Issuer, Policy, RevocationList};

#[derive(Default)]
pub struct MemoryPolicyStore {
    policies: RwLock<HashMap<String, Policy>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn list(&self) -> Result<Vec<Policy>> {
        let mut policies: Vec<Policy> = self.policies.read().await.values().cloned().collect();
        policies.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(policies)
    }

    async fn get(&self, id: &str) -> Result<Option<Policy>> {
        Ok(self.policies.read().await.get(id).cloned())
    }

    async fn upsert(&self, policy: &Policy) -> Result<()> {
        self.policies
            .write()
            .await
            .insert(policy.id.clone(), policy.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryIssuerRegistry {
    issuers: RwLock<HashMap<String, Issuer>>,
}

impl MemoryIssuerRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IssuerRegistry for MemoryIssuerRegistry {
    async fn get(&self, did: &str) -> Result<Option<Issuer>> {
        Ok(self.issuers.read().await.get(did).cloned())
    }

    async fn list(&self) -> Result<Vec<Issuer>> {
        let mut issuers: Vec<Issuer> = self.issuers.read().await.values().cloned().collect();
        issuers.sort_by(|a, b| a.did.cmp(&b.did));
        Ok(issuers)
    }

    async fn upsert(&self, issuer: &Issuer) -> Result<()> {
        self.issuers
            .write()
            .await
            .insert(issuer.did.clone(), issuer.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRevocationStore {
    lists: RwLock<HashMap<String, RevocationList>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn get(&self, list_id: &str) -> Result<Option<RevocationList>> {
        Ok(self.lists.read().await.get(list_id).cloned())
    }

    async fn upsert(&self, list: &RevocationList) -> Result<()> {
        self.lists
            .write()
            .await
            .insert(list.list_id.clone(), list.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_policy_upsert_and_list_order() {
        let store = MemoryPolicyStore::new();
        for id in ["b", "a"] {
            store
                .upsert(&Policy {
                    id: id.into(),
                    name: id.into(),
                    route_prefix: format!("/api/{id}"),
                    required_scopes: vec!["basic".into()],
                    required_vc_types: vec![],
                    allowed_issuers: vec![],
                    min_trust_tier: None,
                    rate_limit: None,
                    token_ttl_seconds: 300,
                })
                .await
                .unwrap();
        }

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "a");

        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.get("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_issuer_upsert_replaces() {
        let registry = MemoryIssuerRegistry::new();
        let mut issuer = Issuer {
            did: "did:key:z1".into(),
            public_key: "AAAA".into(),
            enabled: true,
            trust_tier: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        registry.upsert(&issuer).await.unwrap();

        issuer.enabled = false;
        registry.upsert(&issuer).await.unwrap();

        let fetched = registry.get("did:key:z1").await.unwrap().unwrap();
        assert!(!fetched.enabled);
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revocation_roundtrip() {
        let store = MemoryRevocationStore::new();
        store
            .upsert(&RevocationList {
                list_id: "default".into(),
                revoked: vec!["j1".into()],
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let list = store.get("default").await.unwrap().unwrap();
        assert!(list.is_revoked("j1"));
        assert!(store.get("other").await.unwrap().is_none());
    }
}
