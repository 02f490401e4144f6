//! PostgreSQL-backed trust data stores
//!
//! Production implementations of the policy, issuer, and revocation
//! traits. Each store owns its schema bootstrap; `initialize()` is run at
//! startup and is idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

use super::error::Result;
use super::traits::{IssuerRegistry, PolicyStore, RevocationStore};
use crate::domain::{Issuer, Policy, RateLimitRule, RevocationList};

// ============================================================================
// Policies
// ============================================================================

pub struct PgPolicyStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct PolicyRow {
    id: String,
    name: String,
    route_prefix: String,
    required_scopes: Vec<String>,
    required_vc_types: Vec<String>,
    allowed_issuers: Vec<String>,
    min_trust_tier: Option<i32>,
    rate_window_seconds: Option<i64>,
    rate_max_requests: Option<i64>,
    token_ttl_seconds: i64,
}

impl From<PolicyRow> for Policy {
    fn from(row: PolicyRow) -> Self {
        let rate_limit = match (row.rate_window_seconds, row.rate_max_requests) {
            (Some(window), Some(max)) => Some(RateLimitRule {
                window_seconds: window as u64,
                max_requests: max as u64,
            }),
            _ => None,
        };
        Policy {
            id: row.id,
            name: row.name,
            route_prefix: row.route_prefix,
            required_scopes: row.required_scopes,
            required_vc_types: row.required_vc_types,
            allowed_issuers: row.allowed_issuers,
            min_trust_tier: row.min_trust_tier,
            rate_limit,
            token_ttl_seconds: row.token_ttl_seconds as u64,
        }
    }
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS policies (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                route_prefix TEXT NOT NULL UNIQUE,
                required_scopes TEXT[] NOT NULL DEFAULT '{}',
                required_vc_types TEXT[] NOT NULL DEFAULT '{}',
                allowed_issuers TEXT[] NOT NULL DEFAULT '{}',
                min_trust_tier INTEGER,
                rate_window_seconds BIGINT,
                rate_max_requests BIGINT,
                token_ttl_seconds BIGINT NOT NULL DEFAULT 300,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn list(&self) -> Result<Vec<Policy>> {
        let rows = sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT id, name, route_prefix, required_scopes, required_vc_types,
                   allowed_issuers, min_trust_tier, rate_window_seconds,
                   rate_max_requests, token_ttl_seconds
            FROM policies ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Policy::from).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Policy>> {
        let row = sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT id, name, route_prefix, required_scopes, required_vc_types,
                   allowed_issuers, min_trust_tier, rate_window_seconds,
                   rate_max_requests, token_ttl_seconds
            FROM policies WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Policy::from))
    }

    async fn upsert(&self, policy: &Policy) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO policies (
                id, name, route_prefix, required_scopes, required_vc_types,
                allowed_issuers, min_trust_tier, rate_window_seconds,
                rate_max_requests, token_ttl_seconds, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                route_prefix = EXCLUDED.route_prefix,
                required_scopes = EXCLUDED.required_scopes,
                required_vc_types = EXCLUDED.required_vc_types,
                allowed_issuers = EXCLUDED.allowed_issuers,
                min_trust_tier = EXCLUDED.min_trust_tier,
                rate_window_seconds = EXCLUDED.rate_window_seconds,
                rate_max_requests = EXCLUDED.rate_max_requests,
                token_ttl_seconds = EXCLUDED.token_ttl_seconds,
                updated_at = NOW()
            "#,
        )
        .bind(&policy.id)
        .bind(&policy.name)
        .bind(&policy.route_prefix)
        .bind(&policy.required_scopes)
        .bind(&policy.required_vc_types)
        .bind(&policy.allowed_issuers)
        .bind(policy.min_trust_tier)
        .bind(policy.rate_limit.as_ref().map(|r| r.window_seconds as i64))
        .bind(policy.rate_limit.as_ref().map(|r| r.max_requests as i64))
        .bind(policy.token_ttl_seconds as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ============================================================================
// Issuers
// ============================================================================

pub struct PgIssuerRegistry {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct IssuerRow {
    did: String,
    public_key: String,
    enabled: bool,
    trust_tier: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<IssuerRow> for Issuer {
    fn from(row: IssuerRow) -> Self {
        Issuer {
            did: row.did,
            public_key: row.public_key,
            enabled: row.enabled,
            trust_tier: row.trust_tier,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PgIssuerRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS issuers (
                did TEXT PRIMARY KEY,
                public_key TEXT NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                trust_tier INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl IssuerRegistry for PgIssuerRegistry {
    async fn get(&self, did: &str) -> Result<Option<Issuer>> {
        let row = sqlx::query_as::<_, IssuerRow>(
            "SELECT did, public_key, enabled, trust_tier, created_at, updated_at \
             FROM issuers WHERE did = $1",
        )
        .bind(did)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Issuer::from))
    }

    async fn list(&self) -> Result<Vec<Issuer>> {
        let rows = sqlx::query_as::<_, IssuerRow>(
            "SELECT did, public_key, enabled, trust_tier, created_at, updated_at \
             FROM issuers ORDER BY did",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Issuer::from).collect())
    }

    async fn upsert(&self, issuer: &Issuer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO issuers (did, public_key, enabled, trust_tier, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (did) DO UPDATE SET
                public_key = EXCLUDED.public_key,
                enabled = EXCLUDED.enabled,
                trust_tier = EXCLUDED.trust_tier,
                updated_at = NOW()
            "#,
        )
        .bind(&issuer.did)
        .bind(&issuer.public_key)
        .bind(issuer.enabled)
        .bind(issuer.trust_tier)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ============================================================================
// Revocation lists
// ============================================================================

pub struct PgRevocationStore {
    pool: PgPool,
}

impl PgRevocationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS revocation_lists (
                list_id TEXT PRIMARY KEY,
                revoked TEXT[] NOT NULL DEFAULT '{}',
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn get(&self, list_id: &str) -> Result<Option<RevocationList>> {
        let row = sqlx::query_as::<_, (String, Vec<String>, DateTime<Utc>)>(
            "SELECT list_id, revoked, updated_at FROM revocation_lists WHERE list_id = $1",
        )
        .bind(list_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(list_id, revoked, updated_at)| RevocationList {
            list_id,
            revoked,
            updated_at,
        }))
    }

    async fn upsert(&self, list: &RevocationList) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO revocation_lists (list_id, revoked, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (list_id) DO UPDATE SET
                revoked = EXCLUDED.revoked,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&list.list_id)
        .bind(&list.revoked)
        .bind(list.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
