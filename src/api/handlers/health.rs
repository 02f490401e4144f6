//! Liveness and readiness
//!
//! `/healthz` answers "alive" unconditionally. `/readyz` runs every
//! registered checker in parallel; results land in per-slot positions,
//! not a shared map. Reports 200 only when all of them pass.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::server::AppState;

/// Ceiling for one readiness sweep
const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// A single dependency check
#[async_trait]
pub trait Checker: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> Result<(), String>;
}

/// Result of one checker run
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub name: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Aggregates dependency checkers for the readiness probe.
pub struct HealthChecker {
    checkers: Vec<Arc<dyn Checker>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            checkers: Vec::new(),
        }
    }

    pub fn register(&mut self, checker: Arc<dyn Checker>) {
        self.checkers.push(checker);
    }

    /// Run all checkers concurrently. Each task owns its result slot by
    /// ordinal, so collection needs no shared mutable map.
    pub async fn check_all(&self) -> Vec<ComponentStatus> {
        let futures = self.checkers.iter().map(|checker| {
            let checker = checker.clone();
            async move {
                let start = Instant::now();
                let outcome = tokio::time::timeout(CHECK_TIMEOUT, checker.check()).await;
                let latency_ms = start.elapsed().as_millis() as u64;

                let error = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e),
                    Err(_) => Some("check timed out".to_string()),
                };
                ComponentStatus {
                    name: checker.name().to_string(),
                    healthy: error.is_none(),
                    error,
                    latency_ms,
                }
            }
        });

        futures::future::join_all(futures).await
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Readiness payload
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub components: Vec<ComponentStatus>,
    pub circuit_breakers: Vec<BreakerStatus>,
}

#[derive(Debug, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: String,
}

/// `GET /healthz`: liveness, the process is up.
pub async fn healthz() -> &'static str {
    "alive"
}

/// `GET /readyz`: readiness, all dependencies answer.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let components = state.health.check_all().await;
    let circuit_breakers = state
        .resolver
        .breaker_states()
        .await
        .into_iter()
        .map(|(name, breaker_state)| BreakerStatus {
            name,
            state: breaker_state,
        })
        .collect();

    let all_healthy = components.iter().all(|c| c.healthy);
    let (status, code) = if all_healthy {
        ("ready", StatusCode::OK)
    } else {
        ("not ready", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        code,
        Json(ReadyResponse {
            status,
            components,
            circuit_breakers,
        }),
    )
}

// ============================================================================
// Checkers
// ============================================================================

/// Pings PostgreSQL through the pool.
pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Checker for PostgresChecker {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn check(&self) -> Result<(), String> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Pings the Redis-backed KV.
pub struct RedisChecker {
    kv: crate::infra::RedisKv,
}

impl RedisChecker {
    pub fn new(kv: crate::infra::RedisKv) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl Checker for RedisChecker {
    fn name(&self) -> &str {
        "redis"
    }

    async fn check(&self) -> Result<(), String> {
        self.kv.ping().await.map_err(|e| e.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticChecker {
        name: &'static str,
        result: Result<(), String>,
    }

    #[async_trait]
    impl Checker for StaticChecker {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self) -> Result<(), String> {
            self.result.clone()
        }
    }

    struct SlowChecker;

    #[async_trait]
    impl Checker for SlowChecker {
        fn name(&self) -> &str {
            "slow"
        }

        async fn check(&self) -> Result<(), String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_all_healthy() {
        let mut health = HealthChecker::new();
        health.register(Arc::new(StaticChecker {
            name: "a",
            result: Ok(()),
        }));
        health.register(Arc::new(StaticChecker {
            name: "b",
            result: Ok(()),
        }));

        let components = health.check_all().await;
        assert_eq!(components.len(), 2);
        assert!(components.iter().all(|c| c.healthy));
        // Slot order matches registration order
        assert_eq!(components[0].name, "a");
        assert_eq!(components[1].name, "b");
    }

    #[tokio::test]
    async fn test_failure_is_reported_per_component() {
        let mut health = HealthChecker::new();
        health.register(Arc::new(StaticChecker {
            name: "ok",
            result: Ok(()),
        }));
        health.register(Arc::new(StaticChecker {
            name: "down",
            result: Err("connection refused".into()),
        }));

        let components = health.check_all().await;
        assert!(components[0].healthy);
        assert!(!components[1].healthy);
        assert_eq!(components[1].error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_slow_checker_times_out() {
        let mut health = HealthChecker::new();
        health.register(Arc::new(SlowChecker));

        let start = Instant::now();
        let components = health.check_all().await;
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!components[0].healthy);
        assert_eq!(components[0].error.as_deref(), Some("check timed out"));
    }
}
