//! HTTP server bootstrap
//!
//! Wires together configuration, the PostgreSQL trust stores, the Redis
//! KV, the resolution/verification services, and the Axum router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::health::{HealthChecker, PostgresChecker, RedisChecker};
use crate::auth::{
    AuthPipeline, ChallengeConfig, ChallengeService, PipelineConfig, PolicyEngine, RateLimiter,
    TokenSigner,
};
use crate::did::{DidResolver, DidResolverConfig};
use crate::infra::{
    DidKeyCache, IssuerRegistry, KvStore, MultiLayerCache, PgIssuerRegistry, PgPolicyStore,
    PgRevocationStore, PolicyStore, RedisKv, RevocationStore,
};
use crate::telemetry::{init_telemetry, TelemetryConfig};
use crate::vc::VcVerifier;

/// L1 cache sizing
const DID_CACHE_L1_ENTRIES: usize = 10_000;
const SHARED_CACHE_L1_ENTRIES: usize = 1_000;

/// Server configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (`GATEWAY_ADDR`)
    pub gateway_addr: SocketAddr,
    /// PostgreSQL DSN (`POSTGRES_DSN`)
    pub postgres_dsn: String,
    /// Redis address (`REDIS_ADDR`)
    pub redis_addr: String,
    /// Base URL requests are proxied to (`UPSTREAM_URL`)
    pub upstream_url: String,
    /// `iss` claim for minted tokens (`TOKEN_ISSUER`)
    pub token_issuer: String,
    /// Bare secret or JSON key list (`TOKEN_SECRET`)
    pub token_secret: String,
    /// Admin surface token (`ADMIN_TOKEN`); unset disables admin
    pub admin_token: Option<String>,
    /// Challenge audience (`CHALLENGE_AUDIENCE`)
    pub challenge_audience: String,
    /// Challenge domain (`CHALLENGE_DOMAIN`)
    pub challenge_domain: String,
    /// ION resolver base URL (`ION_RESOLVER_URL`)
    pub ion_resolver_url: Option<String>,
    /// Maximum database connections (`MAX_DB_CONNECTIONS`)
    pub max_db_connections: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let gateway_addr: SocketAddr = std::env::var("GATEWAY_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid GATEWAY_ADDR: {e}"))?;

        let token_secret = std::env::var("TOKEN_SECRET")
            .map_err(|_| anyhow::anyhow!("TOKEN_SECRET must be set"))?;

        Ok(Self {
            gateway_addr,
            postgres_dsn: std::env::var("POSTGRES_DSN")
                .unwrap_or_else(|_| "postgres://localhost/did_gateway".to_string()),
            redis_addr: std::env::var("REDIS_ADDR")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            upstream_url: std::env::var("UPSTREAM_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string()),
            token_issuer: std::env::var("TOKEN_ISSUER")
                .unwrap_or_else(|_| "did-gateway".to_string()),
            token_secret,
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
            challenge_audience: std::env::var("CHALLENGE_AUDIENCE")
                .unwrap_or_else(|_| "did-gateway".to_string()),
            challenge_domain: std::env::var("CHALLENGE_DOMAIN")
                .unwrap_or_else(|_| "localhost".to_string()),
            ion_resolver_url: std::env::var("ION_RESOLVER_URL").ok(),
            max_db_connections: std::env::var("MAX_DB_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AuthPipeline>,
    pub policy_engine: Arc<PolicyEngine>,
    pub policies: Arc<dyn PolicyStore>,
    pub issuers: Arc<dyn IssuerRegistry>,
    pub revocations: Arc<dyn RevocationStore>,
    pub shared_cache: Arc<MultiLayerCache>,
    pub resolver: Arc<DidResolver>,
    pub proxy_client: reqwest::Client,
    pub health: Arc<HealthChecker>,
    pub config: Arc<Config>,
}

/// Start the gateway.
pub async fn run() -> anyhow::Result<()> {
    init_telemetry(&TelemetryConfig::from_env())
        .map_err(|e| anyhow::anyhow!("telemetry init: {e}"))?;

    let config = Config::from_env()?;
    info!("starting did-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("  listen address: {}", config.gateway_addr);
    info!("  upstream: {}", config.upstream_url);
    if config.admin_token.is_none() {
        info!("  admin surface disabled (ADMIN_TOKEN unset)");
    }

    info!("connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(&config.postgres_dsn)
        .await?;

    let policies = Arc::new(PgPolicyStore::new(pool.clone()));
    let issuers = Arc::new(PgIssuerRegistry::new(pool.clone()));
    let revocations = Arc::new(PgRevocationStore::new(pool.clone()));
    policies.initialize().await?;
    issuers.initialize().await?;
    revocations.initialize().await?;
    info!("trust stores ready");

    info!("connecting to Redis...");
    let redis = RedisKv::connect(&config.redis_addr).await?;
    let kv: Arc<dyn KvStore> = Arc::new(redis.clone());

    let mut health = HealthChecker::new();
    health.register(Arc::new(PostgresChecker::new(pool)));
    health.register(Arc::new(RedisChecker::new(redis)));

    let state = build_state(
        config,
        policies,
        issuers,
        revocations,
        kv,
        Arc::new(health),
    )?;

    let addr = state.config.gateway_addr;
    let app = build_router(state)?;

    info!("did-gateway listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble the shared state from its backing stores. Split out so tests
/// can run the full router against in-memory implementations.
pub fn build_state(
    config: Config,
    policies: Arc<dyn PolicyStore>,
    issuers: Arc<dyn IssuerRegistry>,
    revocations: Arc<dyn RevocationStore>,
    kv: Arc<dyn KvStore>,
    health: Arc<HealthChecker>,
) -> anyhow::Result<AppState> {
    let did_cache = Arc::new(DidKeyCache::new(DID_CACHE_L1_ENTRIES, kv.clone()));
    let shared_cache = Arc::new(MultiLayerCache::new(SHARED_CACHE_L1_ENTRIES, kv.clone()));

    let mut resolver_config = DidResolverConfig::default();
    if let Some(url) = &config.ion_resolver_url {
        resolver_config.ion_resolver_url = url.clone();
    }
    let resolver = Arc::new(
        DidResolver::new(did_cache, resolver_config)
            .map_err(|e| anyhow::anyhow!("resolver init: {e}"))?,
    );

    let policy_engine = Arc::new(PolicyEngine::new(policies.clone(), shared_cache.clone()));
    let token_signer = TokenSigner::from_secret_config(&config.token_secret)
        .map_err(|e| anyhow::anyhow!("token signer init: {e}"))?;

    let pipeline = Arc::new(AuthPipeline::new(
        ChallengeService::new(
            kv.clone(),
            ChallengeConfig {
                audience: config.challenge_audience.clone(),
                domain: config.challenge_domain.clone(),
                ..ChallengeConfig::default()
            },
        ),
        resolver.clone(),
        VcVerifier::new(issuers.clone(), revocations.clone(), shared_cache.clone()),
        policy_engine.clone(),
        token_signer,
        RateLimiter::new(kv),
        PipelineConfig {
            token_issuer: config.token_issuer.clone(),
            ..PipelineConfig::default()
        },
    ));

    let proxy_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| anyhow::anyhow!("proxy client init: {e}"))?;

    Ok(AppState {
        pipeline,
        policy_engine,
        policies,
        issuers,
        revocations,
        shared_cache,
        resolver,
        proxy_client,
        health,
        config: Arc::new(config),
    })
}

/// Build the router with tracing and optional CORS layers applied.
pub fn build_router(state: AppState) -> anyhow::Result<axum::Router> {
    let mut router = crate::api::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if let Some(cors) = cors_layer_from_env()? {
        router = router.layer(cors);
    }

    Ok(router)
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    ))
}
