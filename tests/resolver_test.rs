//! Resolver integration tests: network dispatch, caching, and the
//! circuit breaker fail-fast behavior

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use did_gateway::crypto::encode_public_key;
use did_gateway::did::{DidResolver, DidResolverConfig};
use did_gateway::domain::Did;
use did_gateway::infra::{DidKeyCache, GatewayError, MemoryKv};

fn resolver_with(config: DidResolverConfig) -> (DidResolver, Arc<DidKeyCache>) {
    let cache = Arc::new(DidKeyCache::new(64, Arc::new(MemoryKv::new())));
    (DidResolver::new(cache.clone(), config).unwrap(), cache)
}

/// Serve `/identifiers/:did` the way an ION resolver does.
async fn spawn_ion_resolver(key: [u8; 32]) -> std::net::SocketAddr {
    let x = encode_public_key(&key);
    let app = Router::new().route(
        "/identifiers/:did",
        get(move |axum::extract::Path(did): axum::extract::Path<String>| {
            let x = x.clone();
            async move {
                Json::<Value>(json!({
                    "id": did,
                    "verificationMethod": [{
                        "id": format!("{did}#key-1"),
                        "type": "JsonWebKey2020",
                        "publicKeyJwk": {"kty": "OKP", "crv": "Ed25519", "x": x},
                    }],
                }))
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn ion_resolution_fetches_and_caches() {
    let key = [11u8; 32];
    let addr = spawn_ion_resolver(key).await;

    let (resolver, cache) = resolver_with(DidResolverConfig {
        ion_resolver_url: format!("http://{addr}"),
        ..DidResolverConfig::default()
    });

    let did = Did::parse("did:ion:EiTestSubject123").unwrap();
    assert_eq!(resolver.resolve(&did).await.unwrap(), key);

    // Cached under the did: prefix
    assert_eq!(cache.get(did.as_str()).await.unwrap(), Some(key));

    // Second resolve is served from cache (works even if the server died)
    assert_eq!(resolver.resolve(&did).await.unwrap(), key);
}

#[tokio::test]
async fn web_breaker_opens_after_consecutive_failures() {
    // Nothing listens on port 1; every fetch is refused fast
    let (resolver, _cache) = resolver_with(DidResolverConfig::default());
    let did = Did::parse("did:web:127.0.0.1%3A1").unwrap();

    for i in 0..5 {
        let err = resolver.resolve(&did).await.unwrap_err();
        assert!(
            matches!(err, GatewayError::DidResolutionFailed(_)),
            "resolve {i} should exhaust retries, got {err}"
        );
    }

    // The breaker is open now: the next call short-circuits without
    // touching the network
    let start = Instant::now();
    let err = resolver.resolve(&did).await.unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen(_)), "got {err}");
    assert!(
        start.elapsed() < Duration::from_millis(200),
        "open breaker must fail fast, took {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn open_breaker_still_serves_cached_keys() {
    let (resolver, cache) = resolver_with(DidResolverConfig::default());

    // A previously resolved host sits in the cache
    let cached_key = [7u8; 32];
    cache
        .set("did:web:cached.test", &cached_key, Duration::from_secs(3600))
        .await
        .unwrap();

    // Open the breaker against an unreachable host
    let dead = Did::parse("did:web:127.0.0.1%3A1").unwrap();
    for _ in 0..5 {
        let _ = resolver.resolve(&dead).await;
    }
    assert!(matches!(
        resolver.resolve(&dead).await,
        Err(GatewayError::CircuitOpen(_))
    ));

    // The cache still answers for the healthy identity
    let cached = Did::parse("did:web:cached.test").unwrap();
    assert_eq!(resolver.resolve(&cached).await.unwrap(), cached_key);
}

#[tokio::test]
async fn ion_document_without_ed25519_key_fails_resolution() {
    let app = Router::new().route(
        "/identifiers/:did",
        get(|| async {
            Json::<Value>(json!({
                "id": "did:ion:EiX",
                "verificationMethod": [{
                    "id": "did:ion:EiX#key-1",
                    "type": "EcdsaSecp256k1VerificationKey2019",
                }],
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (resolver, _) = resolver_with(DidResolverConfig {
        ion_resolver_url: format!("http://{addr}"),
        ..DidResolverConfig::default()
    });

    let did = Did::parse("did:ion:EiX").unwrap();
    let err = resolver.resolve(&did).await.unwrap_err();
    assert!(matches!(err, GatewayError::DidResolutionFailed(_)));
}
