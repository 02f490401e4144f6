//! Shared fixtures for integration tests
//!
//! Builds the full router against in-memory stores and an in-memory KV,
//! plus helpers for test wallets, credential minting, and driving the
//! router without a socket.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use serde_json::{json, Value};
use tower::ServiceExt;

use did_gateway::api::handlers::health::HealthChecker;
use did_gateway::auth::canonical_challenge;
use did_gateway::crypto::{encode_did_key, encode_public_key};
use did_gateway::domain::{Issuer, Policy, RateLimitRule};
use did_gateway::infra::{
    IssuerRegistry, KvStore, MemoryIssuerRegistry, MemoryKv, MemoryPolicyStore,
    MemoryRevocationStore, PolicyStore,
};
use did_gateway::server::{build_state, AppState, Config};

pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const ISSUER_DID: &str = "did:key:zTestIssuer";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub policies: Arc<MemoryPolicyStore>,
    pub issuers: Arc<MemoryIssuerRegistry>,
    pub issuer_key: SigningKey,
}

/// A client-side DID key pair
pub struct Wallet {
    pub key: SigningKey,
    pub did: String,
}

impl Wallet {
    pub fn generate() -> Self {
        let key = SigningKey::generate(&mut OsRng);
        let did = encode_did_key(&key.verifying_key().to_bytes());
        Self { key, did }
    }

    pub fn sign_challenge(&self, challenge: &str) -> String {
        URL_SAFE_NO_PAD.encode(self.key.sign(challenge.as_bytes()).to_bytes())
    }
}

fn test_config(upstream_url: String) -> Config {
    Config {
        gateway_addr: "127.0.0.1:0".parse().unwrap(),
        postgres_dsn: String::new(),
        redis_addr: String::new(),
        upstream_url,
        token_issuer: "did-gateway-test".to_string(),
        token_secret: "integration-test-secret-integration".to_string(),
        admin_token: Some(ADMIN_TOKEN.to_string()),
        challenge_audience: "did-gateway-test".to_string(),
        challenge_domain: "gateway.test".to_string(),
        ion_resolver_url: None,
        max_db_connections: 1,
    }
}

/// Build the app against in-memory backends. A trusted issuer with tier 3
/// is pre-registered.
pub async fn spawn_app() -> TestApp {
    spawn_app_with_upstream("http://127.0.0.1:9".to_string()).await
}

pub async fn spawn_app_with_upstream(upstream_url: String) -> TestApp {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let policies = Arc::new(MemoryPolicyStore::new());
    let issuers = Arc::new(MemoryIssuerRegistry::new());
    let revocations = Arc::new(MemoryRevocationStore::new());

    let issuer_key = SigningKey::generate(&mut OsRng);
    issuers
        .upsert(&Issuer {
            did: ISSUER_DID.to_string(),
            public_key: encode_public_key(&issuer_key.verifying_key().to_bytes()),
            enabled: true,
            trust_tier: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    let state = build_state(
        test_config(upstream_url),
        policies.clone(),
        issuers.clone(),
        revocations,
        kv,
        Arc::new(HealthChecker::new()),
    )
    .unwrap();

    let router = did_gateway::server::build_router(state.clone()).unwrap();

    TestApp {
        router,
        state,
        policies,
        issuers,
        issuer_key,
    }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> Response {
        self.request(Method::GET, uri, None, &[]).await
    }

    pub async fn get_bearer(&self, uri: &str, token: &str) -> Response {
        let auth = format!("Bearer {token}");
        self.request(
            Method::GET,
            uri,
            None,
            &[(header::AUTHORIZATION.as_str(), auth.as_str())],
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> Response {
        self.request(Method::POST, uri, Some(body.to_string()), &[]).await
    }

    pub async fn put_admin(&self, uri: &str, body: &Value) -> Response {
        self.request(
            Method::PUT,
            uri,
            Some(body.to_string()),
            &[("x-admin-token", ADMIN_TOKEN)],
        )
        .await
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<String>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Run the challenge/verify dance for `wallet` and return the token.
    pub async fn authenticate(&self, wallet: &Wallet) -> String {
        self.authenticate_with(wallet, None, None).await.unwrap()
    }

    pub async fn authenticate_with(
        &self,
        wallet: &Wallet,
        scopes: Option<Vec<&str>>,
        credential: Option<String>,
    ) -> Result<String, Value> {
        let response = self
            .get(&format!("/v1/auth/challenge?did={}", wallet.did))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let challenge = body_json(response).await;
        let challenge_str = challenge["challenge"].as_str().unwrap().to_string();

        let mut body = json!({
            "did": wallet.did,
            "challenge": challenge_str,
            "signature": wallet.sign_challenge(&challenge_str),
        });
        if let Some(scopes) = scopes {
            body["scopes"] = json!(scopes);
        }
        if let Some(credential) = credential {
            body["credential"] = json!(credential);
        }

        let response = self.post_json("/v1/auth/verify", &body).await;
        let status = response.status();
        let payload = body_json(response).await;
        if status == StatusCode::OK {
            Ok(payload["access_token"].as_str().unwrap().to_string())
        } else {
            Err(payload)
        }
    }

    /// Mint a JWT-VC signed by the pre-registered trusted issuer.
    pub fn mint_credential(&self, subject: &str, types: &[&str], jti: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = json!({
            "iss": ISSUER_DID,
            "sub": subject,
            "iat": now - 30,
            "exp": now + 3600,
            "jti": jti,
            "vc": {"type": types},
        });
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": "EdDSA"}).to_string());
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let input = format!("{header}.{payload}");
        let sig = URL_SAFE_NO_PAD.encode(self.issuer_key.sign(input.as_bytes()).to_bytes());
        format!("{input}.{sig}")
    }

    /// Install a policy directly in the store (bypasses the admin API)
    /// and drop the cached policy table.
    pub async fn install_policy(&self, policy: Policy) {
        self.policies.upsert(&policy).await.unwrap();
        self.state.policy_engine.invalidate().await.unwrap();
    }
}

pub fn basic_policy(id: &str, prefix: &str) -> Policy {
    Policy {
        id: id.to_string(),
        name: id.to_string(),
        route_prefix: prefix.to_string(),
        required_scopes: vec!["basic".to_string()],
        required_vc_types: vec![],
        allowed_issuers: vec![],
        min_trust_tier: None,
        rate_limit: None,
        token_ttl_seconds: 300,
    }
}

pub fn rate_limited_policy(id: &str, prefix: &str, max_requests: u64) -> Policy {
    Policy {
        rate_limit: Some(RateLimitRule {
            window_seconds: 60,
            max_requests,
        }),
        ..basic_policy(id, prefix)
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Spin up a local echo upstream that reports what it received.
pub async fn spawn_upstream() -> SocketAddr {
    use axum::extract::Request as AxumRequest;
    use axum::routing::any;

    async fn echo(req: AxumRequest) -> axum::Json<Value> {
        let subject = req
            .headers()
            .get("x-did-subject")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let has_authorization = req.headers().contains_key(header::AUTHORIZATION);
        axum::Json(json!({
            "path": req.uri().path(),
            "subject": subject,
            "has_authorization": has_authorization,
        }))
    }

    let app = Router::new()
        .route("/", any(echo))
        .route("/*path", any(echo));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Unwrap the canonical challenge helper for tests that need to rebuild it.
pub fn rebuild_challenge(did: &str, nonce: &str, aud: &str, domain: &str, exp: i64) -> String {
    canonical_challenge(did, nonce, aud, domain, exp)
}
