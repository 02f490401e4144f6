//! Admin surface tests: auth guard, policy/issuer/revocation writes,
//! and cache invalidation behavior

mod common;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::*;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde_json::json;

use did_gateway::crypto::encode_public_key;

#[tokio::test]
async fn admin_requires_token() {
    let app = spawn_app().await;

    // No token
    let response = app
        .request(Method::GET, "/v1/policies", None, &[])
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Wrong token
    let response = app
        .request(
            Method::GET,
            "/v1/policies",
            None,
            &[("x-admin-token", "wrong")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Right token
    let response = app
        .request(
            Method::GET,
            "/v1/policies",
            None,
            &[("x-admin-token", ADMIN_TOKEN)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn put_policy_roundtrip_and_listing() {
    let app = spawn_app().await;

    let response = app
        .put_admin(
            "/v1/policies/basic",
            &json!({
                "id": "ignored-the-path-wins",
                "name": "basic tier",
                "route_prefix": "/api/v1/basic",
                "required_scopes": ["basic"],
                "token_ttl_seconds": 600,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let saved = body_json(response).await;
    assert_eq!(saved["id"], "basic");

    let response = app
        .request(
            Method::GET,
            "/v1/policies",
            None,
            &[("x-admin-token", ADMIN_TOKEN)],
        )
        .await;
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["route_prefix"], "/api/v1/basic");
}

#[tokio::test]
async fn put_policy_validates_input() {
    let app = spawn_app().await;

    let response = app
        .put_admin(
            "/v1/policies/bad",
            &json!({
                "id": "bad",
                "name": "bad",
                "route_prefix": "no-leading-slash",
                "required_scopes": [],
                "token_ttl_seconds": 300,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .put_admin(
            "/v1/policies/bad",
            &json!({
                "id": "bad",
                "name": "bad",
                "route_prefix": "/api",
                "required_scopes": [],
                "token_ttl_seconds": 0,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn policy_write_takes_effect_on_proxy_path() {
    let upstream = spawn_upstream().await;
    let app = spawn_app_with_upstream(format!("http://{upstream}")).await;

    let wallet = Wallet::generate();
    let token = app.authenticate(&wallet).await;

    // No policy yet: denied
    let response = app.get_bearer("/api/v1/reports", &token).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admin installs the route policy; the engine cache is invalidated
    let response = app
        .put_admin(
            "/v1/policies/reports",
            &json!({
                "id": "reports",
                "name": "reports",
                "route_prefix": "/api/v1/reports",
                "required_scopes": ["basic"],
                "token_ttl_seconds": 300,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get_bearer("/api/v1/reports", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn put_issuer_validates_and_upserts() {
    let app = spawn_app().await;
    let key = SigningKey::generate(&mut OsRng);
    let public_key = encode_public_key(&key.verifying_key().to_bytes());

    // Bad trust tier
    let response = app
        .put_admin(
            "/v1/issuers/did:key:zNewIssuer",
            &json!({"public_key": public_key, "enabled": true, "trust_tier": 9}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Bad key encoding
    let response = app
        .put_admin(
            "/v1/issuers/did:key:zNewIssuer",
            &json!({"public_key": "%%%", "enabled": true, "trust_tier": 2}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Valid
    let response = app
        .put_admin(
            "/v1/issuers/did:key:zNewIssuer",
            &json!({"public_key": public_key, "enabled": true, "trust_tier": 2}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let saved = body_json(response).await;
    assert_eq!(saved["did"], "did:key:zNewIssuer");
    assert_eq!(saved["trust_tier"], 2);

    let response = app
        .request(
            Method::GET,
            "/v1/issuers",
            None,
            &[("x-admin-token", ADMIN_TOKEN)],
        )
        .await;
    let listed = body_json(response).await;
    // The fixture issuer plus the new one
    assert_eq!(listed.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn disabling_issuer_blocks_new_credentials() {
    let app = spawn_app().await;
    let wallet = Wallet::generate();
    let credential = app.mint_credential(&wallet.did, &["VerifiableCredential"], "vc-d1");

    app.authenticate_with(&wallet, None, Some(credential.clone()))
        .await
        .unwrap();

    // Disable the fixture issuer through the admin surface
    let public_key = encode_public_key(&app.issuer_key.verifying_key().to_bytes());
    let response = app
        .put_admin(
            &format!("/v1/issuers/{ISSUER_DID}"),
            &json!({"public_key": public_key, "enabled": false, "trust_tier": 3}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let err = app
        .authenticate_with(&wallet, None, Some(credential))
        .await
        .unwrap_err();
    assert_eq!(err["error"], "invalid_auth");
}

#[tokio::test]
async fn put_revocation_sets_list_id_from_path() {
    let app = spawn_app().await;

    let response = app
        .put_admin(
            "/v1/revocations/tenant-a",
            &json!({
                "listId": "something-else",
                "revoked": ["j1", "j2"],
                "updatedAt": Utc::now().to_rfc3339(),
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let saved = body_json(response).await;
    assert_eq!(saved["listId"], "tenant-a");
    assert_eq!(saved["revoked"].as_array().unwrap().len(), 2);
}
