//! DID Gateway
//!
//! Authenticating reverse proxy that gates an upstream HTTP API with
//! decentralized identifiers and verifiable credentials instead of
//! passwords. A client proves possession of its DID key via a single-use
//! challenge, optionally presents a JWT-VC for extra scopes, and receives
//! a short-lived bearer token the proxy enforces per-route policy and
//! rate limits against.
//!
//! ## Modules
//!
//! - [`domain`] - DIDs, policies, issuers, claims, wire models
//! - [`crypto`] - did:key codec, key encodings, signature checks
//! - [`infra`] - errors, circuit breaker, retry, KV, caches, stores
//! - [`did`] - DID Document parsing and the cached resolver
//! - [`vc`] - JWT-VC verification
//! - [`auth`] - challenge, token, policy, rate limit, and the pipeline
//! - [`api`] - Axum routes, handlers, error envelope
//! - [`telemetry`] - tracing and OTLP export
//! - [`server`] - config, state wiring, startup

pub mod api;
pub mod auth;
pub mod crypto;
pub mod did;
pub mod domain;
pub mod infra;
pub mod server;
pub mod telemetry;
pub mod vc;

pub use domain::{AccessTokenClaims, Did, DidMethod, Issuer, Policy, RevocationList};
pub use infra::{GatewayError, Result};
