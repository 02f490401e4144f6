//! Authentication and authorization for the DID gateway
//!
//! The flow, end to end:
//!
//! 1. A client asks for a [`challenge`] bound to its DID. The nonce is
//!    single-use with a bounded lifetime.
//! 2. It signs the canonical challenge bytes with its DID key and posts
//!    them to verify. The [`pipeline`] consumes the nonce, resolves the
//!    DID, checks the signature, optionally verifies a JWT-VC, and mints
//!    a short-lived HMAC [`token`].
//! 3. Proxied requests present the bearer token; the [`policy`] engine
//!    and [`rate_limit`]er gate each call.

pub mod challenge;
pub mod pipeline;
pub mod policy;
pub mod rate_limit;
pub mod token;

pub use challenge::{canonical_challenge, parse_nonce, ChallengeConfig, ChallengeService};
pub use pipeline::{AuthPipeline, PipelineConfig, ProxyAuth};
pub use policy::PolicyEngine;
pub use rate_limit::RateLimiter;
pub use token::{TokenKey, TokenSigner};
