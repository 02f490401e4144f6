//! DID resolution: document parsing and the cached multi-method resolver

pub mod document;
pub mod resolver;

pub use document::{DidDocument, PublicKeyJwk, VerificationMethod};
pub use resolver::{DidResolver, DidResolverConfig};
