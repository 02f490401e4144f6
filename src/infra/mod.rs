//! Infrastructure: errors, resilience primitives, caching, and stores

pub mod cache;
pub mod circuit_breaker;
mod error;
pub mod kv;
pub mod memory;
pub mod postgres;
pub mod retry;
mod traits;

pub use cache::{AdmissionCache, CacheStats, DidKeyCache, MultiLayerCache};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{GatewayError, Result};
pub use kv::{KvStore, MemoryKv, RedisKv};
pub use memory::{MemoryIssuerRegistry, MemoryPolicyStore, MemoryRevocationStore};
pub use postgres::{PgIssuerRegistry, PgPolicyStore, PgRevocationStore};
pub use retry::{classify, with_backoff, RetryConfig, RetryError};
pub use traits::{IssuerRegistry, PolicyStore, RevocationStore};

#[cfg(test)]
pub use kv::MockKvStore;
#[cfg(test)]
pub use traits::{MockIssuerRegistry, MockPolicyStore, MockRevocationStore};
