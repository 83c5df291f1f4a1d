//! Proxy pool and everything that draws from it
//!
//! This module provides:
//! - The rotating pool with time-based quarantine
//! - Candidate harvesting from a public listing
//! - Concurrent liveness validation
//! - Retry-bounded fetching through the pool

pub mod fetcher;
pub mod pool;
pub mod source;
pub mod transport;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use fetcher::{DocumentParser, FetcherConfig, ResilientFetcher};
pub use pool::{PoolConfig, ProxyPool, Selection};
pub use source::{ProxySource, ProxySourceConfig};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
pub use validator::{ProxyValidator, ProxyValidatorConfig};
