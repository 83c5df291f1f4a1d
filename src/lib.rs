//! Rota Fetch - resilient fetching over a rotating proxy pool
//!
//! ## Features
//!
//! - Round-robin proxy pool with automatic 5 minute quarantine of failing proxies
//! - Proxy harvesting from a public listing, itself fetched through the pool
//! - Concurrent liveness validation of harvested candidates
//! - Background refresh cycle with snapshot persistence
//! - Retry-bounded target fetching with fixed backoff

pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod repository;
pub mod services;

pub use config::Config;
pub use error::{FetchError, Result};
