//! Persistence for the working proxy list

pub mod snapshot;

pub use snapshot::{ProxySink, SnapshotStore};
