//! Rotating proxy pool with time-based quarantine
//!
//! Every operation runs under one mutex, so callers never observe a
//! half-replaced pool or a cursor pointing past the end of the entry list.

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::ProxyEndpoint;

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How long a failing endpoint is skipped by selection
    pub quarantine: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            quarantine: Duration::from_secs(5 * 60),
        }
    }
}

/// Outcome of a selection scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Endpoint(ProxyEndpoint),
    /// The pool holds no endpoints at all
    Empty,
    /// Every endpoint is currently quarantined
    Exhausted,
}

impl Selection {
    pub fn into_endpoint(self) -> Option<ProxyEndpoint> {
        match self {
            Selection::Endpoint(endpoint) => Some(endpoint),
            Selection::Empty | Selection::Exhausted => None,
        }
    }
}

#[derive(Debug)]
struct PoolEntry {
    endpoint: ProxyEndpoint,
    quarantined_until: Option<Instant>,
}

impl PoolEntry {
    fn new(endpoint: ProxyEndpoint) -> Self {
        Self {
            endpoint,
            quarantined_until: None,
        }
    }

    fn is_eligible(&self, now: Instant) -> bool {
        self.quarantined_until.map_or(true, |until| until <= now)
    }
}

#[derive(Debug, Default)]
struct PoolState {
    entries: Vec<PoolEntry>,
    cursor: usize,
}

/// Ordered set of proxy endpoints with round-robin selection
#[derive(Debug)]
pub struct ProxyPool {
    state: Mutex<PoolState>,
    config: PoolConfig,
}

impl ProxyPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            config,
        }
    }

    /// Create a pool pre-populated with `endpoints` (deduplicated)
    pub fn with_endpoints(config: PoolConfig, endpoints: Vec<ProxyEndpoint>) -> Self {
        let pool = Self::new(config);
        pool.replace_all(endpoints);
        pool
    }

    /// Next eligible endpoint, or `None` when the pool is empty or fully quarantined
    pub fn next_candidate(&self) -> Option<ProxyEndpoint> {
        self.select().into_endpoint()
    }

    /// Scan forward from the cursor, wrapping once, for an endpoint that is not quarantined
    pub fn select(&self) -> Selection {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let len = state.entries.len();
        if len == 0 {
            return Selection::Empty;
        }

        let now = Instant::now();
        for offset in 0..len {
            let idx = (state.cursor + offset) % len;
            let entry = &mut state.entries[idx];
            if entry.is_eligible(now) {
                entry.quarantined_until = None;
                state.cursor = (idx + 1) % len;
                return Selection::Endpoint(entry.endpoint.clone());
            }
        }

        Selection::Exhausted
    }

    /// Quarantine `endpoint` for the configured window, starting now
    ///
    /// Returns false if the endpoint is not (or no longer) in the pool.
    pub fn mark_bad(&self, endpoint: &ProxyEndpoint) -> bool {
        let mut state = self.state.lock();
        let until = Instant::now() + self.config.quarantine;

        match state.entries.iter_mut().find(|e| &e.endpoint == endpoint) {
            Some(entry) => {
                entry.quarantined_until = Some(until);
                info!(
                    proxy = %endpoint,
                    quarantine_secs = self.config.quarantine.as_secs(),
                    "Quarantined proxy"
                );
                true
            }
            None => {
                debug!(proxy = %endpoint, "Ignoring mark_bad for proxy not in pool");
                false
            }
        }
    }

    /// Discard current contents and install `endpoints`, keeping first occurrences
    pub fn replace_all(&self, endpoints: Vec<ProxyEndpoint>) {
        let mut seen = HashSet::with_capacity(endpoints.len());
        let entries: Vec<PoolEntry> = endpoints
            .into_iter()
            .filter(|e| seen.insert(e.clone()))
            .map(PoolEntry::new)
            .collect();

        let mut state = self.state.lock();
        state.entries = entries;
        state.cursor = 0;
        info!(count = state.entries.len(), "Updated proxy pool");
    }

    /// Current endpoints in rotation order
    pub fn snapshot(&self) -> Vec<ProxyEndpoint> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|e| e.endpoint.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of endpoints not quarantined right now
    pub fn available_count(&self) -> usize {
        let now = Instant::now();
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| e.is_eligible(now))
            .count()
    }
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
