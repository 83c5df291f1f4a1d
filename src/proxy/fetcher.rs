//! Retry-bounded page fetching over the proxy pool
//!
//! Each call moves through Attempting -> Succeeded | Exhausted. A failing
//! attempt quarantines its endpoint, waits a fixed backoff and rotates to
//! the next candidate; the first 2xx body is handed to the parser.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{FetchError, Result};
use crate::models::{AttemptOutcome, FetchAttempt, ProxyEndpoint};
use crate::proxy::pool::ProxyPool;
use crate::proxy::transport::HttpTransport;

/// Turns a fetched document into a structured record
///
/// Errors are surfaced to the caller untouched as [`FetchError::Parse`].
pub trait DocumentParser: Send + Sync {
    type Output;

    fn parse(&self, url: &str, body: &str) -> anyhow::Result<Self::Output>;
}

impl<F, T> DocumentParser for F
where
    F: Fn(&str, &str) -> anyhow::Result<T> + Send + Sync,
{
    type Output = T;

    fn parse(&self, url: &str, body: &str) -> anyhow::Result<T> {
        self(url, body)
    }
}

/// Fetcher configuration
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Attempt budget per fetch
    pub max_attempts: u32,
    /// Timeout for each attempt
    pub timeout: Duration,
    /// Fixed wait between attempts
    pub backoff: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            timeout: Duration::from_secs(30),
            backoff: Duration::from_secs(2),
        }
    }
}

/// Fetches target pages, rotating through the pool on failure
pub struct ResilientFetcher {
    pool: Arc<ProxyPool>,
    transport: Arc<dyn HttpTransport>,
    config: FetcherConfig,
    attempt_sender: Option<broadcast::Sender<FetchAttempt>>,
}

impl ResilientFetcher {
    pub fn new(
        pool: Arc<ProxyPool>,
        transport: Arc<dyn HttpTransport>,
        config: FetcherConfig,
    ) -> Self {
        Self {
            pool,
            transport,
            config,
            attempt_sender: None,
        }
    }

    /// Publish every attempt record on `sender`
    pub fn with_attempt_sender(mut self, sender: broadcast::Sender<FetchAttempt>) -> Self {
        self.attempt_sender = Some(sender);
        self
    }

    /// Fetch `url` and parse the first successful body
    ///
    /// Fails with [`FetchError::Exhausted`] once the attempt budget is spent,
    /// [`FetchError::Parse`] if the parser rejects the body, or
    /// [`FetchError::Cancelled`] if `cancel` fires.
    #[instrument(skip(self, parser, cancel))]
    pub async fn fetch<P: DocumentParser>(
        &self,
        url: &str,
        parser: &P,
        cancel: &CancellationToken,
    ) -> Result<P::Output> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let endpoint = self.pool.next_candidate();
            debug!(
                attempt,
                max_attempts,
                proxy = %display_endpoint(endpoint.as_ref()),
                "Fetching target"
            );

            let started = Instant::now();
            let result = self
                .transport
                .get(url, endpoint.as_ref(), self.config.timeout, cancel)
                .await;
            let elapsed = started.elapsed();

            let cause = match result {
                Ok(response) if response.is_success() => {
                    self.record(
                        attempt,
                        url,
                        endpoint.as_ref(),
                        AttemptOutcome::Succeeded {
                            status: response.status,
                        },
                        elapsed,
                    );
                    info!(
                        attempt,
                        proxy = %display_endpoint(endpoint.as_ref()),
                        status = response.status,
                        "Fetched target"
                    );
                    return parser.parse(url, &response.body).map_err(FetchError::Parse);
                }
                Ok(response) => {
                    self.record(
                        attempt,
                        url,
                        endpoint.as_ref(),
                        AttemptOutcome::Rejected {
                            status: response.status,
                        },
                        elapsed,
                    );
                    FetchError::UnexpectedStatus {
                        status: response.status,
                    }
                }
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(e) => {
                    self.record(
                        attempt,
                        url,
                        endpoint.as_ref(),
                        AttemptOutcome::Failed {
                            error: e.to_string(),
                        },
                        elapsed,
                    );
                    e
                }
            };

            warn!(
                attempt,
                max_attempts,
                proxy = %display_endpoint(endpoint.as_ref()),
                error = %cause,
                "Fetch attempt failed"
            );

            if let Some(endpoint) = &endpoint {
                self.pool.mark_bad(endpoint);
            }

            if attempt >= max_attempts {
                error!(attempts = max_attempts, error = %cause, "Fetch attempts exhausted");
                return Err(FetchError::Exhausted {
                    attempts: max_attempts,
                    last_cause: Box::new(cause),
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(self.config.backoff) => {}
            }
        }
    }

    fn record(
        &self,
        attempt: u32,
        url: &str,
        endpoint: Option<&ProxyEndpoint>,
        outcome: AttemptOutcome,
        elapsed: Duration,
    ) {
        let Some(sender) = &self.attempt_sender else {
            return;
        };

        let record = FetchAttempt {
            attempt,
            url: url.to_string(),
            endpoint: endpoint.cloned(),
            outcome,
            response_time_ms: elapsed.as_millis() as u64,
            timestamp: chrono::Utc::now(),
        };
        // No receivers is fine
        let _ = sender.send(record);
    }
}

fn display_endpoint(endpoint: Option<&ProxyEndpoint>) -> String {
    endpoint
        .map(|e| e.to_string())
        .unwrap_or_else(|| "direct".to_string())
}
