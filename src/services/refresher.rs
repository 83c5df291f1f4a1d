//! Pool refresh service
//!
//! Repeats harvest -> validate -> install -> persist, sleeping between
//! cycles. A failed cycle is logged and the loop carries on; only
//! cancellation ends it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::{FetchError, Result};
use crate::proxy::pool::ProxyPool;
use crate::proxy::source::ProxySource;
use crate::proxy::validator::ProxyValidator;
use crate::repository::ProxySink;

/// Refresher configuration
#[derive(Debug, Clone)]
pub struct RefresherConfig {
    /// Sleep between cycles
    pub interval: Duration,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
        }
    }
}

/// Periodically replaces the pool with freshly validated proxies
pub struct PoolRefresher {
    pool: Arc<ProxyPool>,
    source: ProxySource,
    validator: ProxyValidator,
    sink: Arc<dyn ProxySink>,
    config: RefresherConfig,
}

impl PoolRefresher {
    pub fn new(
        pool: Arc<ProxyPool>,
        source: ProxySource,
        validator: ProxyValidator,
        sink: Arc<dyn ProxySink>,
        config: RefresherConfig,
    ) -> Self {
        Self {
            pool,
            source,
            validator,
            sink,
            config,
        }
    }

    /// Run on a spawned task that stops when `parent` (or the handle) is cancelled
    pub fn spawn(self, parent: &CancellationToken) -> RefresherHandle {
        let cancel = parent.child_token();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            self.run(token).await;
        });

        RefresherHandle { cancel, task }
    }

    /// Run until `cancel` fires
    #[instrument(skip(self, cancel))]
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting pool refresher with {}s interval",
            self.config.interval.as_secs()
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let cycle = AssertUnwindSafe(self.refresh_once(&cancel)).catch_unwind();
            match cycle.await {
                Ok(Ok(count)) => info!(working = count, "Proxy refresh cycle completed"),
                Ok(Err(FetchError::Cancelled)) => {
                    warn!("Proxy refresh cycle interrupted by shutdown")
                }
                Ok(Err(e)) => error!("Proxy refresh cycle failed: {}", e),
                Err(_) => error!("Proxy refresh cycle panicked"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("Pool refresher shutting down");
    }

    /// Run one cycle, returning the number of working proxies installed
    ///
    /// A cycle cut short by cancellation leaves the pool untouched.
    pub async fn refresh_once(&self, cancel: &CancellationToken) -> Result<usize> {
        info!("Starting proxy update cycle");

        let candidates = self.source.fetch_candidates(cancel).await;
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let working = self.validator.check_all(candidates, cancel).await;
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        self.pool.replace_all(working);
        let installed = self.pool.snapshot();
        self.sink.save(&installed).await?;

        Ok(installed.len())
    }
}

/// Owned handle to a spawned refresher
pub struct RefresherHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    /// Signal the refresher to stop at its next check point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait for the loop to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("Pool refresher task failed: {}", e);
        }
    }
}
