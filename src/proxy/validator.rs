//! Liveness validation for harvested candidates
//!
//! Probes fan out one task per candidate and are joined before returning.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::FetchError;
use crate::models::{ProbeOutcome, ProxyEndpoint};
use crate::proxy::transport::HttpTransport;

/// Validator configuration
#[derive(Debug, Clone)]
pub struct ProxyValidatorConfig {
    /// Stable, reachable URL each candidate must be able to GET
    pub probe_url: String,
    /// Timeout for each probe
    pub timeout: Duration,
    /// Cap on in-flight probes; `None` probes every candidate at once
    pub max_concurrency: Option<usize>,
}

impl Default for ProxyValidatorConfig {
    fn default() -> Self {
        Self {
            probe_url: "https://www.google.com".to_string(),
            timeout: Duration::from_secs(5),
            max_concurrency: None,
        }
    }
}

/// Concurrent liveness prober
pub struct ProxyValidator {
    transport: Arc<dyn HttpTransport>,
    config: ProxyValidatorConfig,
}

impl ProxyValidator {
    pub fn new(transport: Arc<dyn HttpTransport>, config: ProxyValidatorConfig) -> Self {
        Self { transport, config }
    }

    /// Candidates whose probe succeeded; order is not meaningful
    pub async fn check_all(
        &self,
        candidates: Vec<ProxyEndpoint>,
        cancel: &CancellationToken,
    ) -> Vec<ProxyEndpoint> {
        self.probe_all(candidates, cancel)
            .await
            .into_iter()
            .filter_map(|(endpoint, outcome)| outcome.is_working().then_some(endpoint))
            .collect()
    }

    /// Probe every candidate and report each outcome
    #[instrument(skip(self, candidates, cancel), fields(candidates = candidates.len()))]
    pub async fn probe_all(
        &self,
        candidates: Vec<ProxyEndpoint>,
        cancel: &CancellationToken,
    ) -> Vec<(ProxyEndpoint, ProbeOutcome)> {
        let total = candidates.len();
        let probed = AtomicUsize::new(0);

        let probes = candidates.into_iter().map(|endpoint| {
            let probed = &probed;
            async move {
                let outcome = self.probe(&endpoint, cancel).await;
                let done = probed.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(proxy = %endpoint, outcome = ?outcome, "Probed {} of {}", done, total);
                (endpoint, outcome)
            }
        });

        let results: Vec<(ProxyEndpoint, ProbeOutcome)> = match self.config.max_concurrency {
            Some(limit) => {
                futures::stream::iter(probes)
                    .buffer_unordered(limit.max(1))
                    .collect::<Vec<_>>()
                    .await
            }
            None => futures::future::join_all(probes).await,
        };

        let working = results.iter().filter(|(_, o)| o.is_working()).count();
        let inconclusive = results
            .iter()
            .filter(|(_, o)| matches!(o, ProbeOutcome::Inconclusive))
            .count();
        info!(total, working, inconclusive, "Validation complete");

        results
    }

    /// Probe a single candidate; never fails
    pub async fn probe(&self, endpoint: &ProxyEndpoint, cancel: &CancellationToken) -> ProbeOutcome {
        let request = self.transport.get(
            &self.config.probe_url,
            Some(endpoint),
            self.config.timeout,
            cancel,
        );

        match timeout(self.config.timeout, request).await {
            Ok(Ok(response)) if response.is_success() => ProbeOutcome::Working,
            Ok(Ok(response)) => ProbeOutcome::Failed(format!("status {}", response.status)),
            Ok(Err(FetchError::Cancelled)) => ProbeOutcome::Inconclusive,
            Ok(Err(e)) => ProbeOutcome::Failed(e.to_string()),
            Err(_) => ProbeOutcome::Failed(FetchError::Timeout.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::testing::{endpoints, Reply, ScriptedTransport};
    use std::collections::HashSet;

    #[tokio::test(start_paused = true)]
    async fn test_check_all_keeps_only_working() {
        let candidates = endpoints(3);
        let transport = Arc::new(ScriptedTransport::per_endpoint(vec![
            (candidates[0].clone(), Reply::status(200)),
            (candidates[1].clone(), Reply::status(500)),
            (candidates[2].clone(), Reply::Hang),
        ]));
        let validator = ProxyValidator::new(transport.clone(), ProxyValidatorConfig::default());

        let working = validator
            .check_all(candidates.clone(), &CancellationToken::new())
            .await;

        assert_eq!(working, vec![candidates[0].clone()]);
        let probed: HashSet<_> = transport.calls().into_iter().filter_map(|c| c.via).collect();
        assert_eq!(probed.len(), 3);
        assert!(transport
            .calls()
            .iter()
            .all(|c| c.url == "https://www.google.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_outcomes_carry_diagnostics() {
        let candidates = endpoints(3);
        let transport = Arc::new(ScriptedTransport::per_endpoint(vec![
            (candidates[0].clone(), Reply::Refused),
            (candidates[1].clone(), Reply::status(407)),
            (candidates[2].clone(), Reply::Hang),
        ]));
        let validator = ProxyValidator::new(transport, ProxyValidatorConfig::default());
        let cancel = CancellationToken::new();

        assert_eq!(
            validator.probe(&candidates[0], &cancel).await,
            ProbeOutcome::Failed("Transport error: connection refused".to_string())
        );
        assert_eq!(
            validator.probe(&candidates[1], &cancel).await,
            ProbeOutcome::Failed("status 407".to_string())
        );
        assert_eq!(
            validator.probe(&candidates[2], &cancel).await,
            ProbeOutcome::Failed("Operation timed out".to_string())
        );
    }

    #[tokio::test]
    async fn test_cancelled_probes_are_inconclusive() {
        let candidates = endpoints(2);
        let transport = Arc::new(ScriptedTransport::sequence(vec![]).with_fallback(Reply::Hang));
        let validator = ProxyValidator::new(transport, ProxyValidatorConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = validator.probe_all(candidates, &cancel).await;
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|(_, o)| *o == ProbeOutcome::Inconclusive));
    }

    #[tokio::test]
    async fn test_bounded_concurrency_same_membership() {
        let candidates = endpoints(6);
        let replies = candidates
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let reply = if i % 2 == 0 { Reply::status(200) } else { Reply::Refused };
                (e.clone(), reply)
            })
            .collect();
        let transport = Arc::new(ScriptedTransport::per_endpoint(replies));
        let config = ProxyValidatorConfig {
            max_concurrency: Some(2),
            ..Default::default()
        };
        let validator = ProxyValidator::new(transport, config);

        let working: HashSet<_> = validator
            .check_all(candidates.clone(), &CancellationToken::new())
            .await
            .into_iter()
            .collect();

        let expected: HashSet<_> = candidates.into_iter().step_by(2).collect();
        assert_eq!(working, expected);
    }

    #[tokio::test]
    async fn test_check_all_empty() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![]));
        let validator = ProxyValidator::new(transport, ProxyValidatorConfig::default());
        assert!(validator
            .check_all(Vec::new(), &CancellationToken::new())
            .await
            .is_empty());
    }
}
