//! Candidate harvesting from a public proxy listing
//!
//! The listing page is itself fetched through the pool, rotating and
//! quarantining on failure. A failed harvest yields an empty list so the
//! refresh cycle carries on.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{FetchError, Result};
use crate::models::ProxyEndpoint;
use crate::proxy::pool::ProxyPool;
use crate::proxy::transport::HttpTransport;

const ROW_SELECTOR: &str = "table.table.table-striped.table-bordered tbody tr";
const CELL_SELECTOR: &str = "td";

// Column layout of the listing table
const COL_HOST: usize = 0;
const COL_PORT: usize = 1;
const COL_GOOGLE: usize = 5;
const COL_HTTPS: usize = 6;
const MIN_COLUMNS: usize = 8;

/// Proxy source configuration
#[derive(Debug, Clone)]
pub struct ProxySourceConfig {
    /// Listing page URL
    pub listing_url: String,
    /// Attempts before the harvest gives up
    pub max_attempts: u32,
    /// Timeout for each attempt
    pub timeout: Duration,
}

impl Default for ProxySourceConfig {
    fn default() -> Self {
        Self {
            listing_url: "https://free-proxy-list.net/".to_string(),
            max_attempts: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Harvests candidate endpoints from the listing page
pub struct ProxySource {
    pool: Arc<ProxyPool>,
    transport: Arc<dyn HttpTransport>,
    config: ProxySourceConfig,
}

impl ProxySource {
    pub fn new(
        pool: Arc<ProxyPool>,
        transport: Arc<dyn HttpTransport>,
        config: ProxySourceConfig,
    ) -> Self {
        Self {
            pool,
            transport,
            config,
        }
    }

    /// Fetch and parse the listing; never fails, an unusable harvest is empty
    #[instrument(skip(self, cancel), fields(url = %self.config.listing_url))]
    pub async fn fetch_candidates(&self, cancel: &CancellationToken) -> Vec<ProxyEndpoint> {
        let Some(html) = self.fetch_listing(cancel).await else {
            error!(
                "Failed to fetch proxy listing after {} attempts",
                self.config.max_attempts
            );
            return Vec::new();
        };

        match parse_listing(&html) {
            Ok(candidates) => {
                info!(count = candidates.len(), "Harvested HTTPS-capable proxies");
                candidates
            }
            Err(e) => {
                error!("Failed to parse proxy listing: {}", e);
                Vec::new()
            }
        }
    }

    async fn fetch_listing(&self, cancel: &CancellationToken) -> Option<String> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return None;
            }

            let endpoint = self.pool.next_candidate();
            debug!(
                attempt,
                max_attempts,
                proxy = %endpoint.as_ref().map(|e| e.to_string()).unwrap_or_else(|| "none".into()),
                "Fetching proxy listing"
            );

            let result = self
                .transport
                .get(
                    &self.config.listing_url,
                    endpoint.as_ref(),
                    self.config.timeout,
                    cancel,
                )
                .await;

            let cause = match result {
                Ok(response) if response.is_success() => return Some(response.body),
                Ok(response) => FetchError::UnexpectedStatus {
                    status: response.status,
                },
                Err(FetchError::Cancelled) => return None,
                Err(e) => e,
            };

            warn!(attempt, max_attempts, error = %cause, "Listing attempt failed");
            if let Some(endpoint) = &endpoint {
                self.pool.mark_bad(endpoint);
            }
        }

        None
    }
}

/// Extract HTTPS-capable endpoints from the listing table
pub fn parse_listing(html: &str) -> Result<Vec<ProxyEndpoint>> {
    let rows = selector(ROW_SELECTOR)?;
    let cells = selector(CELL_SELECTOR)?;
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for row in document.select(&rows) {
        let columns: Vec<String> = row.select(&cells).map(cell_text).collect();
        if columns.len() < MIN_COLUMNS {
            continue;
        }

        let Ok(port) = columns[COL_PORT].parse::<u16>() else {
            debug!(row = ?columns, "Skipping listing row with invalid port");
            continue;
        };
        let host = &columns[COL_HOST];
        if host.is_empty() || port == 0 {
            continue;
        }

        let supports_https = is_affirmative(&columns[COL_HTTPS]);
        let supports_google = is_affirmative(&columns[COL_GOOGLE]);
        if !supports_https {
            continue;
        }

        let endpoint =
            ProxyEndpoint::new(host.as_str(), port).with_capabilities(supports_https, supports_google);
        if seen.insert(endpoint.clone()) {
            candidates.push(endpoint);
        }
    }

    Ok(candidates)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| FetchError::Parse(anyhow::anyhow!("invalid selector {:?}: {:?}", css, e)))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn is_affirmative(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::pool::PoolConfig;
    use crate::proxy::testing::{endpoints, Reply, ScriptedTransport};

    fn row(host: &str, port: &str, google: &str, https: &str) -> String {
        format!(
            "<tr><td>{}</td><td>{}</td><td>US</td><td>United States</td>\
             <td>anonymous</td><td>{}</td><td>{}</td><td>1 min ago</td></tr>",
            host, port, google, https
        )
    }

    fn listing(rows: &[String]) -> String {
        format!(
            "<html><body>\
             <table class=\"table table-striped table-bordered\">\
             <thead><tr><th>IP Address</th><th>Port</th></tr></thead>\
             <tbody>{}</tbody></table></body></html>",
            rows.concat()
        )
    }

    fn sample_listing() -> String {
        listing(&[
            row("1.1.1.1", "80", "no", "no"),
            row("2.2.2.2", "8080", "yes", "yes"),
            row("3.3.3.3", "3128", "no", "no"),
            row("4.4.4.4", "443", "no", "Yes"),
            row("5.5.5.5", "8000", "yes", "no"),
        ])
    }

    #[test]
    fn test_parse_listing_filters_https() {
        let candidates = parse_listing(&sample_listing()).unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].host, "2.2.2.2");
        assert_eq!(candidates[0].port, 8080);
        assert!(candidates[0].supports_https);
        assert!(candidates[0].supports_google);
        assert_eq!(candidates[1].host, "4.4.4.4");
        assert_eq!(candidates[1].port, 443);
        assert!(!candidates[1].supports_google);
    }

    #[test]
    fn test_parse_listing_skips_malformed_rows() {
        let html = listing(&[
            "<tr><td>9.9.9.9</td><td>80</td></tr>".to_string(),
            row("6.6.6.6", "notaport", "no", "yes"),
            row("7.7.7.7", "8080", "no", "yes"),
            row("7.7.7.7", "8080", "yes", "yes"),
        ]);

        let candidates = parse_listing(&html).unwrap();
        assert_eq!(candidates, vec![ProxyEndpoint::new("7.7.7.7", 8080)]);
    }

    #[test]
    fn test_parse_listing_without_table() {
        let candidates = parse_listing("<html><body><p>maintenance</p></body></html>").unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_candidates_direct_when_pool_empty() {
        let pool = Arc::new(ProxyPool::default());
        let transport = Arc::new(ScriptedTransport::sequence(vec![Reply::ok(&sample_listing())]));
        let source = ProxySource::new(pool, transport.clone(), ProxySourceConfig::default());

        let candidates = source.fetch_candidates(&CancellationToken::new()).await;

        assert_eq!(candidates.len(), 2);
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].via.is_none());
        assert_eq!(calls[0].url, "https://free-proxy-list.net/");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_candidates_rotates_and_quarantines() {
        let egress = endpoints(3);
        let pool = Arc::new(ProxyPool::with_endpoints(PoolConfig::default(), egress.clone()));
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            Reply::status(503),
            Reply::Refused,
            Reply::ok(&sample_listing()),
        ]));
        let source = ProxySource::new(pool.clone(), transport.clone(), ProxySourceConfig::default());

        let candidates = source.fetch_candidates(&CancellationToken::new()).await;

        assert_eq!(candidates.len(), 2);
        let used: Vec<_> = transport.calls().into_iter().map(|c| c.via).collect();
        assert_eq!(
            used,
            vec![
                Some(egress[0].clone()),
                Some(egress[1].clone()),
                Some(egress[2].clone())
            ]
        );
        assert_eq!(pool.available_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_candidates_total_failure_is_empty() {
        let pool = Arc::new(ProxyPool::with_endpoints(PoolConfig::default(), endpoints(5)));
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            Reply::Hang,
            Reply::status(403),
            Reply::Refused,
            Reply::ok(&sample_listing()),
        ]));
        let source = ProxySource::new(pool.clone(), transport.clone(), ProxySourceConfig::default());

        let candidates = source.fetch_candidates(&CancellationToken::new()).await;

        assert!(candidates.is_empty());
        assert_eq!(transport.calls().len(), 3);
        assert_eq!(pool.available_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_candidates_cancelled() {
        let pool = Arc::new(ProxyPool::default());
        let transport = Arc::new(ScriptedTransport::sequence(vec![Reply::ok(&sample_listing())]));
        let source = ProxySource::new(pool, transport.clone(), ProxySourceConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(source.fetch_candidates(&cancel).await.is_empty());
        assert!(transport.calls().is_empty());
    }
}
