//! Rota Fetch - Entry Point
//!
//! Fetches the target page through the proxy pool, optionally keeping the
//! pool fresh in the background until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Selector};
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use rota_fetch::config::LogConfig;
use rota_fetch::models::FetchAttempt;
use rota_fetch::proxy::{
    HttpTransport, ProxyPool, ProxySource, ProxyValidator, ReqwestTransport, ResilientFetcher,
};
use rota_fetch::repository::SnapshotStore;
use rota_fetch::services::PoolRefresher;
use rota_fetch::{Config, Result};

/// Minimal record extracted from the target page
#[derive(Debug, Serialize)]
struct PageSummary {
    url: String,
    title: Option<String>,
    heading: Option<String>,
    bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(&LogConfig::from_env());

    info!("Starting Rota Fetch");

    // Load configuration
    let config = Config::from_env().inspect_err(|e| error!("Configuration error: {}", e))?;
    info!("Configuration loaded");

    let root = CancellationToken::new();
    {
        let root = root.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            root.cancel();
        });
    }

    // Load initial proxies from the last snapshot
    let store = Arc::new(SnapshotStore::new(&config.proxy_file));
    let initial = store.load().await.unwrap_or_else(|e| {
        warn!("Failed to load proxy snapshot: {}", e);
        Vec::new()
    });
    let pool = Arc::new(ProxyPool::with_endpoints(config.pool.clone(), initial));
    info!("Loaded {} proxies", pool.len());

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(Duration::from_secs(10))?);

    let refresher = config.refresh_enabled.then(|| {
        let source = ProxySource::new(pool.clone(), transport.clone(), config.source.clone());
        let validator = ProxyValidator::new(transport.clone(), config.validator.clone());
        PoolRefresher::new(
            pool.clone(),
            source,
            validator,
            store.clone(),
            config.refresher.clone(),
        )
        .spawn(&root)
    });

    let (attempt_tx, attempt_rx) = broadcast::channel::<FetchAttempt>(64);
    let observer = tokio::spawn(log_attempts(attempt_rx));

    let fetcher = ResilientFetcher::new(pool.clone(), transport.clone(), config.fetcher.clone())
        .with_attempt_sender(attempt_tx);

    info!("Fetching target page: {}", config.target_url);
    let result = fetcher.fetch(&config.target_url, &summarize_page, &root).await;
    drop(fetcher);

    match &result {
        Ok(summary) => match serde_json::to_string_pretty(summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize page summary: {}", e),
        },
        Err(e) => error!("Failed to fetch target page: {}", e),
    }

    if let Some(handle) = refresher {
        info!("Pool refresher running; press Ctrl+C to stop");
        root.cancelled().await;
        handle.shutdown().await;
    }

    let _ = observer.await;

    info!("Rota Fetch stopped");
    result.map(|_| ())
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("rota_fetch={}", log.level).into());

    let fmt_layer = if log.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Log each fetch attempt as a structured record
async fn log_attempts(mut rx: broadcast::Receiver<FetchAttempt>) {
    loop {
        match rx.recv().await {
            Ok(record) => match serde_json::to_string(&record) {
                Ok(json) => debug!(attempt = record.attempt, record = %json, "Fetch attempt"),
                Err(e) => warn!("Failed to serialize fetch attempt: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Attempt observer lagged, skipped {} records", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn summarize_page(url: &str, body: &str) -> anyhow::Result<PageSummary> {
    let document = Html::parse_document(body);
    let title = first_text(&document, "title")?;
    let heading = first_text(&document, "h1")?;

    Ok(PageSummary {
        url: url.to_string(),
        title,
        heading,
        bytes: body.len(),
    })
}

fn first_text(document: &Html, css: &str) -> anyhow::Result<Option<String>> {
    let selector =
        Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector {:?}: {:?}", css, e))?;

    Ok(document
        .select(&selector)
        .next()
        .map(|node| node.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty()))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
