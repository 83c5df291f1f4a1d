use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{FetchError, Result};
use crate::proxy::{FetcherConfig, PoolConfig, ProxySourceConfig, ProxyValidatorConfig};
use crate::services::RefresherConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Page to fetch through the pool
    pub target_url: String,
    /// Line-delimited proxy snapshot, loaded at startup and rewritten each refresh
    pub proxy_file: PathBuf,
    /// Whether to run the background refresher
    pub refresh_enabled: bool,
    pub pool: PoolConfig,
    pub source: ProxySourceConfig,
    pub validator: ProxyValidatorConfig,
    pub fetcher: FetcherConfig,
    pub refresher: RefresherConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let target_url = env::var("TARGET_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| FetchError::MissingEnvVar("TARGET_URL".into()))?;

        let fetch_max_attempts: u32 = parse_env("FETCH_MAX_ATTEMPTS", 10)?;
        if fetch_max_attempts == 0 {
            return Err(FetchError::InvalidConfig(
                "FETCH_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }

        let harvest_max_attempts: u32 = parse_env("HARVEST_MAX_ATTEMPTS", 3)?;
        if harvest_max_attempts == 0 {
            return Err(FetchError::InvalidConfig(
                "HARVEST_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }

        let probe_concurrency: usize = parse_env("PROBE_MAX_CONCURRENCY", 0)?;

        Ok(Config {
            target_url: validate_url("TARGET_URL", target_url.trim())?,
            proxy_file: PathBuf::from(get_env_or("PROXY_FILE", "public/proxy/proxies.txt")),
            refresh_enabled: parse_env("REFRESH_ENABLED", false)?,
            pool: PoolConfig {
                quarantine: Duration::from_secs(parse_env("QUARANTINE_SECS", 300)?),
            },
            source: ProxySourceConfig {
                listing_url: validate_url(
                    "PROXY_LIST_URL",
                    &get_env_or("PROXY_LIST_URL", "https://free-proxy-list.net/"),
                )?,
                max_attempts: harvest_max_attempts,
                timeout: Duration::from_secs(parse_env("FETCH_TIMEOUT", 30)?),
            },
            validator: ProxyValidatorConfig {
                probe_url: validate_url(
                    "PROXY_PROBE_URL",
                    &get_env_or("PROXY_PROBE_URL", "https://www.google.com"),
                )?,
                timeout: Duration::from_secs(parse_env("PROBE_TIMEOUT", 5)?),
                max_concurrency: (probe_concurrency > 0).then_some(probe_concurrency),
            },
            fetcher: FetcherConfig {
                max_attempts: fetch_max_attempts,
                timeout: Duration::from_secs(parse_env("FETCH_TIMEOUT", 30)?),
                backoff: Duration::from_millis(parse_env("FETCH_BACKOFF_MS", 2000)?),
            },
            refresher: RefresherConfig {
                interval: Duration::from_secs(parse_env("REFRESH_INTERVAL_SECS", 600)?),
            },
            log: LogConfig::from_env(),
        })
    }
}

impl LogConfig {
    /// Logging settings alone, so tracing can start before the rest is validated
    pub fn from_env() -> Self {
        LogConfig {
            level: get_env_or("LOG_LEVEL", "info"),
            format: get_env_or("LOG_FORMAT", "pretty"),
        }
    }
}

fn validate_url(key: &str, raw: &str) -> Result<String> {
    let url = Url::parse(raw)
        .map_err(|e| FetchError::InvalidConfig(format!("{} must be a valid URL: {}", key, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(FetchError::InvalidConfig(format!(
            "{} has unsupported scheme: {}",
            key, other
        ))),
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            FetchError::InvalidConfig(format!("{} has an invalid value: {:?}", key, raw))
        }),
        _ => Ok(default),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
