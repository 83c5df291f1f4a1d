use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// A network intermediary identified by its `host:port` pair
///
/// The capability flags are informational; two endpoints with the same
/// host and port are the same endpoint regardless of flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub supports_https: bool,
    #[serde(default)]
    pub supports_google: bool,
}

impl ProxyEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            supports_https: false,
            supports_google: false,
        }
    }

    pub fn with_capabilities(mut self, supports_https: bool, supports_google: bool) -> Self {
        self.supports_https = supports_https;
        self.supports_google = supports_google;
        self
    }

    /// `host:port` identity string
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Proxy URL handed to the HTTP client
    pub fn proxy_url(&self) -> String {
        format!("http://{}", self.address())
    }
}

impl PartialEq for ProxyEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port && self.host.eq_ignore_ascii_case(&other.host)
    }
}

impl Eq for ProxyEndpoint {}

impl Hash for ProxyEndpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.to_ascii_lowercase().hash(state);
        self.port.hash(state);
    }
}

impl std::fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address())
    }
}

impl FromStr for ProxyEndpoint {
    type Err = FetchError;

    /// Parses `host:port`, `[v6]:port`, or a `http://host:port` proxy URL
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let raw = raw
            .strip_prefix("http://")
            .or_else(|| raw.strip_prefix("https://"))
            .unwrap_or(raw)
            .trim_end_matches('/');

        let (host, port) = raw
            .rsplit_once(':')
            .ok_or_else(|| FetchError::InvalidEndpoint(format!("missing port in {:?}", s)))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(FetchError::InvalidEndpoint(format!("missing host in {:?}", s)));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| FetchError::InvalidEndpoint(format!("invalid port in {:?}", s)))?;
        if port == 0 {
            return Err(FetchError::InvalidEndpoint(format!("invalid port in {:?}", s)));
        }

        Ok(ProxyEndpoint::new(host, port))
    }
}
