//! Outbound HTTP through an optional proxy
//!
//! All components issue their GETs through [`HttpTransport`], so tests can
//! script responses without touching the network.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{FetchError, Result};
use crate::models::ProxyEndpoint;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Response of a GET request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Body text; left empty for non-2xx responses
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues a GET, optionally via a proxy endpoint
///
/// Implementations must return [`FetchError::Cancelled`] once `cancel` fires
/// and must never outlive `timeout`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        via: Option<&ProxyEndpoint>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse>;
}

/// reqwest-backed transport
///
/// The direct client is shared; proxied clients are built per call since
/// reqwest binds the proxy at client construction.
#[derive(Clone)]
pub struct ReqwestTransport {
    direct: reqwest::Client,
    connect_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let direct = Self::builder(connect_timeout)
            .no_proxy()
            .build()
            .map_err(|e| FetchError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            direct,
            connect_timeout,
        })
    }

    fn builder(connect_timeout: Duration) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
    }

    fn client_for(&self, via: Option<&ProxyEndpoint>) -> Result<reqwest::Client> {
        let Some(endpoint) = via else {
            return Ok(self.direct.clone());
        };

        let proxy = reqwest::Proxy::all(endpoint.proxy_url())
            .map_err(|e| FetchError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

        Self::builder(self.connect_timeout)
            .proxy(proxy)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build proxied client: {}", e)))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        via: Option<&ProxyEndpoint>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let client = self.client_for(via)?;

        let request = async {
            let response = client.get(url).timeout(timeout).send().await?;
            let status = response.status().as_u16();
            trace!(url, status, proxy = ?via.map(|e| e.to_string()), "Received response");

            let body = if response.status().is_success() {
                response.text().await?
            } else {
                String::new()
            };

            Ok::<_, FetchError>(HttpResponse { status, body })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = request => result,
        }
    }
}
