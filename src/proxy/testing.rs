//! Scripted transport shared by unit tests

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, Result};
use crate::models::ProxyEndpoint;
use crate::proxy::transport::{HttpResponse, HttpTransport};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Status(u16, String),
    Refused,
    /// Never answers; resolves as a timeout once the caller's timeout elapses
    Hang,
}

impl Reply {
    pub(crate) fn ok(body: &str) -> Self {
        Reply::Status(200, body.to_string())
    }

    pub(crate) fn status(status: u16) -> Self {
        Reply::Status(status, String::new())
    }

    async fn play(self, timeout: Duration, cancel: &CancellationToken) -> Result<HttpResponse> {
        match self {
            Reply::Status(status, body) => Ok(HttpResponse { status, body }),
            Reply::Refused => Err(FetchError::Transport("connection refused".to_string())),
            Reply::Hang => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(timeout) => Err(FetchError::Timeout),
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub url: String,
    pub via: Option<ProxyEndpoint>,
}

/// Answers from a per-endpoint table first, then from an ordered queue
pub(crate) struct ScriptedTransport {
    sequence: Mutex<VecDeque<Reply>>,
    per_endpoint: HashMap<ProxyEndpoint, Reply>,
    fallback: Reply,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub(crate) fn sequence(replies: Vec<Reply>) -> Self {
        Self {
            sequence: Mutex::new(replies.into()),
            per_endpoint: HashMap::new(),
            fallback: Reply::Refused,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn per_endpoint(replies: Vec<(ProxyEndpoint, Reply)>) -> Self {
        Self {
            sequence: Mutex::new(VecDeque::new()),
            per_endpoint: replies.into_iter().collect(),
            fallback: Reply::Refused,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_fallback(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(
        &self,
        url: &str,
        via: Option<&ProxyEndpoint>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        self.calls.lock().push(Call {
            url: url.to_string(),
            via: via.cloned(),
        });

        let reply = match via.and_then(|e| self.per_endpoint.get(e)) {
            Some(reply) => reply.clone(),
            None => self
                .sequence
                .lock()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone()),
        };

        reply.play(timeout, cancel).await
    }
}

pub(crate) fn endpoints(n: u16) -> Vec<ProxyEndpoint> {
    (1..=n)
        .map(|i| ProxyEndpoint::new(format!("10.0.0.{}", i), 3128))
        .collect()
}

/// Minimal listing page; each entry is `(host, port, https)`
pub(crate) fn listing_html(entries: &[(&str, u16, bool)]) -> String {
    let rows: String = entries
        .iter()
        .map(|(host, port, https)| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>DE</td><td>Germany</td><td>elite proxy</td>\
                 <td>no</td><td>{}</td><td>10 secs ago</td></tr>",
                host,
                port,
                if *https { "yes" } else { "no" }
            )
        })
        .collect();
    format!(
        "<table class=\"table table-striped table-bordered\"><tbody>{}</tbody></table>",
        rows
    )
}
