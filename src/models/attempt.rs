use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ProxyEndpoint;

/// Result of a single outbound attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AttemptOutcome {
    /// 2xx response received
    Succeeded { status: u16 },
    /// Response received with a non-2xx status
    Rejected { status: u16 },
    /// Network, timeout or TLS failure
    Failed { error: String },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Succeeded { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            AttemptOutcome::Succeeded { status } | AttemptOutcome::Rejected { status } => {
                Some(*status)
            }
            AttemptOutcome::Failed { .. } => None,
        }
    }
}

/// Transient record of one fetch attempt, emitted for observability only
#[derive(Debug, Clone, Serialize)]
pub struct FetchAttempt {
    pub attempt: u32,
    pub url: String,
    /// `None` means the attempt went out directly
    pub endpoint: Option<ProxyEndpoint>,
    pub outcome: AttemptOutcome,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Result of a liveness probe against one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Working,
    /// The candidate answered badly or not at all
    Failed(String),
    /// The probe was cut short by cancellation; nothing is known
    Inconclusive,
}

impl ProbeOutcome {
    pub fn is_working(&self) -> bool {
        matches!(self, ProbeOutcome::Working)
    }
}
