use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::ProxyEndpoint;

/// Destination for the working proxy list
#[async_trait]
pub trait ProxySink: Send + Sync {
    /// Overwrite the stored list with `endpoints`
    async fn save(&self, endpoints: &[ProxyEndpoint]) -> Result<()>;
}

/// Line-delimited `host:port` file
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored list; a missing file is an empty list
    pub async fn load(&self) -> Result<Vec<ProxyEndpoint>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No proxy snapshot found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut endpoints = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<ProxyEndpoint>() {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = lineno + 1,
                    "Skipping snapshot entry: {}",
                    e
                ),
            }
        }

        info!(
            path = %self.path.display(),
            count = endpoints.len(),
            "Loaded proxy snapshot"
        );
        Ok(endpoints)
    }
}

#[async_trait]
impl ProxySink for SnapshotStore {
    async fn save(&self, endpoints: &[ProxyEndpoint]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content: String = endpoints
            .iter()
            .map(|e| format!("{}\n", e.address()))
            .collect();

        // Replace via rename so readers never see a truncated file
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            count = endpoints.len(),
            "Saved proxy snapshot"
        );
        Ok(())
    }
}
