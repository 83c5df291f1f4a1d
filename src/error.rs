use thiserror::Error;

/// Unified error type for rota-fetch
#[derive(Error, Debug)]
pub enum FetchError {
    // Transient network errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Unexpected status code: {status}")]
    UnexpectedStatus { status: u16 },

    // Terminal errors
    #[error("Operation cancelled")]
    Cancelled,

    #[error("All attempts exhausted after {attempts} attempts: {last_cause}")]
    Exhausted {
        attempts: u32,
        last_cause: Box<FetchError>,
    },

    #[error("Parse error: {0}")]
    Parse(#[source] anyhow::Error),

    #[error("Invalid proxy endpoint: {0}")]
    InvalidEndpoint(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for rota-fetch operations
pub type Result<T> = std::result::Result<T, FetchError>;

impl FetchError {
    /// Whether the failure is absorbed by rotation/retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Transport(_) | FetchError::Timeout | FetchError::UnexpectedStatus { .. }
        )
    }

    /// Whether this is a startup configuration failure
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            FetchError::InvalidConfig(_) | FetchError::MissingEnvVar(_)
        )
    }
}

// Convert from reqwest errors
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}
