use std::time::Duration;
use thiserror::Error;

/// Errors returned by the monitor's public API
#[derive(Debug, Error)]
pub enum MonitorError {
    /// `start` called while the loops are already running
    #[error("monitor is already running")]
    AlreadyRunning,
    /// `stop` called without a prior successful `start`
    #[error("monitor is not running")]
    NotRunning,
    /// No health checker exists for the integration
    #[error("integration '{0}' is not being monitored")]
    UnknownIntegration(String),
    /// No alert with the given id
    #[error("alert '{0}' not found")]
    UnknownAlert(String),
    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Configuration could not be parsed
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    /// Configuration file could not be read
    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
}

/// Errors reported by an integration provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The integration answered but reported itself unavailable
    #[error("integration unavailable: {0}")]
    Unavailable(String),
    /// The call did not complete in time
    #[error("health check timed out after {0:?}")]
    Timeout(Duration),
    /// Transport failure talking to the integration
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The integration answered with something we could not understand
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
