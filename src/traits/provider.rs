use crate::error::ProviderError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Named values reported by a provider, e.g. `request_count` or `revenue`
pub type ProviderMetrics = HashMap<String, serde_json::Value>;

/// Uniform health/metrics contract every integration backend implements.
/// The monitor only ever talks to integrations through this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IntegrationProvider: Send + Sync {
    /// Human readable provider name
    fn name(&self) -> &str;

    /// One-time setup before the first check
    async fn initialize(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Check the integration. `timeout` is the budget the caller enforces;
    /// providers may pass it on to their transport.
    async fn health_check(&self, timeout: Duration) -> Result<(), ProviderError>;

    /// Current counters and gauges
    async fn get_metrics(&self) -> Result<ProviderMetrics, ProviderError>;
}
