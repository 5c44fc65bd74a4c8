use crate::error::ProviderError;
use crate::traits::{IntegrationProvider, ProviderMetrics};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Provider for integrations that expose an HTTP health endpoint.
///
/// Any 2xx from `health_url` counts as healthy. When `metrics_url` is set
/// it must return a JSON object whose fields become the provider metrics.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    name: String,
    health_url: String,
    metrics_url: Option<String>,
    http_client: Client,
}

impl HttpProvider {
    pub fn new(name: &str, health_url: &str) -> Self {
        Self {
            name: name.to_string(),
            health_url: health_url.to_string(),
            metrics_url: None,
            http_client: Client::new(),
        }
    }

    pub fn with_metrics_url(mut self, metrics_url: &str) -> Self {
        self.metrics_url = Some(metrics_url.to_string());
        self
    }

    /// Use a preconfigured client (proxies, default headers, TLS)
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }
}

#[async_trait]
impl IntegrationProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self, timeout: Duration) -> Result<(), ProviderError> {
        let response = self
            .http_client
            .get(&self.health_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(timeout)
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!(
                "{} returned {}",
                self.health_url, status
            )));
        }
        Ok(())
    }

    async fn get_metrics(&self) -> Result<ProviderMetrics, ProviderError> {
        let Some(url) = &self.metrics_url else {
            return Ok(ProviderMetrics::new());
        };

        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!(
                "{} returned {}",
                url, status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        match body {
            Value::Object(fields) => Ok(fields.into_iter().collect()),
            other => Err(ProviderError::InvalidResponse(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }
}
