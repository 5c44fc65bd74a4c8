use crate::error::ProviderError;
use crate::traits::{IntegrationProvider, ProviderMetrics};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// In-process provider with configurable latency and failures.
/// Used by the demo binary and by tests.
#[derive(Debug)]
pub struct SimulatedProvider {
    name: String,
    latency: Duration,
    /// Every n-th check fails; 0 disables
    fail_every: u64,
    healthy: AtomicBool,
    checks: AtomicU64,
    errors: AtomicU64,
}

impl SimulatedProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            latency: Duration::ZERO,
            fail_every: 0,
            healthy: AtomicBool::new(true),
            checks: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_fail_every(mut self, n: u64) -> Self {
        self.fail_every = n;
        self
    }

    /// Force every check to fail (or succeed again)
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn checks_performed(&self) -> u64 {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntegrationProvider for SimulatedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self, _timeout: Duration) -> Result<(), ProviderError> {
        let n = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scheduled_failure = self.fail_every > 0 && n % self.fail_every == 0;
        if !self.healthy.load(Ordering::SeqCst) || scheduled_failure {
            self.errors.fetch_add(1, Ordering::SeqCst);
            return Err(ProviderError::Unavailable(format!(
                "{} simulated outage (check {})",
                self.name, n
            )));
        }
        Ok(())
    }

    async fn get_metrics(&self) -> Result<ProviderMetrics, ProviderError> {
        let checks = self.checks.load(Ordering::SeqCst);
        let errors = self.errors.load(Ordering::SeqCst);
        let mut metrics = ProviderMetrics::new();
        metrics.insert("request_count".to_string(), json!(checks));
        metrics.insert("error_count".to_string(), json!(errors));
        metrics.insert("throughput_rps".to_string(), json!(checks as f64 / 60.0));
        metrics.insert("active_connections".to_string(), json!(1));
        metrics.insert("orders_processed".to_string(), json!(checks * 3));
        metrics.insert("revenue".to_string(), json!(format!("{}.50", checks * 10)));
        metrics.insert("last_sync_time".to_string(), json!(Utc::now().to_rfc3339()));
        Ok(metrics)
    }
}
