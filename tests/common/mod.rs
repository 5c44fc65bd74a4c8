//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use integration_monitor::monitoring::{AlertManager, AlertSettings, CheckerMap, HealthCheckConfig};
use integration_monitor::{
    IntegrationDefinition, IntegrationProvider, Monitor, MonitorConfig, ProviderError,
    ProviderMetrics, ProviderRegistry, SimulatedProvider, StaticCatalog,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Intervals short enough for tests to observe several cycles
pub fn fast_config() -> MonitorConfig {
    MonitorConfig {
        health_check_interval: Duration::from_millis(20),
        metrics_interval: Duration::from_millis(20),
        alert_evaluation_interval: Duration::from_millis(20),
        check_timeout: Duration::from_millis(200),
        max_failures: 3,
        retry_attempts: 0,
        retry_delay: Duration::from_millis(1),
        ..MonitorConfig::default()
    }
}

pub fn check_config() -> HealthCheckConfig {
    fast_config().health_check_config()
}

pub fn monitor_with(
    config: MonitorConfig,
    providers: Vec<(&str, &str, Arc<dyn IntegrationProvider>)>,
) -> Monitor {
    let registry = ProviderRegistry::new();
    let mut definitions = Vec::new();
    for (id, category, provider) in providers {
        definitions.push(IntegrationDefinition::new(id, &id.to_uppercase(), category));
        registry.register(id, provider);
    }
    Monitor::new(config, Arc::new(StaticCatalog::new(definitions)), registry)
}

pub fn simulated(name: &str) -> Arc<SimulatedProvider> {
    Arc::new(SimulatedProvider::new(name))
}

pub fn empty_checkers() -> CheckerMap {
    Arc::new(RwLock::new(HashMap::new()))
}

pub fn alert_manager(deduplicate: bool) -> Arc<AlertManager> {
    Arc::new(AlertManager::new(AlertSettings {
        retention: Duration::from_secs(3600),
        deduplicate,
    }))
}

/// Provider that sleeps during each check and tracks how many of its checks
/// overlap, both on itself and across every tracker sharing `global`
pub struct ConcurrencyTracker {
    name: String,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    global: Arc<AtomicUsize>,
    global_max: Arc<AtomicUsize>,
    fail: AtomicBool,
}

impl ConcurrencyTracker {
    pub fn new(
        name: &str,
        latency: Duration,
        global: Arc<AtomicUsize>,
        global_max: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            name: name.to_string(),
            latency,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            global,
            global_max,
            fail: AtomicBool::new(false),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IntegrationProvider for ConcurrencyTracker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self, _timeout: Duration) -> Result<(), ProviderError> {
        let mine = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(mine, Ordering::SeqCst);
        let all = self.global.fetch_add(1, Ordering::SeqCst) + 1;
        self.global_max.fetch_max(all, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;

        self.global.fetch_sub(1, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(ProviderError::Unavailable(format!("{} scripted failure", self.name)))
        } else {
            Ok(())
        }
    }

    async fn get_metrics(&self) -> Result<ProviderMetrics, ProviderError> {
        Ok(ProviderMetrics::new())
    }
}
