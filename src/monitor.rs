use crate::config::MonitorConfig;
use crate::connectors::ProviderRegistry;
use crate::error::{MonitorError, MonitorResult};
use crate::monitoring::{
    default_rules, run_periodic, AggregatedMetrics, Alert, AlertManager, AlertSettings,
    CheckOutcome, CheckerMap, ErrorRecord, HealthCheckScheduler, HealthChecker, HealthSnapshot,
    HealthStatus, IntegrationMetrics, MetricsCollector, MetricsSettings, ShutdownReason,
    ShutdownSignal,
};
use crate::traits::IntegrationCatalog;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Snapshot of the monitor itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: Option<i64>,
    pub total_integrations: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub maintenance: usize,
    pub active_alerts: usize,
    pub total_alerts: usize,
    pub last_health_check: Option<DateTime<Utc>>,
    pub last_metrics_collection: Option<DateTime<Utc>>,
    pub last_alert_evaluation: Option<DateTime<Utc>>,
    pub health_check_cycles: u64,
    pub metrics_cycles: u64,
    pub alert_evaluations: u64,
}

struct RunningState {
    started_at: DateTime<Utc>,
    stop_tx: watch::Sender<bool>,
    loops: Vec<JoinHandle<ShutdownReason>>,
}

/// Runs health checking, metrics collection and alert evaluation over every
/// active integration in a catalog
pub struct Monitor {
    config: MonitorConfig,
    catalog: Arc<dyn IntegrationCatalog>,
    providers: ProviderRegistry,
    checkers: CheckerMap,
    scheduler: Arc<HealthCheckScheduler>,
    metrics: Arc<MetricsCollector>,
    alerts: Arc<AlertManager>,
    running: Mutex<Option<RunningState>>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        catalog: Arc<dyn IntegrationCatalog>,
        providers: ProviderRegistry,
    ) -> Self {
        let checkers: CheckerMap = Arc::new(RwLock::new(HashMap::new()));
        let alerts = Arc::new(AlertManager::new(AlertSettings::from(&config)));
        let metrics = Arc::new(MetricsCollector::new(
            checkers.clone(),
            MetricsSettings::from(&config),
        ));
        let scheduler = Arc::new(HealthCheckScheduler::new(checkers.clone(), alerts.clone()));

        Self {
            config,
            catalog,
            providers,
            checkers,
            scheduler,
            metrics,
            alerts,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Build the checkers and launch the three loops. Flipping `cancel` to
    /// `true` makes every loop exit; `stop` is still needed afterwards.
    pub async fn start(&self, cancel: watch::Receiver<bool>) -> MonitorResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }
        self.config.validate()?;

        let checkers = self.build_checkers().await;
        let monitored = checkers.len();
        *self.checkers.write().await = checkers;
        self.alerts.install_rules(default_rules(&self.config)).await;

        let (stop_tx, stop_rx) = watch::channel(false);
        let signal = || ShutdownSignal::new(stop_rx.clone(), cancel.clone());
        let mut loops = Vec::with_capacity(3);

        let scheduler = self.scheduler.clone();
        loops.push(tokio::spawn(
            scheduler.run(self.config.health_check_interval, signal()),
        ));

        let metrics = self.metrics.clone();
        let metrics_interval = self.config.metrics_interval;
        let metrics_signal = signal();
        loops.push(tokio::spawn(async move {
            run_periodic("metrics collection", metrics_interval, metrics_signal, || {
                let metrics = metrics.clone();
                async move { metrics.collect_metrics().await }
            })
            .await
        }));

        let alerts = self.alerts.clone();
        let metrics = self.metrics.clone();
        let checkers = self.checkers.clone();
        let alert_interval = self.config.alert_evaluation_interval;
        let alert_signal = signal();
        loops.push(tokio::spawn(async move {
            run_periodic("alert evaluation", alert_interval, alert_signal, || {
                let alerts = alerts.clone();
                let metrics = metrics.clone();
                let checkers = checkers.clone();
                async move { alerts.run_cycle(&metrics, &checkers).await }
            })
            .await
        }));

        *running = Some(RunningState {
            started_at: Utc::now(),
            stop_tx,
            loops,
        });
        info!("Integration monitor started with {} integrations", monitored);
        Ok(())
    }

    async fn build_checkers(&self) -> HashMap<String, Arc<HealthChecker>> {
        let check_config = self.config.health_check_config();
        let mut checkers = HashMap::new();

        for integration in self.catalog.list_integrations() {
            if !integration.is_active {
                continue;
            }
            let Some(provider) = self.providers.get(&integration.id) else {
                warn!("No provider registered for {}, skipping", integration.id);
                continue;
            };

            match tokio::time::timeout(self.config.check_timeout, provider.initialize()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Provider for {} failed to initialize: {}", integration.id, e),
                Err(_) => warn!("Provider for {} timed out initializing", integration.id),
            }

            let checker = HealthChecker::new(
                &integration.id,
                &integration.display_name,
                &integration.category,
                provider,
                check_config.clone(),
            );
            checkers.insert(integration.id.clone(), Arc::new(checker));
        }
        checkers
    }

    /// Signal the loops, wait for them to exit, then drop the checkers and
    /// their metrics
    pub async fn stop(&self) -> MonitorResult<()> {
        let state = self
            .running
            .lock()
            .await
            .take()
            .ok_or(MonitorError::NotRunning)?;

        // Loops that already exited on cancellation have dropped their receivers
        let _ = state.stop_tx.send(true);
        for handle in state.loops {
            if let Err(e) = handle.await {
                error!("Monitoring loop ended abnormally: {}", e);
            }
        }

        self.checkers.write().await.clear();
        self.metrics.reset().await;
        info!("Integration monitor stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn checker(&self, integration_id: &str) -> MonitorResult<Arc<HealthChecker>> {
        self.checkers
            .read()
            .await
            .get(integration_id)
            .cloned()
            .ok_or_else(|| MonitorError::UnknownIntegration(integration_id.to_string()))
    }

    pub async fn get_integration_health(&self, integration_id: &str) -> MonitorResult<HealthSnapshot> {
        Ok(self.checker(integration_id).await?.snapshot().await)
    }

    pub async fn get_all_health_status(&self) -> HashMap<String, HealthSnapshot> {
        let checkers: Vec<Arc<HealthChecker>> =
            self.checkers.read().await.values().cloned().collect();
        let mut all = HashMap::with_capacity(checkers.len());
        for checker in checkers {
            all.insert(checker.integration_id().to_string(), checker.snapshot().await);
        }
        all
    }

    pub async fn get_error_history(&self, integration_id: &str) -> MonitorResult<Vec<ErrorRecord>> {
        Ok(self.checker(integration_id).await?.error_history().await)
    }

    /// Put an integration into maintenance or take it out again
    pub async fn set_maintenance(&self, integration_id: &str, enabled: bool) -> MonitorResult<()> {
        self.checker(integration_id).await?.set_maintenance(enabled).await;
        info!(
            "Maintenance {} for {}",
            if enabled { "enabled" } else { "disabled" },
            integration_id
        );
        Ok(())
    }

    /// Check one integration immediately, outside the schedule
    pub async fn check_integration_now(&self, integration_id: &str) -> MonitorResult<CheckOutcome> {
        self.scheduler.check_integration(integration_id).await
    }

    pub async fn get_metrics(&self, integration_id: &str) -> Option<IntegrationMetrics> {
        self.metrics.get_metrics(integration_id).await
    }

    pub async fn get_all_metrics(&self) -> HashMap<String, IntegrationMetrics> {
        self.metrics.get_all_metrics().await
    }

    pub async fn get_aggregated_metrics(&self) -> AggregatedMetrics {
        self.metrics.get_aggregated_metrics().await
    }

    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        self.alerts.get_active_alerts().await
    }

    pub async fn get_alerts(&self) -> Vec<Alert> {
        self.alerts.get_alerts().await
    }

    pub async fn resolve_alert(&self, alert_id: &str) -> MonitorResult<()> {
        self.alerts.resolve_alert(alert_id).await
    }

    pub async fn silence_alert(&self, alert_id: &str) -> MonitorResult<()> {
        self.alerts.silence_alert(alert_id).await
    }

    /// Called for every new alert, after it has been stored
    pub async fn register_alert_callback<F>(&self, callback: F)
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.alerts.register_callback(callback).await;
    }

    pub async fn get_monitoring_status(&self) -> MonitoringStatus {
        let started_at = self.running.lock().await.as_ref().map(|s| s.started_at);
        let health = self.get_all_health_status().await;
        let count = |status: HealthStatus| health.values().filter(|h| h.status == status).count();
        let alerts = self.alerts.get_alerts().await;

        MonitoringStatus {
            running: started_at.is_some(),
            started_at,
            uptime_secs: started_at.map(|t| (Utc::now() - t).num_seconds()),
            total_integrations: health.len(),
            healthy: count(HealthStatus::Healthy),
            degraded: count(HealthStatus::Degraded),
            unhealthy: count(HealthStatus::Unhealthy),
            unknown: count(HealthStatus::Unknown),
            maintenance: count(HealthStatus::Maintenance),
            active_alerts: alerts.iter().filter(|a| a.is_firing()).count(),
            total_alerts: alerts.len(),
            last_health_check: self.scheduler.last_cycle().await,
            last_metrics_collection: self.metrics.last_collection().await,
            last_alert_evaluation: self.alerts.last_evaluation().await,
            health_check_cycles: self.scheduler.cycles_completed(),
            metrics_cycles: self.metrics.cycles_completed(),
            alert_evaluations: self.alerts.evaluations_completed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::SimulatedProvider;
    use crate::traits::{IntegrationDefinition, StaticCatalog};
    use std::time::Duration;

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            health_check_interval: Duration::from_millis(20),
            metrics_interval: Duration::from_millis(20),
            alert_evaluation_interval: Duration::from_millis(20),
            check_timeout: Duration::from_millis(100),
            retry_attempts: 0,
            retry_delay: Duration::from_millis(1),
            max_failures: 2,
            ..MonitorConfig::default()
        }
    }

    fn monitor(config: MonitorConfig) -> (Monitor, Arc<SimulatedProvider>) {
        let catalog = StaticCatalog::new(vec![
            IntegrationDefinition::new("trendyol", "Trendyol", "marketplace"),
            IntegrationDefinition::new("aras", "Aras Kargo", "cargo"),
            IntegrationDefinition::new("n11", "N11", "marketplace").inactive(),
            IntegrationDefinition::new("orphan", "No Provider", "erp"),
        ]);
        let registry = ProviderRegistry::new();
        let aras = Arc::new(SimulatedProvider::new("aras"));
        registry.register("trendyol", Arc::new(SimulatedProvider::new("trendyol")));
        registry.register("aras", aras.clone());
        registry.register("n11", Arc::new(SimulatedProvider::new("n11")));
        (Monitor::new(config, Arc::new(catalog), registry), aras)
    }

    #[tokio::test]
    async fn test_start_builds_checkers_for_active_with_provider() {
        let (monitor, _) = monitor(fast_config());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        monitor.start(cancel_rx).await.unwrap();

        let health = monitor.get_all_health_status().await;
        let mut ids: Vec<_> = health.keys().cloned().collect();
        ids.sort();
        assert_eq!(ids, vec!["aras".to_string(), "trendyol".to_string()]);
        assert!(matches!(
            monitor.get_integration_health("orphan").await,
            Err(MonitorError::UnknownIntegration(_))
        ));

        monitor.stop().await.unwrap();
        assert!(monitor.get_all_health_status().await.is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let (monitor, _) = monitor(fast_config());
        assert!(matches!(monitor.stop().await, Err(MonitorError::NotRunning)));

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        monitor.start(cancel_rx.clone()).await.unwrap();
        assert!(matches!(
            monitor.start(cancel_rx).await,
            Err(MonitorError::AlreadyRunning)
        ));
        monitor.stop().await.unwrap();
        assert!(matches!(monitor.stop().await, Err(MonitorError::NotRunning)));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let (monitor, _) = monitor(MonitorConfig {
            max_failures: 0,
            ..fast_config()
        });
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        assert!(matches!(
            monitor.start(cancel_rx).await,
            Err(MonitorError::InvalidConfig(_))
        ));
        assert!(!monitor.is_running().await);
    }

    #[tokio::test]
    async fn test_loops_run_and_status_reports_them() {
        let (monitor, aras) = monitor(fast_config());
        aras.set_healthy(false);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        monitor.start(cancel_rx).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = monitor.get_monitoring_status().await;
        assert!(status.running);
        assert_eq!(status.total_integrations, 2);
        assert_eq!(status.healthy, 1);
        assert_eq!(status.unhealthy, 1);
        assert!(status.health_check_cycles >= 2);
        assert!(status.metrics_cycles >= 1);
        assert!(status.active_alerts >= 1);
        assert!(monitor.get_metrics("trendyol").await.is_some());

        monitor.stop().await.unwrap();
        assert!(!monitor.get_monitoring_status().await.running);
    }

    #[tokio::test]
    async fn test_operator_operations() {
        let (monitor, aras) = monitor(MonitorConfig {
            health_check_interval: Duration::from_secs(3600),
            ..fast_config()
        });
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        monitor.start(cancel_rx).await.unwrap();

        aras.set_healthy(false);
        assert_eq!(
            monitor.check_integration_now("aras").await.unwrap(),
            CheckOutcome::Failed
        );
        assert_eq!(monitor.get_error_history("aras").await.unwrap().len(), 1);

        monitor.set_maintenance("aras", true).await.unwrap();
        assert_eq!(
            monitor.check_integration_now("aras").await.unwrap(),
            CheckOutcome::Skipped
        );
        assert_eq!(
            monitor.get_integration_health("aras").await.unwrap().status,
            HealthStatus::Maintenance
        );
        assert!(monitor.set_maintenance("ghost", true).await.is_err());

        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_stops_loops() {
        let (monitor, _) = monitor(fast_config());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        monitor.start(cancel_rx).await.unwrap();

        cancel_tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let cycles = monitor.get_monitoring_status().await.health_check_cycles;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            monitor.get_monitoring_status().await.health_check_cycles,
            cycles
        );

        tokio::time::timeout(Duration::from_secs(1), monitor.stop())
            .await
            .unwrap()
            .unwrap();
    }
}
