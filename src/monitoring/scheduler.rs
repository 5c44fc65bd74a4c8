use crate::error::{MonitorError, MonitorResult, ProviderError};
use crate::monitoring::alerts::AlertManager;
use crate::monitoring::health::HealthChecker;
use crate::monitoring::periodic::{run_periodic, ShutdownReason, ShutdownSignal};
use crate::monitoring::CheckerMap;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// How a single check ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Succeeded,
    Failed,
    /// Disabled or put into maintenance before the check could start
    Skipped,
}

/// Summary of one scheduler pass
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl CycleReport {
    pub fn checked(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Fans out health checks over all monitored integrations
pub struct HealthCheckScheduler {
    checkers: CheckerMap,
    alerts: Arc<AlertManager>,
    last_cycle: RwLock<Option<DateTime<Utc>>>,
    cycles: AtomicU64,
}

impl HealthCheckScheduler {
    pub fn new(checkers: CheckerMap, alerts: Arc<AlertManager>) -> Self {
        Self {
            checkers,
            alerts,
            last_cycle: RwLock::new(None),
            cycles: AtomicU64::new(0),
        }
    }

    /// Check every enabled, non-maintenance integration concurrently and
    /// return once all of them have finished
    pub async fn perform_health_checks(&self) -> CycleReport {
        let started_at = Utc::now();
        let checkers: Vec<Arc<HealthChecker>> =
            self.checkers.read().await.values().cloned().collect();

        let mut skipped = 0;
        let mut handles = Vec::with_capacity(checkers.len());
        for checker in checkers {
            if !checker.is_checkable().await {
                skipped += 1;
                continue;
            }
            let alerts = self.alerts.clone();
            handles.push(tokio::spawn(Self::run_check(checker, alerts)));
        }

        let mut report = CycleReport {
            started_at,
            finished_at: started_at,
            succeeded: 0,
            failed: 0,
            skipped,
        };
        for result in join_all(handles).await {
            match result {
                Ok(CheckOutcome::Succeeded) => report.succeeded += 1,
                Ok(CheckOutcome::Failed) => report.failed += 1,
                Ok(CheckOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!("Health check task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        report.finished_at = Utc::now();
        *self.last_cycle.write().await = Some(report.finished_at);
        self.cycles.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Health check cycle done: {} ok, {} failed, {} skipped",
            report.succeeded, report.failed, report.skipped
        );
        report
    }

    /// Run one check on a single integration right away. Waits for any
    /// check already running on it.
    pub async fn check_integration(&self, integration_id: &str) -> MonitorResult<CheckOutcome> {
        let checker = self
            .checkers
            .read()
            .await
            .get(integration_id)
            .cloned()
            .ok_or_else(|| MonitorError::UnknownIntegration(integration_id.to_string()))?;
        Ok(Self::run_check(checker, self.alerts.clone()).await)
    }

    /// One complete check with retries. Holds the checker's check lock
    /// throughout so checks on the same integration never overlap.
    pub async fn run_check(checker: Arc<HealthChecker>, alerts: Arc<AlertManager>) -> CheckOutcome {
        let _guard = checker.begin_check().await;
        if !checker.is_checkable().await {
            return CheckOutcome::Skipped;
        }

        let config = checker.config().await;
        let provider = checker.provider().clone();
        let max_attempts = config.retry_attempts + 1;
        let mut attempt = 1;

        loop {
            let started = Instant::now();
            let result =
                match tokio::time::timeout(config.timeout, provider.health_check(config.timeout))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(config.timeout)),
                };
            let elapsed = started.elapsed();

            match result {
                Ok(()) => {
                    let change = checker.record_success(elapsed).await;
                    if change.recovered() {
                        if config.alert_on_recovery {
                            info!("Integration {} recovered", checker.integration_id());
                        }
                        let resolved = alerts
                            .resolve_integration_failure(checker.integration_id())
                            .await;
                        if resolved > 0 {
                            debug!(
                                "Resolved {} failure alerts for {}",
                                resolved,
                                checker.integration_id()
                            );
                        }
                    }
                    return CheckOutcome::Succeeded;
                }
                Err(e) if attempt < max_attempts => {
                    let message = e.to_string();
                    debug!(
                        "Health check attempt {}/{} for {} failed: {}",
                        attempt,
                        max_attempts,
                        checker.integration_id(),
                        message
                    );
                    checker.record_attempt_error(&message, elapsed, attempt).await;
                    tokio::time::sleep(config.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    let message = e.to_string();
                    let change = checker.record_failure(&message, elapsed, attempt).await;
                    warn!(
                        "Health check for {} failed ({} consecutive): {}",
                        checker.integration_id(),
                        change.failure_count,
                        message
                    );
                    if change.became_unhealthy() && config.alert_on_failure {
                        let snapshot = checker.snapshot().await;
                        alerts.raise_integration_failure(&snapshot, &message).await;
                    }
                    return CheckOutcome::Failed;
                }
            }
        }
    }

    /// Run checks every `period` until shutdown
    pub async fn run(self: Arc<Self>, period: Duration, shutdown: ShutdownSignal) -> ShutdownReason {
        run_periodic("health check", period, shutdown, || {
            let scheduler = self.clone();
            async move {
                scheduler.perform_health_checks().await;
            }
        })
        .await
    }

    pub async fn last_cycle(&self) -> Option<DateTime<Utc>> {
        *self.last_cycle.read().await
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::alerts::{AlertSettings, INTEGRATION_FAILURE_RULE_ID};
    use crate::monitoring::health::{HealthCheckConfig, HealthStatus};
    use crate::traits::MockIntegrationProvider;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;

    fn config(max_failures: u32, retry_attempts: u32) -> HealthCheckConfig {
        HealthCheckConfig {
            max_failures,
            retry_attempts,
            retry_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(50),
            ..HealthCheckConfig::default()
        }
    }

    fn alert_manager() -> Arc<AlertManager> {
        Arc::new(AlertManager::new(AlertSettings {
            retention: Duration::from_secs(3600),
            deduplicate: false,
        }))
    }

    fn scheduler_with(
        checkers: Vec<Arc<HealthChecker>>,
        alerts: Arc<AlertManager>,
    ) -> HealthCheckScheduler {
        let map: HashMap<_, _> = checkers
            .into_iter()
            .map(|c| (c.integration_id().to_string(), c))
            .collect();
        HealthCheckScheduler::new(Arc::new(RwLock::new(map)), alerts)
    }

    fn failing_provider() -> MockIntegrationProvider {
        let mut provider = MockIntegrationProvider::new();
        provider
            .expect_health_check()
            .returning(|_| Err(ProviderError::Unavailable("503".to_string())));
        provider
    }

    #[tokio::test]
    async fn test_crossing_threshold_raises_single_alert() {
        let checker = Arc::new(HealthChecker::new(
            "hepsiburada",
            "Hepsiburada",
            "marketplace",
            Arc::new(failing_provider()),
            config(3, 0),
        ));
        let alerts = alert_manager();
        let scheduler = scheduler_with(vec![checker.clone()], alerts.clone());

        for _ in 0..3 {
            scheduler.perform_health_checks().await;
        }
        assert_eq!(checker.status().await, HealthStatus::Unhealthy);
        let active = alerts.get_active_alerts().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].rule_id, INTEGRATION_FAILURE_RULE_ID);

        // Staying unhealthy does not raise another one
        scheduler.perform_health_checks().await;
        assert_eq!(alerts.get_active_alerts().await.len(), 1);
        assert_eq!(scheduler.cycles_completed(), 4);
    }

    #[tokio::test]
    async fn test_healthy_to_unhealthy_after_exactly_max_failures() {
        let healthy = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let flag = healthy.clone();
        let mut provider = MockIntegrationProvider::new();
        provider.expect_health_check().returning(move |_| {
            if flag.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ProviderError::Unavailable("502".to_string()))
            }
        });

        let checker = Arc::new(HealthChecker::new(
            "trendyol",
            "Trendyol",
            "marketplace",
            Arc::new(provider),
            config(4, 0),
        ));
        let alerts = alert_manager();
        let scheduler = scheduler_with(vec![checker.clone()], alerts.clone());

        scheduler.perform_health_checks().await;
        assert_eq!(checker.status().await, HealthStatus::Healthy);

        healthy.store(false, Ordering::SeqCst);
        for round in 1..4 {
            scheduler.perform_health_checks().await;
            assert_eq!(checker.status().await, HealthStatus::Degraded, "round {}", round);
            assert!(alerts.get_alerts().await.is_empty());
        }

        scheduler.perform_health_checks().await;
        let snapshot = checker.snapshot().await;
        assert_eq!(snapshot.status, HealthStatus::Unhealthy);
        assert_eq!(snapshot.failure_count, 4);
        let failure_alerts: Vec<_> = alerts
            .get_alerts()
            .await
            .into_iter()
            .filter(|a| a.rule_id == INTEGRATION_FAILURE_RULE_ID)
            .collect();
        assert_eq!(failure_alerts.len(), 1);
        assert_eq!(failure_alerts[0].integration_id, "trendyol");
        assert_eq!(failure_alerts[0].metadata["failure_count"], "4");
    }

    #[tokio::test]
    async fn test_retries_count_as_one_check() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut provider = MockIntegrationProvider::new();
        provider.expect_health_check().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::Unavailable("flaky".to_string()))
            } else {
                Ok(())
            }
        });

        let checker = Arc::new(HealthChecker::new(
            "n11",
            "N11",
            "marketplace",
            Arc::new(provider),
            config(5, 3),
        ));
        let outcome = HealthCheckScheduler::run_check(checker.clone(), alert_manager()).await;

        assert_eq!(outcome, CheckOutcome::Succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let snapshot = checker.snapshot().await;
        assert_eq!(snapshot.metrics.total_checks, 1);
        assert_eq!(snapshot.failure_count, 0);
        let history = checker.error_history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].attempt, 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_record_one_failure() {
        let checker = Arc::new(HealthChecker::new(
            "aras",
            "Aras Kargo",
            "cargo",
            Arc::new(failing_provider()),
            config(5, 2),
        ));
        let outcome = HealthCheckScheduler::run_check(checker.clone(), alert_manager()).await;

        assert_eq!(outcome, CheckOutcome::Failed);
        let snapshot = checker.snapshot().await;
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.status, HealthStatus::Degraded);
        assert_eq!(checker.error_history().await.len(), 3);
    }

    #[tokio::test]
    async fn test_timeout_is_recorded_as_failure() {
        struct Hanging;
        #[async_trait::async_trait]
        impl crate::traits::IntegrationProvider for Hanging {
            fn name(&self) -> &str {
                "hanging"
            }
            async fn health_check(&self, _timeout: Duration) -> Result<(), ProviderError> {
                std::future::pending().await
            }
            async fn get_metrics(&self) -> Result<crate::traits::ProviderMetrics, ProviderError> {
                Ok(Default::default())
            }
        }

        let checker = Arc::new(HealthChecker::new(
            "ptt",
            "PTT",
            "cargo",
            Arc::new(Hanging),
            config(1, 0),
        ));
        let alerts = alert_manager();
        let outcome = HealthCheckScheduler::run_check(checker.clone(), alerts.clone()).await;

        assert_eq!(outcome, CheckOutcome::Failed);
        let history = checker.error_history().await;
        assert!(history[0].error.contains("timed out"));
        assert_eq!(checker.status().await, HealthStatus::Unhealthy);
        assert_eq!(alerts.get_active_alerts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_resolves_failure_alert() {
        let healthy = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = healthy.clone();
        let mut provider = MockIntegrationProvider::new();
        provider.expect_health_check().returning(move |_| {
            if flag.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ProviderError::Unavailable("down".to_string()))
            }
        });

        let checker = Arc::new(HealthChecker::new(
            "mng",
            "MNG",
            "cargo",
            Arc::new(provider),
            config(1, 0),
        ));
        let alerts = alert_manager();
        HealthCheckScheduler::run_check(checker.clone(), alerts.clone()).await;
        assert_eq!(alerts.get_active_alerts().await.len(), 1);

        healthy.store(true, Ordering::SeqCst);
        HealthCheckScheduler::run_check(checker.clone(), alerts.clone()).await;
        assert_eq!(checker.status().await, HealthStatus::Healthy);
        assert!(alerts.get_active_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_and_maintenance_are_skipped() {
        let mut provider = MockIntegrationProvider::new();
        provider.expect_health_check().never();
        let provider: Arc<dyn crate::traits::IntegrationProvider> = Arc::new(provider);

        let disabled = Arc::new(HealthChecker::new(
            "a",
            "A",
            "x",
            provider.clone(),
            config(3, 0),
        ));
        disabled.set_enabled(false).await;
        let paused = Arc::new(HealthChecker::new("b", "B", "x", provider, config(3, 0)));
        paused.set_maintenance(true).await;

        let scheduler = scheduler_with(vec![disabled, paused], alert_manager());
        let report = scheduler.perform_health_checks().await;
        assert_eq!(report.skipped, 2);
        assert_eq!(report.checked(), 0);
    }

    #[tokio::test]
    async fn test_check_unknown_integration() {
        let scheduler = scheduler_with(vec![], alert_manager());
        assert!(matches!(
            scheduler.check_integration("missing").await,
            Err(MonitorError::UnknownIntegration(_))
        ));
    }
}
