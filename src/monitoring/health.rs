use crate::traits::IntegrationProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Number of error records kept per integration
pub const ERROR_HISTORY_CAPACITY: usize = 100;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
    /// Operator override, checks are paused
    Maintenance,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Maintenance => "maintenance",
        }
    }

    /// Value recorded in the status time series. Statuses that carry no
    /// liveness signal map to -1.
    pub fn score(&self) -> f64 {
        match self {
            HealthStatus::Healthy => 1.0,
            HealthStatus::Degraded => 0.5,
            HealthStatus::Unhealthy => 0.0,
            HealthStatus::Unknown | HealthStatus::Maintenance => -1.0,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-integration check settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    /// Reported only. Checks run on the monitor-wide health check interval.
    pub interval: Duration,
    pub timeout: Duration,
    pub max_failures: u32,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub alert_on_failure: bool,
    pub alert_on_recovery: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        crate::config::MonitorConfig::default().health_check_config()
    }
}

/// Cumulative check statistics. Response times are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub total_checks: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Percent of checks that failed
    pub failure_rate: f64,
}

impl HealthMetrics {
    fn record(&mut self, response_time_ms: f64, success: bool) {
        self.total_checks += 1;
        if success {
            self.successful_checks += 1;
        } else {
            self.failed_checks += 1;
        }

        let n = self.total_checks as f64;
        self.avg_response_time_ms = ((n - 1.0) * self.avg_response_time_ms + response_time_ms) / n;

        if self.total_checks == 1 {
            self.min_response_time_ms = response_time_ms;
            self.max_response_time_ms = response_time_ms;
        } else {
            self.min_response_time_ms = self.min_response_time_ms.min(response_time_ms);
            self.max_response_time_ms = self.max_response_time_ms.max(response_time_ms);
        }

        self.failure_rate = self.failed_checks as f64 / n * 100.0;
    }

    /// Percent of checks that succeeded, 0 before the first check
    pub fn availability(&self) -> f64 {
        if self.total_checks == 0 {
            return 0.0;
        }
        self.successful_checks as f64 / self.total_checks as f64 * 100.0
    }
}

/// One failed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub error: String,
    pub duration_ms: f64,
    /// 1-based attempt number within its check
    pub attempt: u32,
}

/// Status before and after a completed check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub previous: HealthStatus,
    pub current: HealthStatus,
    pub failure_count: u32,
}

impl StatusChange {
    /// The check pushed the integration over the failure threshold
    pub fn became_unhealthy(&self) -> bool {
        self.previous != HealthStatus::Unhealthy && self.current == HealthStatus::Unhealthy
    }

    /// The integration came back after being unhealthy
    pub fn recovered(&self) -> bool {
        self.previous == HealthStatus::Unhealthy && self.current == HealthStatus::Healthy
    }
}

/// Point-in-time copy of a checker's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub integration_id: String,
    pub display_name: String,
    pub category: String,
    pub status: HealthStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub response_time_ms: f64,
    pub metrics: HealthMetrics,
    pub config: HealthCheckConfig,
}

impl HealthSnapshot {
    pub fn availability(&self) -> f64 {
        self.metrics.availability()
    }

    pub fn error_rate(&self) -> f64 {
        self.metrics.failure_rate
    }
}

#[derive(Debug)]
struct CheckerState {
    status: HealthStatus,
    /// Status to return to when maintenance ends
    status_before_maintenance: HealthStatus,
    last_check: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    failure_count: u32,
    response_time_ms: f64,
    metrics: HealthMetrics,
    error_history: VecDeque<ErrorRecord>,
    config: HealthCheckConfig,
}

/// Live health state of one integration.
///
/// State lives behind a `RwLock` that is only held for short updates. A
/// separate check lock serialises whole checks (provider call plus retries)
/// so that a slow provider never blocks readers.
pub struct HealthChecker {
    integration_id: String,
    display_name: String,
    category: String,
    provider: Arc<dyn IntegrationProvider>,
    state: RwLock<CheckerState>,
    check_lock: Mutex<()>,
}

impl HealthChecker {
    pub fn new(
        integration_id: &str,
        display_name: &str,
        category: &str,
        provider: Arc<dyn IntegrationProvider>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            integration_id: integration_id.to_string(),
            display_name: display_name.to_string(),
            category: category.to_string(),
            provider,
            state: RwLock::new(CheckerState {
                status: HealthStatus::Unknown,
                status_before_maintenance: HealthStatus::Unknown,
                last_check: None,
                last_success: None,
                failure_count: 0,
                response_time_ms: 0.0,
                metrics: HealthMetrics::default(),
                error_history: VecDeque::with_capacity(ERROR_HISTORY_CAPACITY),
                config,
            }),
            check_lock: Mutex::new(()),
        }
    }

    pub fn integration_id(&self) -> &str {
        &self.integration_id
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn provider(&self) -> &Arc<dyn IntegrationProvider> {
        &self.provider
    }

    /// Exclusive right to run a check on this integration
    pub async fn begin_check(&self) -> MutexGuard<'_, ()> {
        self.check_lock.lock().await
    }

    pub async fn config(&self) -> HealthCheckConfig {
        self.state.read().await.config.clone()
    }

    pub async fn status(&self) -> HealthStatus {
        self.state.read().await.status
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.state.write().await.config.enabled = enabled;
    }

    /// Whether the scheduler should check this integration
    pub async fn is_checkable(&self) -> bool {
        let state = self.state.read().await;
        state.config.enabled && state.status != HealthStatus::Maintenance
    }

    /// Record a successful check
    pub async fn record_success(&self, response_time: Duration) -> StatusChange {
        let now = Utc::now();
        let response_time_ms = duration_ms(response_time);
        let mut state = self.state.write().await;
        let previous = state.status;

        state.failure_count = 0;
        state.last_check = Some(now);
        state.last_success = Some(now);
        state.response_time_ms = response_time_ms;
        state.metrics.record(response_time_ms, true);
        if previous != HealthStatus::Maintenance {
            state.status = HealthStatus::Healthy;
        }

        StatusChange {
            previous,
            current: state.status,
            failure_count: state.failure_count,
        }
    }

    /// Record a check that failed after all its attempts
    pub async fn record_failure(
        &self,
        error: &str,
        response_time: Duration,
        attempt: u32,
    ) -> StatusChange {
        let now = Utc::now();
        let response_time_ms = duration_ms(response_time);
        let mut state = self.state.write().await;
        let previous = state.status;

        state.failure_count += 1;
        state.last_check = Some(now);
        state.response_time_ms = response_time_ms;
        state.metrics.record(response_time_ms, false);
        state.metrics.last_failure_time = Some(now);
        push_error(&mut state.error_history, now, error, response_time_ms, attempt);

        if previous != HealthStatus::Maintenance {
            state.status = if state.failure_count >= state.config.max_failures {
                HealthStatus::Unhealthy
            } else {
                HealthStatus::Degraded
            };
        }

        StatusChange {
            previous,
            current: state.status,
            failure_count: state.failure_count,
        }
    }

    /// Record a failed attempt that will be retried. Only the error history
    /// changes; counters move once the check as a whole completes.
    pub async fn record_attempt_error(&self, error: &str, duration: Duration, attempt: u32) {
        let mut state = self.state.write().await;
        push_error(
            &mut state.error_history,
            Utc::now(),
            error,
            duration_ms(duration),
            attempt,
        );
    }

    /// Enter or leave maintenance. Leaving restores the status the
    /// integration had before.
    pub async fn set_maintenance(&self, enabled: bool) {
        let mut state = self.state.write().await;
        if enabled && state.status != HealthStatus::Maintenance {
            state.status_before_maintenance = state.status;
            state.status = HealthStatus::Maintenance;
        } else if !enabled && state.status == HealthStatus::Maintenance {
            // Checks that finished during maintenance may have moved the counter
            state.status = if state.failure_count == 0 {
                if state.last_success.is_some() {
                    HealthStatus::Healthy
                } else {
                    state.status_before_maintenance
                }
            } else if state.failure_count >= state.config.max_failures {
                HealthStatus::Unhealthy
            } else {
                HealthStatus::Degraded
            };
        }
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        let state = self.state.read().await;
        HealthSnapshot {
            integration_id: self.integration_id.clone(),
            display_name: self.display_name.clone(),
            category: self.category.clone(),
            status: state.status,
            last_check: state.last_check,
            last_success: state.last_success,
            failure_count: state.failure_count,
            response_time_ms: state.response_time_ms,
            metrics: state.metrics.clone(),
            config: state.config.clone(),
        }
    }

    /// Error history, oldest first
    pub async fn error_history(&self) -> Vec<ErrorRecord> {
        self.state.read().await.error_history.iter().cloned().collect()
    }
}

impl fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthChecker")
            .field("integration_id", &self.integration_id)
            .field("category", &self.category)
            .finish()
    }
}

fn push_error(
    history: &mut VecDeque<ErrorRecord>,
    timestamp: DateTime<Utc>,
    error: &str,
    duration_ms: f64,
    attempt: u32,
) {
    if history.len() == ERROR_HISTORY_CAPACITY {
        history.pop_front();
    }
    history.push_back(ErrorRecord {
        timestamp,
        error: error.to_string(),
        duration_ms,
        attempt,
    });
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
