/// Health checking, metrics collection and alerting for integrations
pub mod alerts;
pub mod health;
pub mod metrics;
pub mod periodic;
pub mod scheduler;

pub use alerts::{
    default_rules, Alert, AlertCallback, AlertCondition, AlertManager, AlertRule, AlertSettings, AlertSeverity,
    AlertStatus, RuleOutcome, INTEGRATION_FAILURE_RULE_ID,
};
pub use health::{
    ErrorRecord, HealthCheckConfig, HealthChecker, HealthMetrics, HealthSnapshot, HealthStatus,
    StatusChange,
};
pub use metrics::{
    AggregatedMetrics, BusinessMetrics, CategoryMetrics, IntegrationMetrics, MetricsCollector,
    MetricsSettings, PerformanceMetrics, TimeSeriesPoint,
};
pub use periodic::{run_periodic, ShutdownReason, ShutdownSignal};
pub use scheduler::{CheckOutcome, CycleReport, HealthCheckScheduler};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Integration id -> checker. Written only when the monitor starts or stops.
pub type CheckerMap = Arc<RwLock<HashMap<String, Arc<HealthChecker>>>>;

/// Oldest timestamp still inside `retention`, or `None` when the window
/// reaches past the representable range
pub(crate) fn retention_cutoff(now: DateTime<Utc>, retention: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
}
