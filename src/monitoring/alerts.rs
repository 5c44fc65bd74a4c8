use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::monitoring::health::{HealthSnapshot, HealthStatus};
use crate::monitoring::metrics::{IntegrationMetrics, MetricsCollector};
use crate::monitoring::{retention_cutoff, CheckerMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Rule id used for alerts raised directly by the scheduler
pub const INTEGRATION_FAILURE_RULE_ID: &str = "integration_failure";

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Alert lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Firing,
    Resolved,
    Silenced,
}

/// Condition a rule checks for each integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    /// Error rate (percent) above threshold
    ErrorRateHigh,
    /// Average response time (ms) above threshold
    ResponseTimeHigh,
    /// Availability (percent) below threshold
    AvailabilityLow,
    /// Health checker reports `Unhealthy`; threshold unused
    IntegrationDown,
}

/// Result of applying a condition to one integration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleOutcome {
    /// Condition holds; carries the observed value
    Breached(f64),
    /// Condition does not hold
    Clear(f64),
    /// Nothing to judge yet
    NoData,
}

impl AlertCondition {
    /// Threshold conditions read the metrics snapshot and ignore integrations
    /// that have not completed a check yet. `IntegrationDown` reads the
    /// checker status.
    pub fn evaluate(
        &self,
        threshold: f64,
        metrics: Option<&IntegrationMetrics>,
        status: Option<HealthStatus>,
    ) -> RuleOutcome {
        let checked = metrics.filter(|m| m.total_checks > 0);

        let (value, breached) = match (self, checked, status) {
            (AlertCondition::IntegrationDown, _, Some(status)) => {
                (status.score(), status == HealthStatus::Unhealthy)
            }
            (AlertCondition::IntegrationDown, _, None) => return RuleOutcome::NoData,
            (_, None, _) => return RuleOutcome::NoData,
            (AlertCondition::ErrorRateHigh, Some(m), _) => (m.error_rate, m.error_rate > threshold),
            (AlertCondition::ResponseTimeHigh, Some(m), _) => {
                (m.avg_response_time_ms, m.avg_response_time_ms > threshold)
            }
            (AlertCondition::AvailabilityLow, Some(m), _) => {
                (m.availability, m.availability < threshold)
            }
        };

        if breached {
            RuleOutcome::Breached(value)
        } else {
            RuleOutcome::Clear(value)
        }
    }

    fn describe(&self, name: &str, value: f64, threshold: f64) -> String {
        match self {
            AlertCondition::ErrorRateHigh => format!(
                "{} error rate is {:.2}% (threshold {:.2}%)",
                name, value, threshold
            ),
            AlertCondition::ResponseTimeHigh => format!(
                "{} average response time is {:.0}ms (threshold {:.0}ms)",
                name, value, threshold
            ),
            AlertCondition::AvailabilityLow => format!(
                "{} availability is {:.2}% (threshold {:.2}%)",
                name, value, threshold
            ),
            AlertCondition::IntegrationDown => format!("{} is unhealthy", name),
        }
    }
}

/// Declarative threshold rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub condition: AlertCondition,
    pub threshold: f64,
    /// How long the condition is expected to hold before paging. Carried on
    /// the alert as metadata.
    #[serde(with = "crate::config::duration_secs")]
    pub duration: Duration,
    pub severity: AlertSeverity,
    pub enabled: bool,
    pub labels: HashMap<String, String>,
}

/// An alert instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub integration_id: String,
    pub rule_id: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
}

impl Alert {
    fn new(
        integration_id: &str,
        rule_id: &str,
        severity: AlertSeverity,
        title: String,
        description: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut annotations = HashMap::new();
        annotations.insert("summary".to_string(), description.clone());
        Self {
            id: format!("{}_{}_{}", integration_id, rule_id, timestamp.timestamp_millis()),
            integration_id: integration_id.to_string(),
            rule_id: rule_id.to_string(),
            severity,
            status: AlertStatus::Firing,
            title,
            description,
            timestamp,
            resolved_at: None,
            metadata: HashMap::new(),
            annotations,
        }
    }

    pub fn is_firing(&self) -> bool {
        self.status == AlertStatus::Firing
    }

    fn close(&mut self, status: AlertStatus, at: DateTime<Utc>) {
        self.status = status;
        self.resolved_at.get_or_insert(at);
    }
}

/// The four built-in rules with thresholds from the config
pub fn default_rules(config: &MonitorConfig) -> Vec<AlertRule> {
    let labels = HashMap::from([("component".to_string(), "integrations".to_string())]);
    let rule = |id: &str,
                name: &str,
                condition: AlertCondition,
                threshold: f64,
                minutes: u64,
                severity: AlertSeverity| AlertRule {
        id: id.to_string(),
        name: name.to_string(),
        condition,
        threshold,
        duration: Duration::from_secs(minutes * 60),
        severity,
        enabled: true,
        labels: labels.clone(),
    };

    vec![
        rule(
            "error_rate_high",
            "High Error Rate",
            AlertCondition::ErrorRateHigh,
            config.error_rate_threshold,
            5,
            AlertSeverity::High,
        ),
        rule(
            "response_time_high",
            "High Response Time",
            AlertCondition::ResponseTimeHigh,
            config.response_time_threshold_ms,
            5,
            AlertSeverity::Medium,
        ),
        rule(
            "availability_low",
            "Low Availability",
            AlertCondition::AvailabilityLow,
            config.availability_threshold,
            10,
            AlertSeverity::High,
        ),
        rule(
            "integration_down",
            "Integration Down",
            AlertCondition::IntegrationDown,
            0.0,
            1,
            AlertSeverity::Critical,
        ),
    ]
}

/// Alert manager options
#[derive(Debug, Clone, PartialEq)]
pub struct AlertSettings {
    /// How long resolved alerts are kept
    pub retention: Duration,
    /// At most one firing alert per (integration, rule)
    pub deduplicate: bool,
}

impl From<&MonitorConfig> for AlertSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            retention: config.alert_retention,
            deduplicate: config.deduplicate_alerts,
        }
    }
}

#[derive(Debug, Default)]
struct AlertStore {
    rules: Vec<AlertRule>,
    alerts: Vec<Alert>,
    last_evaluation: Option<DateTime<Utc>>,
}

impl AlertStore {
    fn has_firing(&self, integration_id: &str, rule_id: &str) -> bool {
        self.alerts
            .iter()
            .any(|a| a.is_firing() && a.integration_id == integration_id && a.rule_id == rule_id)
    }

    fn resolve_matching(&mut self, integration_id: &str, rule_id: &str, at: DateTime<Utc>) -> usize {
        let mut resolved = 0;
        for alert in self.alerts.iter_mut().filter(|a| {
            a.is_firing() && a.integration_id == integration_id && a.rule_id == rule_id
        }) {
            alert.close(AlertStatus::Resolved, at);
            resolved += 1;
        }
        resolved
    }
}

/// Alert callback invoked for every new alert
pub type AlertCallback = Box<dyn Fn(&Alert) + Send + Sync>;

/// Evaluates rules and owns the alert list
pub struct AlertManager {
    settings: AlertSettings,
    store: RwLock<AlertStore>,
    alert_callbacks: RwLock<Vec<AlertCallback>>,
    evaluations: AtomicU64,
}

impl AlertManager {
    /// Create a new alert manager with no rules
    pub fn new(settings: AlertSettings) -> Self {
        Self {
            settings,
            store: RwLock::new(AlertStore::default()),
            alert_callbacks: RwLock::new(Vec::new()),
            evaluations: AtomicU64::new(0),
        }
    }

    /// Replace the rule set
    pub async fn install_rules(&self, rules: Vec<AlertRule>) {
        self.store.write().await.rules = rules;
    }

    pub async fn rules(&self) -> Vec<AlertRule> {
        self.store.read().await.rules.clone()
    }

    /// Enable or disable a rule; returns false when no rule has that id
    pub async fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> bool {
        let mut store = self.store.write().await;
        match store.rules.iter_mut().find(|r| r.id == rule_id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Register an alert callback
    pub async fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.alert_callbacks.write().await.push(Box::new(callback));
    }

    /// One evaluation cycle: read the latest snapshots and checker states,
    /// evaluate, then prune expired alerts
    pub async fn run_cycle(&self, metrics: &MetricsCollector, checkers: &CheckerMap) {
        let snapshots = metrics.get_all_metrics().await;
        let checker_list: Vec<_> = checkers.read().await.values().cloned().collect();
        let mut statuses = HashMap::with_capacity(checker_list.len());
        for checker in checker_list {
            statuses.insert(checker.integration_id().to_string(), checker.status().await);
        }

        self.evaluate(&snapshots, &statuses).await;
        let pruned = self.cleanup_resolved().await;
        if pruned > 0 {
            log::debug!("Pruned {} expired alerts", pruned);
        }
    }

    /// Apply every enabled rule to every integration. Returns the alerts
    /// created by this pass.
    pub async fn evaluate(
        &self,
        snapshots: &HashMap<String, IntegrationMetrics>,
        statuses: &HashMap<String, HealthStatus>,
    ) -> Vec<Alert> {
        let now = Utc::now();
        let integrations: BTreeSet<&String> = snapshots.keys().chain(statuses.keys()).collect();
        let mut created = Vec::new();

        {
            let mut store = self.store.write().await;
            let rules: Vec<AlertRule> = store.rules.iter().filter(|r| r.enabled).cloned().collect();

            for rule in &rules {
                for integration_id in &integrations {
                    let metrics = snapshots.get(*integration_id);
                    let status = statuses.get(*integration_id).copied();

                    match rule.condition.evaluate(rule.threshold, metrics, status) {
                        RuleOutcome::Breached(value) => {
                            if self.settings.deduplicate
                                && store.has_firing(integration_id, &rule.id)
                            {
                                continue;
                            }
                            let name = metrics
                                .map(|m| m.display_name.as_str())
                                .unwrap_or(integration_id.as_str());
                            let mut alert = Alert::new(
                                integration_id,
                                &rule.id,
                                rule.severity,
                                format!("{}: {}", rule.name, name),
                                rule.condition.describe(name, value, rule.threshold),
                                now,
                            );
                            alert.metadata.extend(rule.labels.clone());
                            alert
                                .metadata
                                .insert("current_value".to_string(), format!("{:.2}", value));
                            alert
                                .metadata
                                .insert("threshold".to_string(), format!("{:.2}", rule.threshold));
                            alert.metadata.insert(
                                "duration_secs".to_string(),
                                rule.duration.as_secs().to_string(),
                            );
                            if let Some(m) = metrics {
                                alert.metadata.insert("category".to_string(), m.category.clone());
                            }
                            alert
                                .annotations
                                .insert("rule_name".to_string(), rule.name.clone());

                            store.alerts.push(alert.clone());
                            created.push(alert);
                        }
                        RuleOutcome::Clear(_) if self.settings.deduplicate => {
                            store.resolve_matching(integration_id, &rule.id, now);
                        }
                        RuleOutcome::Clear(_) | RuleOutcome::NoData => {}
                    }
                }
            }
            store.last_evaluation = Some(now);
        }

        self.evaluations.fetch_add(1, Ordering::Relaxed);
        for alert in &created {
            self.notify(alert).await;
        }
        created
    }

    /// Raise the alert for an integration that just crossed its failure
    /// threshold. With deduplication an already firing one suppresses it.
    pub async fn raise_integration_failure(
        &self,
        health: &HealthSnapshot,
        error: &str,
    ) -> Option<Alert> {
        let now = Utc::now();
        let mut alert = Alert::new(
            &health.integration_id,
            INTEGRATION_FAILURE_RULE_ID,
            AlertSeverity::High,
            format!("Integration Failure: {}", health.display_name),
            format!(
                "{} failed {} consecutive health checks: {}",
                health.display_name, health.failure_count, error
            ),
            now,
        );
        alert
            .metadata
            .insert("category".to_string(), health.category.clone());
        alert.metadata.insert(
            "failure_count".to_string(),
            health.failure_count.to_string(),
        );
        alert
            .metadata
            .insert("last_error".to_string(), error.to_string());

        {
            let mut store = self.store.write().await;
            if self.settings.deduplicate
                && store.has_firing(&health.integration_id, INTEGRATION_FAILURE_RULE_ID)
            {
                return None;
            }
            store.alerts.push(alert.clone());
        }

        self.notify(&alert).await;
        Some(alert)
    }

    /// Resolve the firing failure alerts of a recovered integration
    pub async fn resolve_integration_failure(&self, integration_id: &str) -> usize {
        self.store.write().await.resolve_matching(
            integration_id,
            INTEGRATION_FAILURE_RULE_ID,
            Utc::now(),
        )
    }

    pub async fn resolve_alert(&self, alert_id: &str) -> MonitorResult<()> {
        self.close_alert(alert_id, AlertStatus::Resolved).await
    }

    /// Silence an alert. It stops counting as active and ages out like a
    /// resolved one.
    pub async fn silence_alert(&self, alert_id: &str) -> MonitorResult<()> {
        self.close_alert(alert_id, AlertStatus::Silenced).await
    }

    async fn close_alert(&self, alert_id: &str, status: AlertStatus) -> MonitorResult<()> {
        let mut store = self.store.write().await;
        let alert = store
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| MonitorError::UnknownAlert(alert_id.to_string()))?;
        alert.close(status, Utc::now());
        Ok(())
    }

    /// Drop non-firing alerts whose resolution is older than the retention
    /// period. Returns how many were removed.
    pub async fn cleanup_resolved(&self) -> usize {
        let Some(cutoff) = retention_cutoff(Utc::now(), self.settings.retention) else {
            return 0;
        };
        let mut store = self.store.write().await;
        let before = store.alerts.len();
        store.alerts.retain(|a| {
            a.is_firing() || a.resolved_at.map_or(true, |resolved| resolved > cutoff)
        });
        before - store.alerts.len()
    }

    /// Firing alerts
    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        let store = self.store.read().await;
        store.alerts.iter().filter(|a| a.is_firing()).cloned().collect()
    }

    /// Every alert still held, in creation order
    pub async fn get_alerts(&self) -> Vec<Alert> {
        self.store.read().await.alerts.clone()
    }

    pub async fn last_evaluation(&self) -> Option<DateTime<Utc>> {
        self.store.read().await.last_evaluation
    }

    pub fn evaluations_completed(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    async fn notify(&self, alert: &Alert) {
        match alert.severity {
            AlertSeverity::Low => log::info!("[{}] {}", alert.integration_id, alert.description),
            AlertSeverity::Medium => log::warn!("[{}] {}", alert.integration_id, alert.description),
            AlertSeverity::High => log::error!("[{}] {}", alert.integration_id, alert.description),
            AlertSeverity::Critical => {
                log::error!("[CRITICAL] [{}] {}", alert.integration_id, alert.description)
            }
        }

        let callbacks = self.alert_callbacks.read().await;
        for callback in callbacks.iter() {
            callback(alert);
        }
    }
}
