use crate::config::MonitorConfig;
use crate::monitoring::health::{HealthChecker, HealthSnapshot, HealthStatus};
use crate::monitoring::{retention_cutoff, CheckerMap};
use crate::traits::ProviderMetrics;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::future::join_all;
use log::{debug, warn};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Metric type of the point appended every collection cycle
pub const STATUS_METRIC: &str = "status";

/// One time-series datapoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub metric_type: String,
}

/// Provider-reported resource figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub throughput_rps: Option<f64>,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub network_io: Option<f64>,
    pub disk_io: Option<f64>,
    pub cache_hit_rate: Option<f64>,
    pub queue_size: Option<u64>,
    pub active_connections: Option<u64>,
}

/// Provider-reported business figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessMetrics {
    pub products_synced: Option<u64>,
    pub orders_processed: Option<u64>,
    pub transaction_volume: Option<Decimal>,
    pub revenue: Option<Decimal>,
    pub conversion_rate: Option<f64>,
    pub customer_count: Option<u64>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

/// Latest snapshot for one integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationMetrics {
    pub integration_id: String,
    pub display_name: String,
    pub category: String,
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub total_checks: u64,
    pub avg_response_time_ms: f64,
    /// Percent
    pub availability: f64,
    /// Percent
    pub error_rate: f64,
    pub request_count: u64,
    pub error_count: u64,
    pub performance: Option<PerformanceMetrics>,
    pub business: Option<BusinessMetrics>,
    pub time_series: VecDeque<TimeSeriesPoint>,
}

impl IntegrationMetrics {
    /// Build a snapshot from checker state and provider counters. Sub-records
    /// are only filled when enabled.
    pub fn from_sources(
        health: &HealthSnapshot,
        provider: &ProviderMetrics,
        settings: &MetricsSettings,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            integration_id: health.integration_id.clone(),
            display_name: health.display_name.clone(),
            category: health.category.clone(),
            timestamp,
            status: health.status,
            total_checks: health.metrics.total_checks,
            avg_response_time_ms: health.metrics.avg_response_time_ms,
            availability: health.availability(),
            error_rate: health.error_rate(),
            request_count: read_u64(provider, "request_count").unwrap_or(0),
            error_count: read_u64(provider, "error_count").unwrap_or(0),
            performance: settings
                .enable_performance
                .then(|| extract_performance(provider)),
            business: settings.enable_business.then(|| extract_business(provider)),
            time_series: VecDeque::new(),
        }
    }

    /// Append a point and drop everything older than the cutoff
    fn push_point(&mut self, point: TimeSeriesPoint, cutoff: Option<DateTime<Utc>>) {
        self.time_series.push_back(point);
        if let Some(cutoff) = cutoff {
            self.time_series.retain(|p| p.timestamp > cutoff);
        }
    }
}

/// Per-category rollup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub count: u64,
    pub healthy_count: u64,
    pub unhealthy_count: u64,
    pub avg_response_time_ms: f64,
    pub total_requests: u64,
    pub total_errors: u64,
    /// total_errors / total_requests, percent
    pub error_rate: f64,
    /// Mean availability of the category's integrations, percent
    pub availability: f64,
}

/// Fleet-wide rollup, rebuilt every cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub timestamp: Option<DateTime<Utc>>,
    pub total_integrations: u64,
    pub healthy_integrations: u64,
    pub unhealthy_integrations: u64,
    pub degraded_integrations: u64,
    pub unknown_integrations: u64,
    pub maintenance_integrations: u64,
    /// Mean availability over integrations checked at least once
    pub overall_availability: f64,
    /// Mean error rate over integrations checked at least once
    pub overall_error_rate: f64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub categories: HashMap<String, CategoryMetrics>,
}

/// Fold every snapshot into a fresh aggregate
pub fn aggregate<'a>(
    snapshots: impl IntoIterator<Item = &'a IntegrationMetrics>,
    timestamp: DateTime<Utc>,
) -> AggregatedMetrics {
    let mut agg = AggregatedMetrics {
        timestamp: Some(timestamp),
        ..AggregatedMetrics::default()
    };
    let mut checked = 0u64;
    let mut availability_sum = 0.0;
    let mut error_rate_sum = 0.0;

    for snapshot in snapshots {
        agg.total_integrations += 1;
        agg.total_requests += snapshot.request_count;
        agg.total_errors += snapshot.error_count;
        match snapshot.status {
            HealthStatus::Healthy => agg.healthy_integrations += 1,
            HealthStatus::Unhealthy => agg.unhealthy_integrations += 1,
            HealthStatus::Degraded => agg.degraded_integrations += 1,
            HealthStatus::Unknown => agg.unknown_integrations += 1,
            HealthStatus::Maintenance => agg.maintenance_integrations += 1,
        }
        if snapshot.total_checks > 0 {
            checked += 1;
            availability_sum += snapshot.availability;
            error_rate_sum += snapshot.error_rate;
        }

        let category = agg.categories.entry(snapshot.category.clone()).or_default();
        category.count += 1;
        let n = category.count as f64;
        category.avg_response_time_ms =
            ((n - 1.0) * category.avg_response_time_ms + snapshot.avg_response_time_ms) / n;
        category.availability = ((n - 1.0) * category.availability + snapshot.availability) / n;
        category.total_requests += snapshot.request_count;
        category.total_errors += snapshot.error_count;
        match snapshot.status {
            HealthStatus::Healthy => category.healthy_count += 1,
            HealthStatus::Unhealthy => category.unhealthy_count += 1,
            _ => {}
        }
    }

    for category in agg.categories.values_mut() {
        if category.total_requests > 0 {
            category.error_rate =
                category.total_errors as f64 / category.total_requests as f64 * 100.0;
        }
    }

    if checked > 0 {
        agg.overall_availability = availability_sum / checked as f64;
        agg.overall_error_rate = error_rate_sum / checked as f64;
    }

    agg
}

/// Collector options
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSettings {
    pub retention: Duration,
    pub enable_performance: bool,
    pub enable_business: bool,
    /// Bound on a provider's `get_metrics` call
    pub provider_timeout: Duration,
}

impl From<&MonitorConfig> for MetricsSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            retention: config.metrics_retention,
            enable_performance: config.enable_performance_metrics,
            enable_business: config.enable_business_metrics,
            provider_timeout: config.check_timeout,
        }
    }
}

#[derive(Debug, Default)]
struct MetricsStore {
    snapshots: HashMap<String, IntegrationMetrics>,
    aggregated: AggregatedMetrics,
    last_collection: Option<DateTime<Utc>>,
}

/// Periodically snapshots every health checker and provider
pub struct MetricsCollector {
    checkers: CheckerMap,
    settings: MetricsSettings,
    store: RwLock<MetricsStore>,
    cycles: AtomicU64,
}

impl MetricsCollector {
    pub fn new(checkers: CheckerMap, settings: MetricsSettings) -> Self {
        Self {
            checkers,
            settings,
            store: RwLock::new(MetricsStore::default()),
            cycles: AtomicU64::new(0),
        }
    }

    /// Refresh every snapshot, then rebuild the aggregate
    pub async fn collect_metrics(&self) {
        let checkers: Vec<Arc<HealthChecker>> =
            self.checkers.read().await.values().cloned().collect();
        let now = Utc::now();

        let fresh = join_all(
            checkers
                .iter()
                .map(|checker| self.build_snapshot(checker.as_ref(), now)),
        )
        .await;

        let cutoff = retention_cutoff(now, self.settings.retention);
        let mut store = self.store.write().await;
        // Integrations no longer monitored drop out here
        let mut previous = std::mem::take(&mut store.snapshots);
        for mut snapshot in fresh {
            if let Some(old) = previous.remove(&snapshot.integration_id) {
                snapshot.time_series = old.time_series;
            }
            snapshot.push_point(
                TimeSeriesPoint {
                    timestamp: now,
                    value: snapshot.status.score(),
                    metric_type: STATUS_METRIC.to_string(),
                },
                cutoff,
            );
            store
                .snapshots
                .insert(snapshot.integration_id.clone(), snapshot);
        }
        if !previous.is_empty() {
            debug!("Dropped metrics for {} unmonitored integrations", previous.len());
        }

        store.aggregated = aggregate(store.snapshots.values(), now);
        store.last_collection = Some(now);
        self.cycles.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Collected metrics for {} integrations ({} healthy, {} unhealthy)",
            store.aggregated.total_integrations,
            store.aggregated.healthy_integrations,
            store.aggregated.unhealthy_integrations
        );
    }

    async fn build_snapshot(&self, checker: &HealthChecker, now: DateTime<Utc>) -> IntegrationMetrics {
        let health = checker.snapshot().await;
        let provider_metrics = match tokio::time::timeout(
            self.settings.provider_timeout,
            checker.provider().get_metrics(),
        )
        .await
        {
            Ok(Ok(metrics)) => metrics,
            Ok(Err(e)) => {
                warn!(
                    "Failed to get metrics for {}: {}",
                    checker.integration_id(),
                    e
                );
                ProviderMetrics::new()
            }
            Err(_) => {
                warn!(
                    "Metrics request for {} timed out after {:?}",
                    checker.integration_id(),
                    self.settings.provider_timeout
                );
                ProviderMetrics::new()
            }
        };
        IntegrationMetrics::from_sources(&health, &provider_metrics, &self.settings, now)
    }

    /// Forget every snapshot and the aggregate
    pub async fn reset(&self) {
        let mut store = self.store.write().await;
        store.snapshots.clear();
        store.aggregated = AggregatedMetrics::default();
        store.last_collection = None;
    }

    pub async fn get_metrics(&self, integration_id: &str) -> Option<IntegrationMetrics> {
        self.store.read().await.snapshots.get(integration_id).cloned()
    }

    pub async fn get_all_metrics(&self) -> HashMap<String, IntegrationMetrics> {
        self.store.read().await.snapshots.clone()
    }

    pub async fn get_aggregated_metrics(&self) -> AggregatedMetrics {
        self.store.read().await.aggregated.clone()
    }

    pub async fn last_collection(&self) -> Option<DateTime<Utc>> {
        self.store.read().await.last_collection
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

fn read_f64(metrics: &ProviderMetrics, key: &str) -> Option<f64> {
    metrics.get(key).and_then(|v| v.as_f64())
}

fn read_u64(metrics: &ProviderMetrics, key: &str) -> Option<u64> {
    metrics.get(key).and_then(|v| v.as_u64())
}

fn read_decimal(metrics: &ProviderMetrics, key: &str) -> Option<Decimal> {
    match metrics.get(key)? {
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        serde_json::Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        _ => None,
    }
}

/// RFC 3339 string or unix seconds
fn read_timestamp(metrics: &ProviderMetrics, key: &str) -> Option<DateTime<Utc>> {
    match metrics.get(key)? {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

fn extract_performance(metrics: &ProviderMetrics) -> PerformanceMetrics {
    PerformanceMetrics {
        throughput_rps: read_f64(metrics, "throughput_rps"),
        cpu_usage: read_f64(metrics, "cpu_usage"),
        memory_usage: read_f64(metrics, "memory_usage"),
        network_io: read_f64(metrics, "network_io"),
        disk_io: read_f64(metrics, "disk_io"),
        cache_hit_rate: read_f64(metrics, "cache_hit_rate"),
        queue_size: read_u64(metrics, "queue_size"),
        active_connections: read_u64(metrics, "active_connections"),
    }
}

fn extract_business(metrics: &ProviderMetrics) -> BusinessMetrics {
    BusinessMetrics {
        products_synced: read_u64(metrics, "products_synced"),
        orders_processed: read_u64(metrics, "orders_processed"),
        transaction_volume: read_decimal(metrics, "transaction_volume"),
        revenue: read_decimal(metrics, "revenue"),
        conversion_rate: read_f64(metrics, "conversion_rate"),
        customer_count: read_u64(metrics, "customer_count"),
        last_sync_time: read_timestamp(metrics, "last_sync_time"),
    }
}
