use crate::error::{MonitorError, MonitorResult};
use crate::monitoring::health::HealthCheckConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_ALERT_EVALUATION_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_FAILURES: u32 = 5;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_ALERT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_METRICS_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
/// Upper bound for loop periods, the check timeout and the retry delay
pub const MAX_SCHEDULE_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Monitor configuration.
///
/// Durations are (de)serialized as seconds and may be fractional, so
/// `{"retry_delay": 0.25}` is a 250ms delay. Missing fields take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    #[serde(with = "duration_secs")]
    pub health_check_interval: Duration,
    #[serde(with = "duration_secs")]
    pub metrics_interval: Duration,
    #[serde(with = "duration_secs")]
    pub alert_evaluation_interval: Duration,
    /// Per-attempt bound on a provider call
    #[serde(with = "duration_secs")]
    pub check_timeout: Duration,
    /// Consecutive failed checks before an integration is unhealthy
    pub max_failures: u32,
    /// Extra attempts after the first one fails
    pub retry_attempts: u32,
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,
    #[serde(with = "duration_secs")]
    pub alert_retention: Duration,
    #[serde(with = "duration_secs")]
    pub metrics_retention: Duration,
    pub alert_on_failure: bool,
    pub alert_on_recovery: bool,
    pub enable_performance_metrics: bool,
    pub enable_business_metrics: bool,
    /// Keep at most one firing alert per (integration, rule)
    pub deduplicate_alerts: bool,
    /// Percent
    pub error_rate_threshold: f64,
    pub response_time_threshold_ms: f64,
    /// Percent
    pub availability_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            metrics_interval: DEFAULT_METRICS_INTERVAL,
            alert_evaluation_interval: DEFAULT_ALERT_EVALUATION_INTERVAL,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            max_failures: DEFAULT_MAX_FAILURES,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            alert_retention: DEFAULT_ALERT_RETENTION,
            metrics_retention: DEFAULT_METRICS_RETENTION,
            alert_on_failure: true,
            alert_on_recovery: true,
            enable_performance_metrics: true,
            enable_business_metrics: true,
            deduplicate_alerts: false,
            error_rate_threshold: 10.0,
            response_time_threshold_ms: 5000.0,
            availability_threshold: 95.0,
        }
    }
}

impl MonitorConfig {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> MonitorResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> MonitorResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> MonitorResult<()> {
        let intervals = [
            ("health_check_interval", self.health_check_interval),
            ("metrics_interval", self.metrics_interval),
            ("alert_evaluation_interval", self.alert_evaluation_interval),
            ("check_timeout", self.check_timeout),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(MonitorError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        for (name, value) in intervals
            .into_iter()
            .chain([("retry_delay", self.retry_delay)])
        {
            if value > MAX_SCHEDULE_DURATION {
                return Err(MonitorError::InvalidConfig(format!(
                    "{} must not exceed {:?}, got {:?}",
                    name, MAX_SCHEDULE_DURATION, value
                )));
            }
        }

        if self.max_failures == 0 {
            return Err(MonitorError::InvalidConfig(
                "max_failures must be at least 1".to_string(),
            ));
        }

        for (name, value) in [
            ("error_rate_threshold", self.error_rate_threshold),
            ("availability_threshold", self.availability_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(MonitorError::InvalidConfig(format!(
                    "{} must be within 0..=100, got {}",
                    name, value
                )));
            }
        }

        if !self.response_time_threshold_ms.is_finite() || self.response_time_threshold_ms < 0.0 {
            return Err(MonitorError::InvalidConfig(format!(
                "response_time_threshold_ms must be a non-negative number, got {}",
                self.response_time_threshold_ms
            )));
        }

        Ok(())
    }

    /// Per-integration check settings derived from the global options
    pub fn health_check_config(&self) -> HealthCheckConfig {
        HealthCheckConfig {
            enabled: true,
            interval: self.health_check_interval,
            timeout: self.check_timeout,
            max_failures: self.max_failures,
            retry_attempts: self.retry_attempts,
            retry_delay: self.retry_delay,
            alert_on_failure: self.alert_on_failure,
            alert_on_recovery: self.alert_on_recovery,
        }
    }
}

/// Serde adapter storing a `Duration` as (fractional) seconds
pub(crate) mod duration_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(de::Error::custom(format!(
                "duration must be a non-negative number of seconds, got {}",
                secs
            )));
        }
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}
