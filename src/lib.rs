pub mod config;
pub mod connectors;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod monitoring;
pub mod traits;

pub use config::MonitorConfig;
pub use connectors::{HttpProvider, ProviderRegistry, SimulatedProvider};
pub use error::{MonitorError, MonitorResult, ProviderError};
pub use logging::init_logging;
pub use monitor::{Monitor, MonitoringStatus};
pub use monitoring::{
    AggregatedMetrics, Alert, AlertCondition, AlertRule, AlertSeverity, AlertStatus,
    CategoryMetrics, CheckOutcome, ErrorRecord, HealthSnapshot, HealthStatus, IntegrationMetrics,
};
pub use traits::{
    IntegrationCatalog, IntegrationDefinition, IntegrationProvider, ProviderMetrics,
    StaticCatalog,
};
