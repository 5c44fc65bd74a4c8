pub mod catalog;
pub mod provider;

pub use catalog::{IntegrationCatalog, IntegrationDefinition, StaticCatalog};
pub use provider::{IntegrationProvider, ProviderMetrics};

#[cfg(test)]
pub use provider::MockIntegrationProvider;
