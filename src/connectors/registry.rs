use crate::traits::IntegrationProvider;
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent map from integration id to its provider
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<DashMap<String, Arc<dyn IntegrationProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one for the id
    pub fn register(
        &self,
        integration_id: &str,
        provider: Arc<dyn IntegrationProvider>,
    ) -> Option<Arc<dyn IntegrationProvider>> {
        self.providers.insert(integration_id.to_string(), provider)
    }

    pub fn unregister(&self, integration_id: &str) -> Option<Arc<dyn IntegrationProvider>> {
        self.providers.remove(integration_id).map(|(_, provider)| provider)
    }

    pub fn get(&self, integration_id: &str) -> Option<Arc<dyn IntegrationProvider>> {
        self.providers.get(integration_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, integration_id: &str) -> bool {
        self.providers.contains_key(integration_id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
