use serde::{Deserialize, Serialize};

/// Static description of one integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationDefinition {
    pub id: String,
    pub display_name: String,
    /// e.g. "marketplace", "erp", "cargo"
    pub category: String,
    pub is_active: bool,
}

impl IntegrationDefinition {
    pub fn new(id: &str, display_name: &str, category: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            category: category.to_string(),
            is_active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Source of the integrations the monitor should supervise
pub trait IntegrationCatalog: Send + Sync {
    /// Every known integration, active or not
    fn list_integrations(&self) -> Vec<IntegrationDefinition>;

    /// Look up one integration by id
    fn get_integration(&self, id: &str) -> Option<IntegrationDefinition> {
        self.list_integrations().into_iter().find(|i| i.id == id)
    }

    /// All integrations in a category
    fn list_by_category(&self, category: &str) -> Vec<IntegrationDefinition> {
        self.list_integrations()
            .into_iter()
            .filter(|i| i.category == category)
            .collect()
    }
}

/// In-memory catalog
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    integrations: Vec<IntegrationDefinition>,
}

impl StaticCatalog {
    pub fn new(integrations: Vec<IntegrationDefinition>) -> Self {
        Self { integrations }
    }

    /// Add or replace an integration
    pub fn insert(&mut self, definition: IntegrationDefinition) {
        if let Some(existing) = self.integrations.iter_mut().find(|i| i.id == definition.id) {
            *existing = definition;
        } else {
            self.integrations.push(definition);
        }
    }
}

impl IntegrationCatalog for StaticCatalog {
    fn list_integrations(&self) -> Vec<IntegrationDefinition> {
        self.integrations.clone()
    }
}
