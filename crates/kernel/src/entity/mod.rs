//! Entity registry.
//!
//! An entity is a named collection plus its query configuration. All
//! entities share one [`RecordService`] implementation; only the
//! [`EntityDefinition`] differs.

mod definitions;
mod service;
mod statistics;

pub use definitions::default_entities;
pub use service::{ListPage, RecordService, ServiceError};
pub use statistics::{StatisticsProvider, StatusBreakdown};

use std::sync::Arc;

use dashmap::DashMap;

use crate::query::QuerySchema;
use crate::store::DocumentStore;

/// Configuration of one entity.
#[derive(Clone)]
pub struct EntityDefinition {
    pub schema: QuerySchema,
    pub statistics: Option<Arc<dyn StatisticsProvider>>,
}

impl EntityDefinition {
    pub fn new(schema: QuerySchema) -> Self {
        Self {
            schema,
            statistics: None,
        }
    }

    pub fn with_statistics(mut self, provider: Arc<dyn StatisticsProvider>) -> Self {
        self.statistics = Some(provider);
        self
    }

    /// Route segment and collection name.
    pub fn name(&self) -> &str {
        &self.schema.collection
    }
}

/// Record services keyed by entity name.
#[derive(Clone)]
pub struct EntityRegistry {
    store: Arc<dyn DocumentStore>,
    services: Arc<DashMap<String, RecordService>>,
}

impl EntityRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            services: Arc::new(DashMap::new()),
        }
    }

    /// Registry populated with [`default_entities`].
    pub fn with_defaults(store: Arc<dyn DocumentStore>) -> Self {
        let registry = Self::new(store);
        for definition in default_entities() {
            registry.register(definition);
        }
        registry
    }

    /// Add or replace an entity.
    pub fn register(&self, definition: EntityDefinition) {
        let name = definition.name().to_string();
        let service = RecordService::new(self.store.clone(), definition);
        self.services.insert(name, service);
    }

    pub fn get(&self, name: &str) -> Option<RecordService> {
        self.services.get(name).map(|entry| entry.value().clone())
    }

    /// Registered entity names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
