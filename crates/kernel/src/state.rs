//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::category::CategoryService;
use crate::config::{Config, SequenceStrategy};
use crate::db;
use crate::entity::EntityRegistry;
use crate::sequence::{
    CounterSequenceGenerator, ScanningSequenceGenerator, SequenceGenerator, SequenceRegistry,
    default_sequences,
};
use crate::store::{DocumentStore, MemoryStore, PgDocumentStore};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// PostgreSQL pool, when the store is database-backed.
    db: Option<PgPool>,

    /// Record services keyed by entity name.
    entities: EntityRegistry,

    /// Document-number generator.
    sequences: Arc<dyn SequenceGenerator>,

    /// Category tree reader.
    categories: CategoryService,

    /// Page size for list requests that omit `limit`.
    default_page_limit: u64,
}

impl AppState {
    /// Connect to storage and wire up services.
    pub async fn new(config: &Config) -> Result<Self> {
        let (store, db): (Arc<dyn DocumentStore>, Option<PgPool>) = match &config.database_url {
            Some(url) => {
                let pool = db::create_pool(url, config.database_max_connections).await?;
                let store = PgDocumentStore::new(pool.clone());
                store
                    .ensure_schema()
                    .await
                    .context("failed to prepare document tables")?;
                info!("using PostgreSQL document store");
                (Arc::new(store), Some(pool))
            }
            None => {
                info!("DATABASE_URL not set, using in-memory document store");
                (Arc::new(MemoryStore::new()), None)
            }
        };

        Ok(Self::build(store, db, config))
    }

    /// State over an existing store, without a database pool.
    pub fn with_store(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self::build(store, None, config)
    }

    fn build(store: Arc<dyn DocumentStore>, db: Option<PgPool>, config: &Config) -> Self {
        let registry = SequenceRegistry::new(default_sequences());
        let sequences: Arc<dyn SequenceGenerator> = match config.sequence_strategy {
            SequenceStrategy::Scan => {
                Arc::new(ScanningSequenceGenerator::new(store.clone(), registry))
            }
            SequenceStrategy::Counter => {
                Arc::new(CounterSequenceGenerator::new(store.clone(), registry))
            }
        };

        Self {
            inner: Arc::new(AppStateInner {
                entities: EntityRegistry::with_defaults(store.clone()),
                categories: CategoryService::new(store),
                sequences,
                db,
                default_page_limit: config.default_page_limit,
            }),
        }
    }

    /// Get the entity registry.
    pub fn entities(&self) -> &EntityRegistry {
        &self.inner.entities
    }

    /// Get the document-number generator.
    pub fn sequences(&self) -> &Arc<dyn SequenceGenerator> {
        &self.inner.sequences
    }

    /// Get the category service.
    pub fn categories(&self) -> &CategoryService {
        &self.inner.categories
    }

    pub fn default_page_limit(&self) -> u64 {
        self.inner.default_page_limit
    }

    /// Name of the active storage backend.
    pub fn backend(&self) -> &'static str {
        if self.inner.db.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }

    /// Check storage connectivity. The in-memory store is always healthy.
    pub async fn store_healthy(&self) -> bool {
        match &self.inner.db {
            Some(pool) => db::check_health(pool).await,
            None => true,
        }
    }
}
