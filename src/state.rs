use std::sync::Arc;

use crate::config::AppConfig;
use crate::storage::{self, StorageClient};
use crate::store::{PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    /// Connects to the database, applies migrations and opens media storage.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store = PgStore::connect(&config.database_url).await?;
        store.migrate().await?;
        let storage = storage::from_config(&config.media).await?;

        Ok(Self::from_parts(Arc::new(store), Arc::new(config), storage))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            store,
            config,
            storage,
        }
    }
}

#[cfg(test)]
pub use fake::FakeStorage;
