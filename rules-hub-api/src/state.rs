//! Application state shared across handlers

use rules_hub_catalog::{CatalogProvider, CatalogSession, StaticCatalog};
use rules_hub_storage::{FileTransport, FsTransport, InMemoryStorage, RuleRuntime};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::config::{ApiConfig, StorageKind};
use crate::ApiError;

/// Shared application state
pub struct AppState {
    pub transport: Arc<dyn FileTransport>,
    pub runtime: Arc<dyn RuleRuntime>,
    pub catalog: RwLock<CatalogSession>,
    /// One editing session at a time
    pub edit_lock: Mutex<()>,
}

impl AppState {
    /// In-memory files and runtime with an empty catalog
    pub fn new() -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        Self::with_backends(storage.clone(), storage, Arc::new(StaticCatalog::default()), 0)
    }

    pub fn with_backends(
        transport: Arc<dyn FileTransport>,
        runtime: Arc<dyn RuleRuntime>,
        catalog: Arc<dyn CatalogProvider>,
        cache_size: usize,
    ) -> Self {
        Self {
            transport,
            runtime,
            catalog: RwLock::new(CatalogSession::new(catalog, cache_size)),
            edit_lock: Mutex::new(()),
        }
    }

    /// Build the backends selected by the configuration
    pub async fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        let catalog: Arc<dyn CatalogProvider> = match &config.catalog_file {
            Some(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    ApiError::Config(format!("Cannot read catalog {}: {}", path.display(), e))
                })?;
                let catalog: StaticCatalog = serde_json::from_str(&text).map_err(|e| {
                    ApiError::Config(format!("Invalid catalog {}: {}", path.display(), e))
                })?;
                Arc::new(catalog)
            }
            None => Arc::new(StaticCatalog::default()),
        };

        let (transport, runtime): Backends = match config.storage {
            StorageKind::Memory => {
                tracing::info!("Initializing InMemory storage...");
                let storage = Arc::new(InMemoryStorage::new());
                let transport: Arc<dyn FileTransport> = storage.clone();
                let runtime: Arc<dyn RuleRuntime> = storage;
                (transport, runtime)
            }
            StorageKind::Fs => {
                tracing::info!("Serving rule files from {}", config.rules_dir.display());
                let transport: Arc<dyn FileTransport> =
                    Arc::new(FsTransport::new(&config.rules_dir));
                let runtime: Arc<dyn RuleRuntime> =
                    Arc::new(InMemoryStorage::reading_from(transport.clone()));
                (transport, runtime)
            }
            StorageKind::Http => http_backends(config)?,
        };

        Ok(Self::with_backends(transport, runtime, catalog, config.catalog_cache_size))
    }
}

/// Rule file transport and rule runtime
type Backends = (Arc<dyn FileTransport>, Arc<dyn RuleRuntime>);

#[cfg(feature = "http")]
fn http_backends(config: &ApiConfig) -> Result<Backends, ApiError> {
    use rules_hub_storage::{HttpConfig, HttpRuntime, HttpTransport};

    let http = HttpConfig {
        base_url: config.runtime_url.clone(),
        ..HttpConfig::default()
    };
    let transport: Arc<dyn FileTransport> = Arc::new(HttpTransport::new(http.clone())?);
    let runtime: Arc<dyn RuleRuntime> = Arc::new(HttpRuntime::new(http)?);
    Ok((transport, runtime))
}

#[cfg(not(feature = "http"))]
fn http_backends(_config: &ApiConfig) -> Result<Backends, ApiError> {
    Err(ApiError::Config(
        "STORAGE_TYPE=http requires the 'http' feature".to_string(),
    ))
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
