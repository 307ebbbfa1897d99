use crate::config::{CacheConfig, StorageBackend, StorageConfig};
use crate::error::{AppError, Result};
use crate::pocketbase::PocketBaseClient;
use crate::state::{CachedStore, InMemoryStore, KnowledgeStore, PocketBaseStore, SledStore};
use std::sync::Arc;
use std::time::Duration;

/// Create a knowledge store based on configuration, wrapped in the query cache when enabled
pub async fn create_store(
    storage: &StorageConfig,
    cache: &CacheConfig,
) -> Result<Arc<dyn KnowledgeStore>> {
    let store: Arc<dyn KnowledgeStore> = match storage.backend {
        StorageBackend::Pocketbase => {
            tracing::info!(url = %storage.pocketbase_url, "Initializing PocketBase storage backend");

            let client = PocketBaseClient::from_config(storage)?;
            if let Err(e) = client.authenticate().await {
                tracing::warn!(error = %e, "PocketBase authentication failed, will retry on first request");
            }
            Arc::new(PocketBaseStore::new(Arc::new(client)))
        }

        StorageBackend::Sled => {
            let path = storage.path.as_ref().ok_or_else(|| {
                AppError::Configuration("Sled backend requires 'path' configuration".to_string())
            })?;

            tracing::info!(path = ?path, "Initializing Sled storage backend");
            Arc::new(SledStore::new(path)?)
        }

        StorageBackend::Memory => create_in_memory_store(),
    };

    if !cache.enabled {
        return Ok(store);
    }

    tracing::info!(
        ttl_secs = cache.ttl_secs,
        max_capacity = cache.max_capacity,
        "Query cache enabled"
    );
    Ok(Arc::new(CachedStore::new(
        store,
        cache.max_capacity,
        Duration::from_secs(cache.ttl_secs),
    )))
}

/// Create an in-memory store (for testing and development)
pub fn create_in_memory_store() -> Arc<dyn KnowledgeStore> {
    tracing::info!("Initializing in-memory storage backend");
    Arc::new(InMemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::IncidentFilter;
    use tempfile::TempDir;

    fn storage(backend: StorageBackend, path: Option<std::path::PathBuf>) -> StorageConfig {
        StorageConfig {
            backend,
            pocketbase_url: "http://127.0.0.1:8090".to_string(),
            admin_email: None,
            admin_password_env: "KB_PB_PASSWORD".to_string(),
            timeout_secs: 1,
            path,
        }
    }

    #[tokio::test]
    async fn test_create_sled_store() {
        let temp_dir = TempDir::new().unwrap();
        let config = storage(StorageBackend::Sled, Some(temp_dir.path().to_path_buf()));

        let store = create_store(&config, &CacheConfig::default()).await.unwrap();
        assert_eq!(store.backend_name(), "sled");
        assert!(store
            .list_incidents(&IncidentFilter::default(), 1, 10)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_create_memory_store_without_cache() {
        let cache = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        let store = create_store(&storage(StorageBackend::Memory, None), &cache)
            .await
            .unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_sled_requires_path() {
        let result = create_store(&storage(StorageBackend::Sled, None), &CacheConfig::default()).await;
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }
}
