//! Queue Manager: named connections → live backends
//!
//! The manager is an ordinary value owned by the composition root and shared
//! by `Arc`. Each connection is built at most once, on first use, and cached
//! for the lifetime of the manager.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::backend::{QueueBackend, QueueError};
use crate::config::{ConnectionConfig, QueueConfig};
use crate::job::{JobId, JobRecord, Payload};
use crate::memory::{MemoryQueue, MemoryStore};
use crate::registry::JobRegistry;
use crate::sync::SyncQueue;

/// Build a backend for one connection entry
pub async fn connect(
    config: &ConnectionConfig,
    registry: &Arc<JobRegistry>,
) -> Result<Arc<dyn QueueBackend>, QueueError> {
    let backend: Arc<dyn QueueBackend> = match config {
        ConnectionConfig::Memory { prefix } => {
            Arc::new(MemoryQueue::new(MemoryStore::new(), prefix.clone()))
        }
        #[cfg(feature = "redis")]
        ConnectionConfig::Redis { url, prefix } => {
            Arc::new(crate::redis_store::RedisQueue::connect(url, prefix).await?)
        }
        #[cfg(feature = "sqlite")]
        ConnectionConfig::Database {
            url,
            table,
            max_connections,
        } => Arc::new(crate::database::DatabaseQueue::connect(url, table, *max_connections).await?),
        ConnectionConfig::Sync => Arc::new(SyncQueue::new(registry.clone())),
        #[allow(unreachable_patterns)]
        other => {
            return Err(QueueError::Configuration(format!(
                "driver '{}' is not compiled in",
                other.driver()
            )))
        }
    };
    Ok(backend)
}

pub struct QueueManager {
    config: QueueConfig,
    registry: Arc<JobRegistry>,
    drivers: Mutex<HashMap<String, Arc<dyn QueueBackend>>>,
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("default", &self.config.default)
            .field("connections", &self.config.connections.keys())
            .finish()
    }
}

impl QueueManager {
    pub fn new(config: QueueConfig, registry: Arc<JobRegistry>) -> Self {
        Self {
            config,
            registry,
            drivers: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-seed the cache with an already constructed backend
    pub async fn with_backend(self, name: &str, backend: Arc<dyn QueueBackend>) -> Self {
        self.drivers.lock().await.insert(name.to_string(), backend);
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn default_connection(&self) -> &str {
        &self.config.default
    }

    /// Backend for `name`, built and cached on first use
    pub async fn driver(&self, name: &str) -> Result<Arc<dyn QueueBackend>, QueueError> {
        // Holding the lock across connect keeps construction to one per name
        let mut drivers = self.drivers.lock().await;
        if let Some(backend) = drivers.get(name) {
            return Ok(backend.clone());
        }

        let config = self.config.connections.get(name).ok_or_else(|| {
            QueueError::Configuration(format!("Queue connection '{name}' not configured"))
        })?;

        let backend = connect(config, &self.registry).await?;
        info!(connection = name, driver = backend.name(), "Queue connection ready");

        drivers.insert(name.to_string(), backend.clone());
        Ok(backend)
    }

    /// Backend of the default connection
    pub async fn default_driver(&self) -> Result<Arc<dyn QueueBackend>, QueueError> {
        self.driver(&self.config.default).await
    }

    pub async fn push(
        &self,
        job_type: &str,
        payload: Payload,
        lane: &str,
    ) -> Result<JobId, QueueError> {
        self.default_driver()
            .await?
            .push(job_type, payload, lane)
            .await
    }

    pub async fn push_delayed(
        &self,
        job_type: &str,
        payload: Payload,
        delay: Duration,
        lane: &str,
    ) -> Result<JobId, QueueError> {
        self.default_driver()
            .await?
            .push_delayed(job_type, payload, delay, lane)
            .await
    }

    pub async fn pop(&self, lane: &str) -> Result<Option<JobRecord>, QueueError> {
        self.default_driver().await?.pop(lane).await
    }

    pub async fn size(&self, lane: &str) -> Result<u64, QueueError> {
        self.default_driver().await?.size(lane).await
    }

    pub async fn clear(&self, lane: &str) -> Result<(), QueueError> {
        self.default_driver().await?.clear(lane).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn memory_config() -> QueueConfig {
        let mut connections = BTreeMap::new();
        connections.insert(
            "memory".to_string(),
            ConnectionConfig::Memory {
                prefix: "test:".to_string(),
            },
        );
        connections.insert("sync".to_string(), ConnectionConfig::Sync);
        QueueConfig {
            default: "memory".to_string(),
            connections,
            ..QueueConfig::default()
        }
    }

    #[tokio::test]
    async fn test_unknown_connection_is_configuration_error() {
        let manager = QueueManager::new(memory_config(), Arc::new(JobRegistry::new()));
        let err = manager.driver("sqs").await.err().expect("should fail");
        assert!(matches!(err, QueueError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_driver_is_cached_per_name() {
        let manager = QueueManager::new(memory_config(), Arc::new(JobRegistry::new()));

        let first = manager.driver("memory").await.unwrap();
        let second = manager.driver("memory").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let sync = manager.driver("sync").await.unwrap();
        assert_eq!(sync.name(), "sync");
        assert!(!Arc::ptr_eq(&first, &sync));
    }

    #[tokio::test]
    async fn test_facade_uses_default_connection_only() {
        let manager = QueueManager::new(memory_config(), Arc::new(JobRegistry::new()));

        manager.push("SendEmailJob", Payload::new(), "email").await.unwrap();
        assert_eq!(manager.size("email").await.unwrap(), 1);

        let memory = manager.driver("memory").await.unwrap();
        assert_eq!(memory.size("email").await.unwrap(), 1);

        let job = manager.pop("email").await.unwrap().unwrap();
        assert_eq!(job.job_type, "SendEmailJob");
        assert_eq!(manager.size("email").await.unwrap(), 0);
    }
}
