//! # Runtime Context
//!
//! The handle every component is built from. One context owns the coordination
//! store, the registry cache and registration state, the extension registry, the
//! active-call counters and the named worker pools.
//!
//! Build it once at startup and share it as `Arc<RpcContext>`. [`RpcContext::shutdown`]
//! deregisters this process's addresses and drains the worker pools.
//!
//! ```rust
//! use netrpc::config::RpcConfig;
//! use netrpc::context::RpcContext;
//!
//! let context = RpcContext::in_memory(RpcConfig::default()).expect("valid config");
//! assert_eq!(context.registry_cache().root(), "/my-rpc");
//! ```

use crate::config::RpcConfig;
use crate::error::Result;
use crate::extension::Extensions;
use crate::loadbalance::least_active::ActiveCalls;
use crate::registry::cache::RegistryCache;
use crate::registry::service_registry::ServiceRegistry;
use crate::registry::store::{CoordinationStore, MemoryStore};
use crate::utils::worker_pool::WorkerPools;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

pub struct RpcContext {
    config: RpcConfig,
    store: Arc<dyn CoordinationStore>,
    registry_cache: Arc<RegistryCache>,
    service_registry: ServiceRegistry,
    active_calls: Arc<ActiveCalls>,
    extensions: Arc<Extensions>,
    worker_pools: WorkerPools,
}

impl std::fmt::Debug for RpcContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcContext")
            .field("root", &self.registry_cache.root())
            .field("worker_pools", &self.worker_pools.len())
            .finish()
    }
}

impl RpcContext {
    /// Validate `config` and wire every component against `store`.
    pub fn new(config: RpcConfig, store: Arc<dyn CoordinationStore>) -> Result<Arc<Self>> {
        config.validate_strict()?;

        let root = config.registry.root_path.clone();
        let registry_cache = RegistryCache::new(store.clone(), root.clone());
        let service_registry = ServiceRegistry::new(store.clone(), root);
        let active_calls = Arc::new(ActiveCalls::new());
        let extensions = Arc::new(Extensions::with_defaults(
            registry_cache.clone(),
            active_calls.clone(),
        ));

        info!(
            registry = %config.registry.address,
            root = %registry_cache.root(),
            load_balance = %config.client.load_balance,
            "Context initialized"
        );

        Ok(Arc::new(Self {
            config,
            store,
            registry_cache,
            service_registry,
            active_calls,
            extensions,
            worker_pools: WorkerPools::new(),
        }))
    }

    /// Context backed by a fresh [`MemoryStore`]
    pub fn in_memory(config: RpcConfig) -> Result<Arc<Self>> {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    pub fn registry_cache(&self) -> &Arc<RegistryCache> {
        &self.registry_cache
    }

    pub fn service_registry(&self) -> &ServiceRegistry {
        &self.service_registry
    }

    pub fn active_calls(&self) -> &Arc<ActiveCalls> {
        &self.active_calls
    }

    pub fn extensions(&self) -> &Arc<Extensions> {
        &self.extensions
    }

    pub fn worker_pools(&self) -> &WorkerPools {
        &self.worker_pools
    }

    /// Deregister `server_addr` (when given) and shut every worker pool down.
    ///
    /// Deregistration is best-effort. Returns `true` when all pools drained inside
    /// `server.shutdown_timeout`.
    pub async fn shutdown(&self, server_addr: Option<SocketAddr>) -> bool {
        if let Some(address) = server_addr {
            let removed = self.service_registry.clear_registry(address);
            if removed == 0 && !self.service_registry.registered_paths().is_empty() {
                warn!(address = %address, "No registry nodes removed during shutdown");
            }
        }
        let drained = self
            .worker_pools
            .shutdown_all(self.config.server.shutdown_timeout)
            .await;
        info!(drained, "Context shut down");
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_rejected() {
        let config = RpcConfig::default_with_overrides(|c| c.client.load_balance = "nope".into());
        assert!(RpcContext::in_memory(config).is_err());
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn shutdown_deregisters_own_address() {
        let context = RpcContext::in_memory(RpcConfig::default()).unwrap();
        let addr: SocketAddr = "127.0.0.1:9995".parse().unwrap();
        context
            .service_registry()
            .register_service("Hellotest1version1", addr, 100)
            .unwrap();
        assert!(context.store().exists("/my-rpc/Hellotest1version1/127.0.0.1:9995").unwrap());

        context.worker_pools().get_or_create("service-handler", 2);
        assert!(context.shutdown(Some(addr)).await);
        assert!(!context.store().exists("/my-rpc/Hellotest1version1/127.0.0.1:9995").unwrap());
        assert!(context.service_registry().registered_paths().is_empty());
    }
}
