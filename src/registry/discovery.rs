//! Client-side discovery: registry cache lookup followed by load-balanced selection.

use crate::error::{Result, RpcError};
use crate::extension::Extensions;
use crate::protocol::message::RpcRequest;
use crate::registry::cache::RegistryCache;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

pub struct ServiceDiscovery {
    cache: Arc<RegistryCache>,
    extensions: Arc<Extensions>,
    load_balance: String,
}

impl ServiceDiscovery {
    pub fn new(
        cache: Arc<RegistryCache>,
        extensions: Arc<Extensions>,
        load_balance: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            extensions,
            load_balance: load_balance.into(),
        }
    }

    pub fn load_balance(&self) -> &str {
        &self.load_balance
    }

    /// Resolve the address a request should be sent to.
    pub fn lookup_service(&self, request: &RpcRequest) -> Result<SocketAddr> {
        let service_key = request.rpc_service_name();
        let addresses = self.cache.lookup(&service_key)?;
        let balancer = self.extensions.load_balancer(&self.load_balance)?;
        let target = balancer
            .select(&addresses, &service_key)
            .ok_or_else(|| RpcError::NoProviderAvailable(service_key.clone()))?;
        debug!(service = %service_key, address = %target, strategy = balancer.name(), "Service address selected");

        target
            .parse::<SocketAddr>()
            .map_err(|_| RpcError::InvalidAddress(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::load_balance_names;
    use crate::loadbalance::least_active::ActiveCalls;
    use crate::registry::store::{CoordinationStore, MemoryStore};

    fn request() -> RpcRequest {
        RpcRequest {
            request_id: "r".into(),
            interface_name: "Hello".into(),
            method_name: "hello".into(),
            param_types: Vec::new(),
            parameters: Vec::new(),
            group: "test1".into(),
            version: "version1".into(),
        }
    }

    fn discovery(store: Arc<MemoryStore>) -> ServiceDiscovery {
        let cache = RegistryCache::new(store, "/my-rpc");
        let extensions = Arc::new(Extensions::with_defaults(
            cache.clone(),
            Arc::new(ActiveCalls::new()),
        ));
        ServiceDiscovery::new(cache, extensions, load_balance_names::CONSISTENT_HASH)
    }

    #[test]
    fn unregistered_service_fails_lookup() {
        let d = discovery(Arc::new(MemoryStore::new()));
        assert!(matches!(
            d.lookup_service(&request()),
            Err(RpcError::NoProviderAvailable(k)) if k == "Hellotest1version1"
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn resolves_registered_address() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_persistent("/my-rpc/Hellotest1version1/127.0.0.1:9997", b"100")
            .unwrap();
        store
            .create_persistent("/my-rpc/Hellotest1version1/127.0.0.1:9998", b"100")
            .unwrap();
        store
            .create_persistent("/my-rpc/Hellotest1version1/127.0.0.1:9999", b"100")
            .unwrap();
        let d = discovery(store);
        assert_eq!(
            d.lookup_service(&request()).unwrap(),
            "127.0.0.1:9997".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn malformed_address_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_persistent("/my-rpc/Hellotest1version1/not-an-address", b"100")
            .unwrap();
        let d = discovery(store);
        assert!(matches!(
            d.lookup_service(&request()),
            Err(RpcError::InvalidAddress(a)) if a == "not-an-address"
        ));
    }
}
