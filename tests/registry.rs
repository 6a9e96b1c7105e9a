//! Registration and discovery against a shared coordination store, as two
//! processes (a provider and a consumer) would see it.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use netrpc::config::RpcConfig;
use netrpc::context::RpcContext;
use netrpc::error::RpcError;
use netrpc::loadbalance::WeightSource;
use netrpc::registry::store::{CoordinationStore, MemoryStore};
use std::net::SocketAddr;
use std::sync::Arc;

const HELLO: &str = "Hellotest1version1";
const SCHOOL: &str = "github.javaguide.SchoolServicetest1version1";

struct Cluster {
    store: Arc<MemoryStore>,
    provider: Arc<RpcContext>,
    consumer: Arc<RpcContext>,
}

fn cluster() -> Cluster {
    let store = Arc::new(MemoryStore::new());
    let provider = RpcContext::new(RpcConfig::default(), store.clone()).unwrap();
    let consumer = RpcContext::new(RpcConfig::default(), store.clone()).unwrap();
    Cluster {
        store,
        provider,
        consumer,
    }
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[test]
fn test_node_layout_and_weight_data() {
    let c = cluster();
    c.provider
        .service_registry()
        .register_service(HELLO, addr(9995), 42)
        .unwrap();

    let path = "/my-rpc/Hellotest1version1/127.0.0.1:9995";
    assert_eq!(c.store.get_data(path).unwrap(), b"42");
    assert_eq!(
        c.provider.service_registry().registered_paths(),
        vec![path.to_string()]
    );
}

#[test]
fn test_registration_is_idempotent() {
    let c = cluster();
    let registry = c.provider.service_registry();
    registry.register_service(HELLO, addr(9995), 100).unwrap();
    registry.register_service(HELLO, addr(9995), 100).unwrap();
    assert_eq!(registry.registered_paths().len(), 1);

    // another process already created the node
    let other = RpcContext::new(RpcConfig::default(), c.store.clone()).unwrap();
    other
        .service_registry()
        .register_service(HELLO, addr(9995), 100)
        .unwrap();
}

#[test]
fn test_consumer_sees_provider_changes() {
    let c = cluster();
    let cache = c.consumer.registry_cache();
    assert!(matches!(
        cache.lookup(HELLO),
        Err(RpcError::NoProviderAvailable(_))
    ));

    c.provider
        .service_registry()
        .register_service(HELLO, addr(9995), 100)
        .unwrap();
    assert_eq!(cache.lookup(HELLO).unwrap().addresses(), ["127.0.0.1:9995"]);

    c.provider
        .service_registry()
        .register_service(HELLO, addr(9996), 100)
        .unwrap();
    assert_eq!(cache.lookup(HELLO).unwrap().len(), 2);

    assert_eq!(c.provider.service_registry().clear_registry(addr(9995)), 1);
    assert_eq!(cache.lookup(HELLO).unwrap().addresses(), ["127.0.0.1:9996"]);
}

#[test]
fn test_any_change_clears_every_cached_weight() {
    let c = cluster();
    let registry = c.provider.service_registry();
    registry.register_service(HELLO, addr(9995), 10).unwrap();
    registry.register_service(SCHOOL, addr(9996), 20).unwrap();

    let cache = c.consumer.registry_cache();
    cache.lookup(HELLO).unwrap();
    cache.lookup(SCHOOL).unwrap();
    assert_eq!(cache.weight(HELLO, "127.0.0.1:9995"), 10);
    assert_eq!(cache.weight(SCHOOL, "127.0.0.1:9996"), 20);

    registry.register_service(HELLO, addr(9997), 30).unwrap();
    assert_eq!(cache.cached_weight("127.0.0.1:9995"), None);
    assert_eq!(cache.cached_weight("127.0.0.1:9996"), None);
    assert_eq!(cache.weight(SCHOOL, "127.0.0.1:9996"), 20);
}

#[test]
fn test_cached_lists_survive_store_outage() {
    let c = cluster();
    c.provider
        .service_registry()
        .register_service(HELLO, addr(9995), 100)
        .unwrap();
    let cache = c.consumer.registry_cache();
    cache.lookup(HELLO).unwrap();

    c.store.set_available(false);
    assert_eq!(cache.lookup(HELLO).unwrap().len(), 1);
    assert!(matches!(cache.lookup(SCHOOL), Err(RpcError::Registry(_))));

    c.store.set_available(true);
    assert!(matches!(
        cache.lookup(SCHOOL),
        Err(RpcError::NoProviderAvailable(_))
    ));
}

#[tokio::test]
async fn test_shutdown_only_removes_own_address() {
    let c = cluster();
    c.provider
        .service_registry()
        .register_service(HELLO, addr(9995), 100)
        .unwrap();
    c.consumer
        .service_registry()
        .register_service(HELLO, addr(9996), 100)
        .unwrap();

    assert!(c.provider.shutdown(Some(addr(9995))).await);
    assert_eq!(
        c.store.get_children("/my-rpc/Hellotest1version1").unwrap(),
        vec!["127.0.0.1:9996"]
    );
}

#[test]
fn test_concurrent_registrations_leave_the_cache_current() {
    for round in 0..100u16 {
        let c = cluster();
        c.provider
            .service_registry()
            .register_service(HELLO, addr(9000), 100)
            .unwrap();
        assert_eq!(c.consumer.registry_cache().lookup(HELLO).unwrap().len(), 1);

        let writers: Vec<_> = (1..=8u16)
            .map(|i| {
                let provider = c.provider.clone();
                std::thread::spawn(move || {
                    provider
                        .service_registry()
                        .register_service(HELLO, addr(9000 + i), 100)
                        .unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let cached = c.consumer.registry_cache().lookup(HELLO).unwrap();
        let stored = c.store.get_children("/my-rpc/Hellotest1version1").unwrap();
        assert_eq!(cached.len(), 9, "round {round}");
        assert_eq!(cached.addresses(), stored.as_slice(), "round {round}");
    }
}
