//! # Registry Cache
//!
//! Client-side mirror of the store's address lists, one per service key.
//!
//! Lists are replaced whole, never edited in place. Every replacement carries a new
//! generation number, so a consumer holding an older [`AddressList`] can tell that
//! membership changed by comparing generations. Any child change also clears the
//! whole weight cache.

use crate::error::{Result, RpcError};
use crate::loadbalance::WeightSource;
use crate::registry::store::CoordinationStore;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Immutable address list snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressList {
    generation: u64,
    addresses: Vec<String>,
}

impl AddressList {
    /// Wrap `addresses` under a fresh generation
    pub fn new(addresses: Vec<String>) -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            addresses,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a == address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Cached address lists and weights backed by a [`CoordinationStore`]
pub struct RegistryCache {
    store: Arc<dyn CoordinationStore>,
    root: String,
    lists: DashMap<String, Arc<AddressList>>,
    weights: DashMap<String, i32>,
    watched: DashSet<String>,
    me: Weak<RegistryCache>,
}

impl RegistryCache {
    pub fn new(store: Arc<dyn CoordinationStore>, root: impl Into<String>) -> Arc<Self> {
        let root = root.into().trim_end_matches('/').to_string();
        Arc::new_cyclic(|me| Self {
            store,
            root,
            lists: DashMap::new(),
            weights: DashMap::new(),
            watched: DashSet::new(),
            me: me.clone(),
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn service_path(&self, service_key: &str) -> String {
        format!("{}/{}", self.root, service_key)
    }

    /// Addresses currently registered for `service_key`.
    ///
    /// A miss reads the store and installs a child watch. An empty result is
    /// [`RpcError::NoProviderAvailable`].
    pub fn lookup(&self, service_key: &str) -> Result<Arc<AddressList>> {
        if let Some(list) = self.lists.get(service_key) {
            return Self::non_empty(service_key, list.value().clone());
        }

        let path = self.service_path(service_key);
        self.ensure_watch(service_key, &path)?;
        let children = self.store.get_children(&path)?;
        debug!(service = %service_key, addresses = children.len(), "Loaded address list");

        let list = self
            .lists
            .entry(service_key.to_string())
            .or_insert_with(|| Arc::new(AddressList::new(children)))
            .value()
            .clone();
        Self::non_empty(service_key, list)
    }

    fn non_empty(service_key: &str, list: Arc<AddressList>) -> Result<Arc<AddressList>> {
        if list.is_empty() {
            Err(RpcError::NoProviderAvailable(service_key.to_string()))
        } else {
            Ok(list)
        }
    }

    fn ensure_watch(&self, service_key: &str, path: &str) -> Result<()> {
        if !self.watched.insert(service_key.to_string()) {
            return Ok(());
        }

        let cache = self.me.clone();
        let key = service_key.to_string();
        let installed = self.store.watch_children(
            path,
            Arc::new(move |_path: &str, children: Vec<String>| {
                if let Some(cache) = cache.upgrade() {
                    cache.on_children_changed(&key, children);
                }
            }),
        );
        if installed.is_err() {
            self.watched.remove(service_key);
        }
        installed
    }

    /// Replace the list for `service_key` and drop every cached weight.
    pub fn on_children_changed(&self, service_key: &str, children: Vec<String>) {
        info!(service = %service_key, addresses = ?children, "Service addresses changed");
        self.lists
            .insert(service_key.to_string(), Arc::new(AddressList::new(children)));
        self.weights.clear();
    }

    /// Cached list for `service_key` without touching the store
    pub fn cached(&self, service_key: &str) -> Option<Arc<AddressList>> {
        self.lists.get(service_key).map(|l| l.value().clone())
    }

    /// Cached weight for `address`, if one has been read since the last change
    pub fn cached_weight(&self, address: &str) -> Option<i32> {
        self.weights.get(address).map(|w| *w.value())
    }

    fn read_weight(&self, service_key: &str, address: &str) -> Option<i32> {
        let path = format!("{}/{}", self.service_path(service_key), address);
        let data = match self.store.get_data(&path) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to read weight");
                return None;
            }
        };
        match std::str::from_utf8(&data).ok().and_then(|s| s.trim().parse::<i32>().ok()) {
            Some(weight) => Some(weight),
            None => {
                warn!(path = %path, "Weight is not a decimal integer");
                None
            }
        }
    }
}

impl WeightSource for RegistryCache {
    fn weight(&self, service_key: &str, address: &str) -> i32 {
        let member = self
            .lists
            .get(service_key)
            .map(|list| list.contains(address))
            .unwrap_or(false);
        if !member {
            return -1;
        }

        if let Some(weight) = self.cached_weight(address) {
            return weight;
        }

        match self.read_weight(service_key, address) {
            Some(weight) => {
                self.weights.insert(address.to_string(), weight);
                weight
            }
            None => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::store::MemoryStore;

    const KEY: &str = "Hellotest1version1";

    fn cache_with(addresses: &[(&str, &str)]) -> (Arc<MemoryStore>, Arc<RegistryCache>) {
        let store = Arc::new(MemoryStore::new());
        for (address, weight) in addresses {
            let _ = store.create_persistent(&format!("/my-rpc/{KEY}/{address}"), weight.as_bytes());
        }
        let cache = RegistryCache::new(store.clone(), "/my-rpc");
        (store, cache)
    }

    #[test]
    fn empty_lookup_is_no_provider() {
        let (_store, cache) = cache_with(&[]);
        assert!(matches!(
            cache.lookup(KEY),
            Err(RpcError::NoProviderAvailable(k)) if k == KEY
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn lookup_caches_and_keeps_generation() {
        let (_store, cache) = cache_with(&[("X", "1"), ("Y", "2")]);
        let first = cache.lookup(KEY).unwrap();
        assert_eq!(first.addresses(), ["X", "Y"]);
        let second = cache.lookup(KEY).unwrap();
        assert_eq!(first.generation(), second.generation());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn watch_event_replaces_list_and_clears_weights() {
        let (_store, cache) = cache_with(&[("X", "10"), ("Y", "20")]);
        let before = cache.lookup(KEY).unwrap();
        assert_eq!(cache.weight(KEY, "X"), 10);
        assert_eq!(cache.weight(KEY, "Y"), 20);
        assert_eq!(cache.cached_weight("X"), Some(10));

        cache.on_children_changed(KEY, vec!["X".into(), "Y".into(), "Z".into()]);

        let after = cache.lookup(KEY).unwrap();
        assert_eq!(after.addresses(), ["X", "Y", "Z"]);
        assert_ne!(before.generation(), after.generation());
        assert_eq!(cache.cached_weight("X"), None);
        assert_eq!(cache.cached_weight("Y"), None);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn store_changes_reach_the_cache() {
        let (store, cache) = cache_with(&[("127.0.0.1:1", "100")]);
        assert_eq!(cache.lookup(KEY).unwrap().len(), 1);

        store
            .create_persistent(&format!("/my-rpc/{KEY}/127.0.0.1:2"), b"100")
            .unwrap();
        assert_eq!(cache.lookup(KEY).unwrap().len(), 2);

        store.delete(&format!("/my-rpc/{KEY}/127.0.0.1:1")).unwrap();
        store.delete(&format!("/my-rpc/{KEY}/127.0.0.1:2")).unwrap();
        assert!(matches!(
            cache.lookup(KEY),
            Err(RpcError::NoProviderAvailable(_))
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn registration_after_empty_lookup_is_seen() {
        let (store, cache) = cache_with(&[]);
        assert!(cache.lookup(KEY).is_err());
        store
            .create_persistent(&format!("/my-rpc/{KEY}/127.0.0.1:9995"), b"100")
            .unwrap();
        assert_eq!(cache.lookup(KEY).unwrap().addresses(), ["127.0.0.1:9995"]);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn non_members_weigh_minus_one() {
        let (_store, cache) = cache_with(&[("X", "10"), ("Y", "oops")]);
        cache.lookup(KEY).unwrap();
        assert_eq!(cache.weight(KEY, "Q"), -1);
        assert_eq!(cache.weight("OtherKey", "X"), -1);
        assert_eq!(cache.weight(KEY, "Y"), -1);
    }
}
