//! Server-side registration of service addresses.
//!
//! Publishing creates `root/serviceKey/address` with the instance weight as its
//! data. The store never expires these nodes, so the registry remembers every path
//! it touched and deletes them again on shutdown.

use crate::error::Result;
use crate::registry::store::CoordinationStore;
use dashmap::DashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ServiceRegistry {
    store: Arc<dyn CoordinationStore>,
    root: String,
    registered: DashSet<String>,
}

impl ServiceRegistry {
    pub fn new(store: Arc<dyn CoordinationStore>, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into().trim_end_matches('/').to_string(),
            registered: DashSet::new(),
        }
    }

    pub fn node_path(&self, service_key: &str, address: &SocketAddr) -> String {
        format!("{}/{}/{}", self.root, service_key, address)
    }

    /// Publish `address` for `service_key`; an existing node is left as is.
    pub fn register_service(&self, service_key: &str, address: SocketAddr, weight: u32) -> Result<()> {
        let path = self.node_path(service_key, &address);
        if self.registered.contains(&path) || self.store.exists(&path)? {
            debug!(path = %path, "The node already exists");
        } else {
            self.store
                .create_persistent(&path, weight.to_string().as_bytes())?;
            info!(path = %path, weight, "The node was created successfully");
        }
        self.registered.insert(path);
        Ok(())
    }

    /// Paths this process has registered, sorted
    pub fn registered_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.registered.iter().map(|p| p.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Delete every path registered for `address`; failures are logged and skipped.
    ///
    /// Returns the number of nodes removed.
    pub fn clear_registry(&self, address: SocketAddr) -> usize {
        let suffix = format!("/{address}");
        let mut removed = 0;
        for path in self.registered_paths() {
            if !path.ends_with(&suffix) {
                continue;
            }
            match self.store.delete(&path) {
                Ok(()) => {
                    self.registered.remove(&path);
                    removed += 1;
                }
                Err(e) => warn!(path = %path, error = %e, "Clear registry for path failed"),
            }
        }
        info!(address = %address, removed, "All registered services were cleared");
        removed
    }
}
