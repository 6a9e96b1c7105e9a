//! # Coordination Store
//!
//! Hierarchical path store used for service registration and discovery.
//!
//! [`CoordinationStore`] is the narrow surface the registry needs: persistent node
//! creation, reads, child listing, deletion, and a persistent child watch.
//! [`MemoryStore`] implements it in-process for tests and single-node deployments.
//!
//! Watchers receive the watched path and its fresh child list. They are invoked
//! after the store's lock is released, so a watcher may call back into the store.
//! Child lists are queued while the tree is still locked and delivered from that
//! queue by one thread at a time, so watchers see changes in the order they were
//! made even when writers race.

use crate::error::constants::{ERR_NODE_EXISTS, ERR_NO_NODE, ERR_REGISTRY_UNAVAILABLE};
use crate::error::{Result, RpcError};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

/// Child-change callback: `(watched path, current children)`
pub type ChildWatcher = Arc<dyn Fn(&str, Vec<String>) + Send + Sync>;

pub trait CoordinationStore: Send + Sync {
    /// Create `path` (and missing parents) holding `data`.
    ///
    /// Fails with a registry error when `path` already exists.
    fn create_persistent(&self, path: &str, data: &[u8]) -> Result<()>;

    fn exists(&self, path: &str) -> Result<bool>;

    fn get_data(&self, path: &str) -> Result<Vec<u8>>;

    /// Child names of `path`; a missing path has no children.
    fn get_children(&self, path: &str) -> Result<Vec<String>>;

    /// Delete a leaf node.
    fn delete(&self, path: &str) -> Result<()>;

    /// Call `watcher` every time the children of `path` change.
    fn watch_children(&self, path: &str, watcher: ChildWatcher) -> Result<()>;
}

fn parent_of(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) if path.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(i) => Some(&path[..i]),
    }
}

fn child_name<'a>(parent: &str, path: &'a str) -> Option<&'a str> {
    let rest = if parent == "/" {
        path.strip_prefix('/')?
    } else {
        path.strip_prefix(parent)?.strip_prefix('/')?
    };
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest)
    }
}

fn validate_path(path: &str) -> Result<()> {
    if !path.starts_with('/') || (path.len() > 1 && path.ends_with('/')) || path.contains("//") {
        return Err(RpcError::Registry(format!("Invalid path: {path}")));
    }
    Ok(())
}

#[derive(Default)]
struct Tree {
    nodes: BTreeMap<String, Vec<u8>>,
}

impl Tree {
    fn children(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| child_name(path, k).map(str::to_string))
            .collect()
    }
}

type ChildChange = (String, Vec<String>);

#[derive(Default)]
struct Delivery {
    queue: VecDeque<ChildChange>,
    draining: bool,
}

/// In-process coordination store
#[derive(Default)]
pub struct MemoryStore {
    tree: Mutex<Tree>,
    watchers: Mutex<HashMap<String, Vec<ChildWatcher>>>,
    delivery: Mutex<Delivery>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the store; every call fails while unavailable.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Release);
    }

    fn tree(&self) -> Result<MutexGuard<'_, Tree>> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(RpcError::Registry(ERR_REGISTRY_UNAVAILABLE.to_string()));
        }
        self.tree
            .lock()
            .map_err(|_| RpcError::Registry("store lock poisoned".to_string()))
    }

    /// Queue child lists in change order. Must be called with the tree locked.
    fn enqueue(&self, changed: Vec<ChildChange>) {
        if let Ok(mut delivery) = self.delivery.lock() {
            delivery.queue.extend(changed);
        }
    }

    /// Deliver queued child lists unless another thread is already doing so.
    ///
    /// The draining thread keeps going until the queue is empty, which includes
    /// anything queued by writers that returned early or by watchers themselves.
    fn notify(&self) {
        match self.delivery.lock() {
            Ok(mut delivery) if !delivery.draining => delivery.draining = true,
            _ => return,
        }

        loop {
            let next = match self.delivery.lock() {
                Ok(mut delivery) => match delivery.queue.pop_front() {
                    Some(change) => change,
                    None => {
                        delivery.draining = false;
                        return;
                    }
                },
                Err(_) => return,
            };

            let (path, children) = next;
            let watchers: Vec<ChildWatcher> = match self.watchers.lock() {
                Ok(w) => w.get(&path).cloned().unwrap_or_default(),
                Err(_) => continue,
            };
            trace!(path = %path, watchers = watchers.len(), "Children changed");
            for watcher in watchers {
                watcher(&path, children.clone());
            }
        }
    }
}

impl CoordinationStore for MemoryStore {
    fn create_persistent(&self, path: &str, data: &[u8]) -> Result<()> {
        validate_path(path)?;
        {
            let mut tree = self.tree()?;
            if tree.nodes.contains_key(path) {
                return Err(RpcError::Registry(format!("{ERR_NODE_EXISTS}: {path}")));
            }

            let mut created = Vec::new();
            let mut ancestor = parent_of(path);
            while let Some(p) = ancestor {
                if p == "/" || tree.nodes.contains_key(p) {
                    break;
                }
                created.push(p.to_string());
                ancestor = parent_of(p);
            }
            for p in created.iter().rev() {
                tree.nodes.insert(p.clone(), Vec::new());
            }
            tree.nodes.insert(path.to_string(), data.to_vec());
            created.insert(0, path.to_string());

            let changed = created
                .iter()
                .filter_map(|p| parent_of(p))
                .map(|parent| (parent.to_string(), tree.children(parent)))
                .collect();
            self.enqueue(changed);
        }
        debug!(path, "Node created");
        self.notify();
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.tree()?.nodes.contains_key(path))
    }

    fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        self.tree()?
            .nodes
            .get(path)
            .cloned()
            .ok_or_else(|| RpcError::Registry(format!("{ERR_NO_NODE}: {path}")))
    }

    fn get_children(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.tree()?.children(path))
    }

    fn delete(&self, path: &str) -> Result<()> {
        {
            let mut tree = self.tree()?;
            if !tree.nodes.contains_key(path) {
                return Err(RpcError::Registry(format!("{ERR_NO_NODE}: {path}")));
            }
            if !tree.children(path).is_empty() {
                return Err(RpcError::Registry(format!("Node has children: {path}")));
            }
            tree.nodes.remove(path);
            if let Some(parent) = parent_of(path) {
                self.enqueue(vec![(parent.to_string(), tree.children(parent))]);
            }
        }
        debug!(path, "Node deleted");
        self.notify();
        Ok(())
    }

    fn watch_children(&self, path: &str, watcher: ChildWatcher) -> Result<()> {
        validate_path(path)?;
        if self.unavailable.load(Ordering::Acquire) {
            return Err(RpcError::Registry(ERR_REGISTRY_UNAVAILABLE.to_string()));
        }
        self.watchers
            .lock()
            .map_err(|_| RpcError::Registry("watcher lock poisoned".to_string()))?
            .entry(path.to_string())
            .or_default()
            .push(watcher);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn creates_parents_and_lists_children() {
        let store = MemoryStore::new();
        store
            .create_persistent("/my-rpc/Hellotest1version1/127.0.0.1:9995", b"100")
            .unwrap();
        store
            .create_persistent("/my-rpc/Hellotest1version1/127.0.0.1:9996", b"50")
            .unwrap();

        assert!(store.exists("/my-rpc").unwrap());
        assert_eq!(
            store.get_children("/my-rpc/Hellotest1version1").unwrap(),
            vec!["127.0.0.1:9995", "127.0.0.1:9996"]
        );
        assert_eq!(
            store
                .get_data("/my-rpc/Hellotest1version1/127.0.0.1:9996")
                .unwrap(),
            b"50"
        );
        assert!(store.get_children("/my-rpc/missing").unwrap().is_empty());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn duplicate_create_is_an_error() {
        let store = MemoryStore::new();
        store.create_persistent("/a/b", b"1").unwrap();
        assert!(store.create_persistent("/a/b", b"2").is_err());
        assert_eq!(store.get_data("/a/b").unwrap(), b"1");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn watchers_see_fresh_children() {
        let store = MemoryStore::new();
        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store
            .watch_children(
                "/root/svc",
                Arc::new(move |_path: &str, children: Vec<String>| {
                    sink.lock().unwrap().push(children);
                }),
            )
            .unwrap();

        store.create_persistent("/root/svc/x", b"1").unwrap();
        store.create_persistent("/root/svc/y", b"1").unwrap();
        store.delete("/root/svc/x").unwrap();

        let events = seen.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                vec!["x".to_string()],
                vec!["x".to_string(), "y".to_string()],
                vec!["y".to_string()],
            ]
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn racing_writers_deliver_the_final_list_last() {
        for _ in 0..100 {
            let store = Arc::new(MemoryStore::new());
            store.create_persistent("/r/K/seed", b"").unwrap();
            let latest: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
            let sink = latest.clone();
            store
                .watch_children(
                    "/r/K",
                    Arc::new(move |_path: &str, children: Vec<String>| {
                        *sink.lock().unwrap() = children;
                    }),
                )
                .unwrap();

            let writers: Vec<_> = (0..8)
                .map(|i| {
                    let store = store.clone();
                    std::thread::spawn(move || {
                        store.create_persistent(&format!("/r/K/n{i}"), b"").unwrap();
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }

            assert_eq!(*latest.lock().unwrap(), store.get_children("/r/K").unwrap());
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn watcher_may_write_back_into_the_store() {
        let store = Arc::new(MemoryStore::new());
        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let writer = Arc::downgrade(&store);
        store
            .watch_children(
                "/a",
                Arc::new(move |_path: &str, children: Vec<String>| {
                    if children == ["x"] {
                        if let Some(store) = writer.upgrade() {
                            store.create_persistent("/a/y", b"").unwrap();
                        }
                    }
                    sink.lock().unwrap().push(children);
                }),
            )
            .unwrap();

        store.create_persistent("/a/x", b"").unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![vec!["x".to_string()], vec!["x".to_string(), "y".to_string()]]
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn delete_refuses_inner_nodes() {
        let store = MemoryStore::new();
        store.create_persistent("/a/b/c", b"").unwrap();
        assert!(store.delete("/a/b").is_err());
        assert!(store.delete("/a/b/zz").is_err());
        store.delete("/a/b/c").unwrap();
        store.delete("/a/b").unwrap();
    }

    #[test]
    fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(store.exists("/a").is_err());
        assert!(store.create_persistent("/a", b"").is_err());
        store.set_available(true);
        assert!(store.create_persistent("/a", b"").is_ok());
    }

    #[test]
    fn path_helpers() {
        assert_eq!(parent_of("/a/b"), Some("/a"));
        assert_eq!(parent_of("/a"), Some("/"));
        assert_eq!(parent_of("/"), None);
        assert_eq!(child_name("/a", "/a/b"), Some("b"));
        assert_eq!(child_name("/a", "/a/b/c"), None);
        assert_eq!(child_name("/a", "/ab"), None);
        assert!(validate_path("relative").is_err());
    }
}
