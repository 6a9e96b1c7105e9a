//! Consistent hashing with virtual nodes.
//!
//! Each address contributes `REPLICA_COUNT / 4` anchors (`address + i`). An anchor's
//! MD5 digest is cut into four little-endian `u32` windows, giving four ring
//! positions per anchor. A service key hashes to the first window of its own digest
//! and maps to the first ring position at or after it, wrapping to the start.
//!
//! Rings are cached per service key and rebuilt whenever the address list's
//! generation changes.

use crate::loadbalance::LoadBalance;
use crate::registry::cache::AddressList;
use dashmap::DashMap;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Virtual nodes per address
pub const REPLICA_COUNT: usize = 160;

fn md5(key: &str) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(key.as_bytes());
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

fn hash(digest: &[u8; 16], window: usize) -> u32 {
    let at = window * 4;
    u32::from_le_bytes([digest[at], digest[at + 1], digest[at + 2], digest[at + 3]])
}

/// Immutable hash ring for one address list generation
#[derive(Debug)]
pub struct ConsistentHashSelector {
    generation: u64,
    ring: BTreeMap<u32, String>,
}

impl ConsistentHashSelector {
    pub fn new(addresses: &[String], replicas: usize, generation: u64) -> Self {
        let mut ring = BTreeMap::new();
        for address in addresses {
            for i in 0..replicas / 4 {
                let digest = md5(&format!("{address}{i}"));
                for window in 0..4 {
                    ring.insert(hash(&digest, window), address.clone());
                }
            }
        }
        Self { generation, ring }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of ring positions
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn select(&self, service_key: &str) -> Option<String> {
        let position = hash(&md5(service_key), 0);
        self.ring
            .range(position..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, address)| address.clone())
    }
}

pub struct ConsistentHashLoadBalance {
    selectors: DashMap<String, Arc<ConsistentHashSelector>>,
}

impl Default for ConsistentHashLoadBalance {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsistentHashLoadBalance {
    pub fn new() -> Self {
        Self {
            selectors: DashMap::new(),
        }
    }

    fn selector_for(&self, addresses: &AddressList, service_key: &str) -> Arc<ConsistentHashSelector> {
        if let Some(selector) = self.selectors.get(service_key) {
            if selector.generation() == addresses.generation() {
                return selector.value().clone();
            }
        }

        debug!(
            service = %service_key,
            generation = addresses.generation(),
            addresses = addresses.len(),
            "Rebuilding hash ring"
        );
        let selector = Arc::new(ConsistentHashSelector::new(
            addresses.addresses(),
            REPLICA_COUNT,
            addresses.generation(),
        ));
        self.selectors
            .insert(service_key.to_string(), selector.clone());
        selector
    }
}

impl LoadBalance for ConsistentHashLoadBalance {
    fn do_select(&self, addresses: &AddressList, service_key: &str) -> Option<String> {
        self.selector_for(addresses, service_key).select(service_key)
    }

    fn name(&self) -> &'static str {
        "consistent_hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three() -> Vec<String> {
        vec![
            "127.0.0.1:9997".to_string(),
            "127.0.0.1:9998".to_string(),
            "127.0.0.1:9999".to_string(),
        ]
    }

    #[test]
    fn ring_has_four_positions_per_anchor() {
        let selector = ConsistentHashSelector::new(&three(), REPLICA_COUNT, 1);
        assert_eq!(selector.len(), 3 * REPLICA_COUNT);
    }

    #[test]
    fn known_keys_land_on_known_addresses() {
        let selector = ConsistentHashSelector::new(&three(), REPLICA_COUNT, 1);
        assert_eq!(
            selector.select("github.javaguide.UserServicetest1version1").as_deref(),
            Some("127.0.0.1:9999")
        );
        assert_eq!(
            selector.select("github.javaguide.SchoolServicetest1version1").as_deref(),
            Some("127.0.0.1:9997")
        );
        assert_eq!(
            selector.select("Hellotest1version1").as_deref(),
            Some("127.0.0.1:9997")
        );
    }

    #[test]
    fn same_key_same_address() {
        let lb = ConsistentHashLoadBalance::new();
        let list = AddressList::new(three());
        let first = lb.select(&list, "Hellotest1version1");
        for _ in 0..10 {
            assert_eq!(lb.select(&list, "Hellotest1version1"), first);
        }
    }

    #[test]
    fn removal_only_moves_keys_of_the_removed_address() {
        let before = ConsistentHashSelector::new(&three(), REPLICA_COUNT, 1);
        let mut remaining = three();
        remaining.pop();
        let after = ConsistentHashSelector::new(&remaining, REPLICA_COUNT, 2);

        let mut moved = 0;
        for i in 0..1000 {
            let key = format!("service-{i}");
            let old = before.select(&key);
            let new = after.select(&key);
            if old != new {
                assert_eq!(old.as_deref(), Some("127.0.0.1:9999"));
                moved += 1;
            }
        }
        assert!(moved < 1000);
    }

    #[test]
    fn ring_follows_list_generation() {
        let lb = ConsistentHashLoadBalance::new();
        let full = AddressList::new(three());
        let _ = lb.select(&full, "svc");
        let first_ring = lb.selector_for(&full, "svc");

        let mut two = three();
        two.pop();
        let shrunk = AddressList::new(two);
        let second_ring = lb.selector_for(&shrunk, "svc");
        assert!(!Arc::ptr_eq(&first_ring, &second_ring));
        assert_eq!(second_ring.len(), 2 * REPLICA_COUNT);
        assert_eq!(second_ring.generation(), shrunk.generation());
    }
}
