//! Least-active selection and the in-flight call tracker it reads.

use crate::loadbalance::{LoadBalance, WeightSource};
use crate::registry::cache::AddressList;
use dashmap::DashMap;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// In-flight call counts per address
#[derive(Debug, Default)]
pub struct ActiveCalls {
    counts: DashMap<String, Arc<AtomicUsize>>,
}

impl ActiveCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a call to `address` until the returned guard drops.
    pub fn begin(&self, address: &str) -> ActiveCallGuard {
        let counter = self
            .counts
            .entry(address.to_string())
            .or_default()
            .value()
            .clone();
        counter.fetch_add(1, Ordering::AcqRel);
        ActiveCallGuard { counter }
    }

    pub fn count(&self, address: &str) -> usize {
        self.counts
            .get(address)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}

/// Decrements its address's count on drop
#[derive(Debug)]
pub struct ActiveCallGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for ActiveCallGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct LeastActiveLoadBalance {
    weights: Arc<dyn WeightSource>,
    active: Arc<ActiveCalls>,
}

impl LeastActiveLoadBalance {
    pub fn new(weights: Arc<dyn WeightSource>, active: Arc<ActiveCalls>) -> Self {
        Self { weights, active }
    }
}

impl LoadBalance for LeastActiveLoadBalance {
    fn do_select(&self, addresses: &AddressList, service_key: &str) -> Option<String> {
        let mut best: Vec<&String> = Vec::new();
        let mut best_active = usize::MAX;
        let mut best_weight = i32::MIN;

        for address in addresses.addresses() {
            let active = self.active.count(address);
            let weight = self.weights.weight(service_key, address);
            if active < best_active || (active == best_active && weight > best_weight) {
                best.clear();
                best.push(address);
                best_active = active;
                best_weight = weight;
            } else if active == best_active && weight == best_weight {
                best.push(address);
            }
        }

        match best.len() {
            0 => None,
            1 => Some(best[0].clone()),
            n => Some(best[rand::rng().random_range(0..n)].clone()),
        }
    }

    fn name(&self) -> &'static str {
        "least_active"
    }
}
