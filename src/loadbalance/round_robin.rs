//! Weighted smooth round robin.
//!
//! A call counter per service key drives the walk. With equal weights the pick is
//! `addresses[counter % len]`. Otherwise `counter % total_weight` is spent across up
//! to `max_weight` passes over the addresses with weight left, one unit per address
//! per pass, and the address reached when the offset hits zero is chosen.

use crate::loadbalance::{LoadBalance, WeightSource};
use crate::registry::cache::AddressList;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub struct RoundRobinLoadBalance {
    weights: Arc<dyn WeightSource>,
    sequences: DashMap<String, AtomicU32>,
}

impl RoundRobinLoadBalance {
    pub fn new(weights: Arc<dyn WeightSource>) -> Self {
        Self {
            weights,
            sequences: DashMap::new(),
        }
    }

    fn next_sequence(&self, service_key: &str) -> u32 {
        if let Some(sequence) = self.sequences.get(service_key) {
            return sequence.fetch_add(1, Ordering::Relaxed);
        }
        self.sequences
            .entry(service_key.to_string())
            .or_insert_with(|| AtomicU32::new(0))
            .fetch_add(1, Ordering::Relaxed)
    }
}

impl LoadBalance for RoundRobinLoadBalance {
    fn do_select(&self, addresses: &AddressList, service_key: &str) -> Option<String> {
        let list = addresses.addresses();
        let mut max_weight = 0i32;
        let mut min_weight = i32::MAX;
        let mut weight_sum = 0i64;
        let mut remaining: Vec<(&String, i32)> = Vec::with_capacity(list.len());

        for address in list {
            let weight = self.weights.weight(service_key, address);
            max_weight = max_weight.max(weight);
            min_weight = min_weight.min(weight);
            if weight > 0 {
                remaining.push((address, weight));
                weight_sum += i64::from(weight);
            }
        }

        let sequence = self.next_sequence(service_key);

        if max_weight > 0 && min_weight < max_weight {
            let mut offset = i64::from(sequence) % weight_sum;
            for _ in 0..max_weight {
                for (address, left) in remaining.iter_mut() {
                    if offset == 0 && *left > 0 {
                        return Some((*address).clone());
                    }
                    if *left > 0 {
                        *left -= 1;
                        offset -= 1;
                    }
                }
            }
        }

        list.get(sequence as usize % list.len()).cloned()
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
