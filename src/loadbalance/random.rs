//! Weighted random selection.

use crate::loadbalance::{LoadBalance, WeightSource};
use crate::registry::cache::AddressList;
use rand::Rng;
use std::sync::Arc;

pub struct RandomLoadBalance {
    weights: Arc<dyn WeightSource>,
}

impl RandomLoadBalance {
    pub fn new(weights: Arc<dyn WeightSource>) -> Self {
        Self { weights }
    }
}

impl LoadBalance for RandomLoadBalance {
    fn do_select(&self, addresses: &AddressList, service_key: &str) -> Option<String> {
        let list = addresses.addresses();
        let weights: Vec<i64> = list
            .iter()
            .map(|address| i64::from(self.weights.weight(service_key, address)))
            .collect();
        let total: i64 = weights.iter().sum();
        let same_weight = weights.windows(2).all(|pair| pair[0] == pair[1]);

        let mut rng = rand::rng();
        if total > 0 && !same_weight {
            let mut offset = rng.random_range(0..total);
            for (address, weight) in list.iter().zip(&weights) {
                offset -= weight;
                if offset < 0 {
                    return Some(address.clone());
                }
            }
        }
        list.get(rng.random_range(0..list.len())).cloned()
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadbalance::test_support::StaticWeights;
    use std::collections::HashMap;

    #[test]
    fn heavier_address_wins_more_often() {
        let lb = RandomLoadBalance::new(Arc::new(StaticWeights::new(&[("A", 9), ("B", 1)])));
        let list = AddressList::new(vec!["A".into(), "B".into()]);

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..2000 {
            if let Some(pick) = lb.select(&list, "svc") {
                *counts.entry(pick).or_default() += 1;
            }
        }
        let a = counts.get("A").copied().unwrap_or(0);
        let b = counts.get("B").copied().unwrap_or(0);
        assert_eq!(a + b, 2000);
        assert!(a > b * 3, "A={a} B={b}");
    }

    #[test]
    fn zero_weights_still_select_a_member() {
        let lb = RandomLoadBalance::new(Arc::new(StaticWeights::new(&[("A", 0), ("B", 0)])));
        let list = AddressList::new(vec!["A".into(), "B".into()]);
        for _ in 0..50 {
            let pick = lb.select(&list, "svc");
            assert!(matches!(pick.as_deref(), Some("A") | Some("B")));
        }
    }
}
