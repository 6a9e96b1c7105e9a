//! # Load Balancing
//!
//! Strategies picking one provider address out of a service's address list.
//!
//! ## Components
//! - **Random**: weighted random, uniform when all weights agree
//! - **Round Robin**: weighted smooth round robin over a per-key call counter
//! - **Consistent Hash**: MD5 ring with 160 virtual nodes per address
//! - **Least Active**: fewest in-flight calls, ties broken by weight then at random
//!
//! Every strategy short-circuits an empty list to no selection and a single
//! address to that address without reading any weight.

pub mod consistent_hash;
pub mod least_active;
pub mod random;
pub mod round_robin;

use crate::registry::cache::AddressList;

/// Per-address weight lookup used by weighted strategies
pub trait WeightSource: Send + Sync {
    /// Weight of `address` under `service_key`, or `-1` when it is not a known member
    fn weight(&self, service_key: &str, address: &str) -> i32;
}

/// Selection strategy over an address list
pub trait LoadBalance: Send + Sync {
    fn select(&self, addresses: &AddressList, service_key: &str) -> Option<String> {
        match addresses.addresses() {
            [] => None,
            [only] => Some(only.clone()),
            _ => self.do_select(addresses, service_key),
        }
    }

    /// Strategy body, only called with two or more addresses
    fn do_select(&self, addresses: &AddressList, service_key: &str) -> Option<String>;

    fn name(&self) -> &'static str;
}
