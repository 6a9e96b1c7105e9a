//! Connection pool keyed by full socket address.
//!
//! The key is the whole `host:port`, not the host alone, for both lookup and
//! insertion. Two providers on one host therefore get separate connections, and
//! there is at most one live channel per `host:port`. Inactive channels are evicted
//! on lookup.

use crate::transport::channel::ClientChannel;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct ChannelProvider {
    channels: DashMap<SocketAddr, Arc<ClientChannel>>,
}

impl ChannelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live channel for `address`, evicting a dead one.
    pub fn get(&self, address: &SocketAddr) -> Option<Arc<ClientChannel>> {
        let channel = self.channels.get(address).map(|c| c.value().clone())?;
        if channel.is_active() {
            return Some(channel);
        }
        self.channels
            .remove_if(address, |_, current| Arc::ptr_eq(current, &channel));
        debug!(peer = %address, "Evicted inactive channel");
        None
    }

    /// Store `channel`, replacing (and closing) any previous channel for its address.
    pub fn set(&self, channel: Arc<ClientChannel>) {
        if let Some(previous) = self.channels.insert(channel.address(), channel) {
            previous.close();
        }
    }

    pub fn remove(&self, address: &SocketAddr) {
        if let Some((_, channel)) = self.channels.remove(address) {
            channel.close();
        }
    }

    /// Close and forget every channel
    pub fn close_all(&self) {
        for entry in self.channels.iter() {
            entry.value().close();
        }
        self.channels.clear();
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
