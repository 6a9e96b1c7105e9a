//! Pending-request table correlating responses with their callers.
//!
//! Entries are keyed by the call's string id and remember which connection the
//! request went out on, so a closing connection can fail exactly its own calls.
//! Completion removes the entry, so each id completes at most once.

use crate::error::{Result, RpcError};
use crate::protocol::message::RpcResponse;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Completion handle for one call
pub type ResponseSender = oneshot::Sender<Result<RpcResponse>>;

/// Process-unique id of one client connection; a reconnect to the same address
/// gets a new one.
pub type ChannelId = u64;

struct PendingEntry {
    sender: ResponseSender,
    channel: ChannelId,
}

#[derive(Default)]
pub struct UnprocessedRequests {
    pending: DashMap<String, PendingEntry>,
}

impl UnprocessedRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `request_id` before its frame is written on `channel`.
    pub fn put(&self, request_id: &str, channel: ChannelId) -> oneshot::Receiver<Result<RpcResponse>> {
        let (sender, receiver) = oneshot::channel();
        if let Some(previous) = self
            .pending
            .insert(request_id.to_string(), PendingEntry { sender, channel })
        {
            warn!(request_id, "Replacing a pending request with the same id");
            let _ = previous
                .sender
                .send(Err(RpcError::UnknownRequest(request_id.to_string())));
        }
        receiver
    }

    /// Deliver `response` to its caller.
    ///
    /// Fails with [`RpcError::UnknownRequest`] when no entry exists, which covers
    /// both duplicate and unmatched responses.
    pub fn complete(&self, response: RpcResponse) -> Result<()> {
        let (request_id, entry) = self
            .pending
            .remove(&response.request_id)
            .ok_or_else(|| RpcError::UnknownRequest(response.request_id.clone()))?;
        if entry.sender.send(Ok(response)).is_err() {
            debug!(request_id = %request_id, "Caller went away before the response arrived");
        }
        Ok(())
    }

    /// Fail one call; returns `false` when it was not pending.
    pub fn fail(&self, request_id: &str, error: RpcError) -> bool {
        match self.pending.remove(request_id) {
            Some((_, entry)) => {
                let _ = entry.sender.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Drop an entry without completing it.
    pub fn remove(&self, request_id: &str) -> bool {
        self.pending.remove(request_id).is_some()
    }

    /// Fail every call sent on `channel` with [`RpcError::ConnectionClosed`].
    pub fn fail_all_for(&self, channel: ChannelId) -> usize {
        let ids: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| entry.value().channel == channel)
            .map(|entry| entry.key().clone())
            .collect();

        ids.iter()
            .filter(|id| self.fail(id, RpcError::ConnectionClosed))
            .count()
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
