//! # RPC Client
//!
//! Sends call requests to a discovered provider and hands back a future for the
//! response.
//!
//! ## Call path
//! 1. Resolve the target through the registry cache and configured load balancer.
//!    A missing provider fails here, before anything is sent.
//! 2. Reuse or open the channel for that address (bounded connect).
//! 3. Register the call in the pending table, then write the REQUEST frame. A
//!    failed write fails the call's future immediately.
//!
//! The returned [`ResponseFuture`] resolves when the matching response arrives,
//! the connection closes, or the request timeout elapses. Dropping it forgets the
//! pending entry.

use crate::context::RpcContext;
use crate::core::frame::RpcMessage;
use crate::core::serialization::SerializationType;
use crate::error::{Result, RpcError};
use crate::loadbalance::least_active::{ActiveCallGuard, ActiveCalls};
use crate::protocol::message::{RpcRequest, RpcResponse};
use crate::registry::discovery::ServiceDiscovery;
use crate::transport::channel::{ChannelOptions, ClientChannel};
use crate::transport::channel_provider::ChannelProvider;
use crate::transport::pending::UnprocessedRequests;
use crate::utils::compression::CompressType;
use crate::utils::metrics::Metrics;
use dashmap::DashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Sleep;
use tracing::{debug, instrument, warn};

pub struct RpcClient {
    context: Arc<RpcContext>,
    discovery: ServiceDiscovery,
    channels: ChannelProvider,
    connecting: DashMap<SocketAddr, Arc<Mutex<()>>>,
    pending: Arc<UnprocessedRequests>,
    active_calls: Arc<ActiveCalls>,
    options: ChannelOptions,
    request_timeout: Option<Duration>,
    metrics: Arc<Metrics>,
}

impl RpcClient {
    pub fn new(context: Arc<RpcContext>) -> Result<Self> {
        let client = &context.config().client;
        let codec = SerializationType::from_name(&client.codec)
            .ok_or_else(|| RpcError::Config(format!("Unknown codec: {}", client.codec)))?;
        let compress = CompressType::from_name(&client.compress)
            .ok_or_else(|| RpcError::Config(format!("Unknown compression: {}", client.compress)))?;
        // fail fast on an unknown strategy instead of on the first call
        context.extensions().load_balancer(&client.load_balance)?;

        let options = ChannelOptions {
            connect_timeout: client.connect_timeout,
            heartbeat_interval: client.heartbeat_interval,
            codec: codec.code(),
            compress: compress.code(),
            max_frame_length: context.config().transport.max_frame_length,
        };
        let request_timeout = (!client.request_timeout.is_zero()).then_some(client.request_timeout);
        let discovery = ServiceDiscovery::new(
            context.registry_cache().clone(),
            context.extensions().clone(),
            client.load_balance.clone(),
        );

        Ok(Self {
            discovery,
            channels: ChannelProvider::new(),
            connecting: DashMap::new(),
            pending: Arc::new(UnprocessedRequests::new()),
            active_calls: context.active_calls().clone(),
            options,
            request_timeout,
            metrics: Arc::new(Metrics::new()),
            context,
        })
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn pending(&self) -> &Arc<UnprocessedRequests> {
        &self.pending
    }

    pub fn channels(&self) -> &ChannelProvider {
        &self.channels
    }

    /// Send `request` and return a future for its response.
    #[instrument(skip(self, request), fields(service = %request.rpc_service_name(), request_id = %request.request_id))]
    pub async fn send_rpc_request(&self, request: RpcRequest) -> Result<ResponseFuture> {
        let address = self.discovery.lookup_service(&request)?;
        let active = self.active_calls.begin(&address.to_string());
        let channel = self.get_channel(address).await?;
        if !channel.is_active() {
            return Err(RpcError::ConnectionInactive(address));
        }

        let request_id = request.request_id.clone();
        let receiver = self.pending.put(&request_id, channel.id());
        let message = RpcMessage::request(
            channel.codec(),
            channel.compress(),
            channel.next_request_id(),
            request,
        );

        match channel.send(message).await {
            Ok(()) => debug!(peer = %address, "Request sent"),
            Err(e) => {
                warn!(peer = %address, error = %e, "Send failed");
                self.pending.fail(&request_id, e);
            }
        }

        Ok(ResponseFuture {
            request_id,
            receiver,
            deadline: self.request_timeout.map(|t| Box::pin(tokio::time::sleep(t))),
            pending: self.pending.clone(),
            metrics: self.metrics.clone(),
            active: Some(active),
        })
    }

    /// Existing live channel for `address`, or a new connection.
    pub async fn get_channel(&self, address: SocketAddr) -> Result<Arc<ClientChannel>> {
        if let Some(channel) = self.channels.get(&address) {
            return Ok(channel);
        }

        let lock = self
            .connecting
            .entry(address)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let _guard = lock.lock().await;

        if let Some(channel) = self.channels.get(&address) {
            return Ok(channel);
        }
        let channel = ClientChannel::connect(
            address,
            &self.options,
            self.context.extensions().clone(),
            self.pending.clone(),
            self.metrics.clone(),
        )
        .await?;
        self.channels.set(channel.clone());
        Ok(channel)
    }

    /// Close every connection; calls still pending fail.
    pub fn close(&self) {
        self.channels.close_all();
    }
}

/// Resolves to the response for one call
pub struct ResponseFuture {
    request_id: String,
    receiver: oneshot::Receiver<Result<RpcResponse>>,
    deadline: Option<Pin<Box<Sleep>>>,
    pending: Arc<UnprocessedRequests>,
    metrics: Arc<Metrics>,
    active: Option<ActiveCallGuard>,
}

impl ResponseFuture {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    fn finish(&mut self, outcome: Result<RpcResponse>) -> Poll<Result<RpcResponse>> {
        match &outcome {
            Ok(response) if response.is_success() => self.metrics.call_succeeded(),
            _ => self.metrics.call_failed(),
        }
        self.active.take();
        Poll::Ready(outcome)
    }
}

impl Future for ResponseFuture {
    type Output = Result<RpcResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Poll::Ready(delivered) = Pin::new(&mut self.receiver).poll(cx) {
            let outcome = delivered.unwrap_or(Err(RpcError::ConnectionClosed));
            return self.finish(outcome);
        }

        if let Some(deadline) = self.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                self.pending.remove(&self.request_id);
                warn!(request_id = %self.request_id, "Request timed out");
                let id = self.request_id.clone();
                return self.finish(Err(RpcError::RequestTimeout(id)));
            }
        }
        Poll::Pending
    }
}

impl Drop for ResponseFuture {
    fn drop(&mut self) {
        self.pending.remove(&self.request_id);
    }
}
