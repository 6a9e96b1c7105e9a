//! # RPC Server
//!
//! Accepts connections, decodes REQUEST frames, dispatches them on a bounded worker
//! pool and writes the responses back on the originating connection.
//!
//! ## Per connection
//! - A reader loop with an idle-read timeout; a silent peer is dropped.
//! - Pings are answered with a pong immediately, bypassing dispatch.
//! - Requests run on the shared `service-handler` worker pool, so a slow method
//!   never stalls frame decoding.
//! - A writer task drains responses from a channel. Responses may leave in any
//!   order; the client correlates them by request id. A response that cannot be
//!   encoded is replaced by a FAIL response; only an I/O error ends the writer.
//! - A protocol error (bad magic, version, length) closes the connection.

use crate::context::RpcContext;
use crate::core::codec::RpcMessageCodec;
use crate::core::frame::{MessageBody, RpcMessage};
use crate::error::{Result, RpcError};
use crate::extension::Extensions;
use crate::protocol::handler::RpcRequestHandler;
use crate::protocol::message::RpcResponse;
use crate::protocol::provider::{RpcService, ServiceProvider};
use crate::utils::metrics::Metrics;
use crate::utils::worker_pool::{default_pool_size, WorkerPool};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, warn};

/// Name of the dispatch worker pool
pub const SERVICE_HANDLER_POOL: &str = "service-handler";

/// Response queue depth per connection
const RESPONSE_CAPACITY: usize = 1024;

/// Everything a connection task needs, cloned per connection
#[derive(Clone)]
struct ConnectionShared {
    handler: RpcRequestHandler,
    pool: Arc<WorkerPool>,
    extensions: Arc<Extensions>,
    metrics: Arc<Metrics>,
    idle_timeout: Duration,
    max_frame_length: usize,
}

pub struct RpcServer {
    context: Arc<RpcContext>,
    provider: Arc<ServiceProvider>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    metrics: Arc<Metrics>,
}

impl RpcServer {
    /// Bind the configured host and port. Port 0 picks a free port.
    pub async fn bind(context: Arc<RpcContext>) -> Result<Self> {
        let server = &context.config().server;
        let address = format!("{}:{}", server.host, server.port);
        let listener = TcpListener::bind(&address).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "Server bound");

        Ok(Self {
            context,
            provider: Arc::new(ServiceProvider::new()),
            listener: Mutex::new(Some(listener)),
            local_addr,
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn provider(&self) -> &Arc<ServiceProvider> {
        &self.provider
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Publish `service` locally and register this server's address for it.
    pub fn register_service(&self, service: RpcService, group: &str, version: &str) -> Result<String> {
        let key = self.provider.publish(service, group, version);
        self.context.service_registry().register_service(
            &key,
            self.local_addr,
            self.context.config().server.weight,
        )?;
        Ok(key)
    }

    /// Serve until Ctrl-C, then deregister and drain workers.
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await
    }

    /// Serve until `shutdown` completes, then deregister and drain workers.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or_else(|| RpcError::Transport("server is already running".to_string()))?;

        let server = &self.context.config().server;
        let workers = match server.worker_threads {
            0 => default_pool_size(),
            n => n,
        };
        let shared = ConnectionShared {
            handler: RpcRequestHandler::new(self.provider.clone()),
            pool: self
                .context
                .worker_pools()
                .get_or_create(SERVICE_HANDLER_POOL, workers),
            extensions: self.context.extensions().clone(),
            metrics: self.metrics.clone(),
            idle_timeout: server.idle_read_timeout,
            max_frame_length: self.context.config().transport.max_frame_length,
        };

        info!(address = %self.local_addr, workers, "Server listening");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, shared).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                }
            }
        }

        drop(listener);
        self.context.shutdown(Some(self.local_addr)).await;
        self.metrics.log_metrics();
        Ok(())
    }
}

#[instrument(skip(stream, shared), fields(peer = %peer))]
async fn handle_connection(stream: TcpStream, peer: SocketAddr, shared: ConnectionShared) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }
    shared.metrics.connection_established();
    info!("Connection accepted");

    let codec = RpcMessageCodec::with_max_frame_length(shared.extensions.clone(), shared.max_frame_length);
    let (mut sink, mut frames) = Framed::new(stream, codec).split();
    let (responses, mut outbound) = mpsc::channel::<RpcMessage>(RESPONSE_CAPACITY);

    let writer_metrics = shared.metrics.clone();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let (codec, compress, frame_id) = (message.codec, message.compress, message.request_id);
            let call_id = match &message.body {
                MessageBody::Response(response) => Some(response.request_id.clone()),
                _ => None,
            };

            let mut result = sink.send(message).await;
            let encode_error = match &result {
                Err(e) if !matches!(e, RpcError::Io(_)) => Some(e.to_string()),
                _ => None,
            };
            if let (Some(error), Some(call_id)) = (encode_error, call_id) {
                // the codec rejected this frame before writing anything; answer FAIL instead
                warn!(peer = %peer, request_id = %call_id, error = %error, "Response could not be encoded");
                let fail = RpcResponse::fail(call_id, error);
                result = sink
                    .send(RpcMessage::response(codec, compress, frame_id, fail))
                    .await;
            }

            match result {
                Ok(()) => writer_metrics.frame_sent(),
                Err(RpcError::Io(e)) => {
                    warn!(peer = %peer, error = %e, "Failed to write response");
                    break;
                }
                Err(e) => warn!(peer = %peer, error = %e, "Dropped unencodable frame"),
            }
        }
        let _ = sink.close().await;
    });

    loop {
        let frame = match tokio::time::timeout(shared.idle_timeout, frames.next()).await {
            Ok(frame) => frame,
            Err(_) => {
                info!(idle_ms = shared.idle_timeout.as_millis() as u64, "Read idle, closing connection");
                break;
            }
        };

        let message = match frame {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                if e.is_protocol_violation() {
                    shared.metrics.protocol_error();
                }
                warn!(error = %e, "Closing connection after decode error");
                break;
            }
            None => {
                debug!("Peer closed the connection");
                break;
            }
        };
        shared.metrics.frame_received();

        let (codec, compress, frame_id) = (message.codec, message.compress, message.request_id);
        match message.body {
            MessageBody::Ping => {
                shared.metrics.heartbeat_answered();
                if responses
                    .send(RpcMessage::pong(codec, compress, frame_id))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            MessageBody::Request(request) => {
                let handler = shared.handler.clone();
                let pool = shared.pool.clone();
                let responses = responses.clone();
                tokio::spawn(async move {
                    let request_id = request.request_id.clone();
                    let response = match pool.execute(move || handler.handle(&request)).await {
                        Ok(response) => response,
                        Err(e) => RpcResponse::fail(request_id, e.to_string()),
                    };
                    let _ = responses
                        .send(RpcMessage::response(codec, compress, frame_id, response))
                        .await;
                });
            }
            other => {
                warn!(kind = ?other.message_type(), "Unexpected frame from client");
            }
        }
    }

    // the writer ends once in-flight dispatches drop their senders
    drop(responses);
    let _ = writer.await;
    shared.metrics.connection_closed();
    info!("Connection closed");
}
