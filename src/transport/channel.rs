//! # Client Channel
//!
//! One live client connection: a framed TCP stream driven by a writer task and a
//! reader task.
//!
//! ## Writer
//! Frames are queued with an acknowledgement so a failed write fails the call that
//! issued it. When nothing has been written for the heartbeat interval the writer
//! sends a ping; a ping that cannot be written closes the connection.
//!
//! ## Reader
//! Responses complete pending calls, pongs are only observed. When the stream ends
//! or yields a protocol error the channel goes inactive and every call still
//! sent on this connection fails with [`RpcError::ConnectionClosed`].

use crate::core::codec::RpcMessageCodec;
use crate::core::frame::{MessageBody, RpcMessage, MAX_FRAME_LENGTH};
use crate::core::serialization::SerializationType;
use crate::error::{Result, RpcError};
use crate::extension::Extensions;
use crate::transport::pending::{ChannelId, UnprocessedRequests};
use crate::utils::compression::CompressType;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::{CONNECT_TIMEOUT, HEARTBEAT_INTERVAL};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Outbound queue depth per connection
const OUTBOUND_CAPACITY: usize = 1024;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

type Outbound = (RpcMessage, oneshot::Sender<Result<()>>);
type FrameSink = SplitSink<Framed<TcpStream, RpcMessageCodec>, RpcMessage>;
type FrameStream = SplitStream<Framed<TcpStream, RpcMessageCodec>>;

/// Per-connection client settings
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Codec id written on outgoing frames
    pub codec: u8,
    /// Compression id written on outgoing frames
    pub compress: u8,
    pub max_frame_length: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            codec: SerializationType::Bincode.code(),
            compress: CompressType::Lz4.code(),
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }
}

/// Handle to one client connection
pub struct ClientChannel {
    id: ChannelId,
    address: SocketAddr,
    outbound: mpsc::Sender<Outbound>,
    active: Arc<AtomicBool>,
    next_id: AtomicU32,
    closed: CancellationToken,
    codec: u8,
    compress: u8,
}

impl std::fmt::Debug for ClientChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientChannel")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("active", &self.is_active())
            .finish()
    }
}

impl ClientChannel {
    /// Connect to `address` within `options.connect_timeout` and start the I/O tasks.
    #[instrument(skip(options, extensions, pending, metrics), fields(peer = %address))]
    pub async fn connect(
        address: SocketAddr,
        options: &ChannelOptions,
        extensions: Arc<Extensions>,
        pending: Arc<UnprocessedRequests>,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<Self>> {
        let stream = match tokio::time::timeout(options.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(error = %e, "Connect failed");
                return Err(RpcError::Io(e));
            }
            Err(_) => {
                warn!(timeout_ms = options.connect_timeout.as_millis() as u64, "Connect timed out");
                return Err(RpcError::ConnectTimeout(address));
            }
        };
        stream.set_nodelay(true)?;
        info!("The client has connected");
        metrics.connection_established();

        let codec = RpcMessageCodec::with_max_frame_length(extensions, options.max_frame_length);
        let (sink, frames) = Framed::new(stream, codec).split();
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let active = Arc::new(AtomicBool::new(true));
        let closed = CancellationToken::new();
        let id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(write_loop(
            address,
            sink,
            rx,
            options.clone(),
            active.clone(),
            closed.clone(),
            metrics.clone(),
        ));
        tokio::spawn(read_loop(
            id,
            address,
            frames,
            pending,
            active.clone(),
            closed.clone(),
            metrics,
        ));

        Ok(Arc::new(Self {
            id,
            address,
            outbound,
            active,
            next_id: AtomicU32::new(0),
            closed,
            codec: options.codec,
            compress: options.compress,
        }))
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.closed.is_cancelled()
    }

    /// Next frame-level request id on this connection
    pub fn next_request_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn codec(&self) -> u8 {
        self.codec
    }

    pub fn compress(&self) -> u8 {
        self.compress
    }

    /// Queue `message` and wait until it has been written.
    pub async fn send(&self, message: RpcMessage) -> Result<()> {
        if !self.is_active() {
            return Err(RpcError::ConnectionInactive(self.address));
        }
        let (ack, written) = oneshot::channel();
        self.outbound
            .send((message, ack))
            .await
            .map_err(|_| RpcError::ConnectionInactive(self.address))?;
        written
            .await
            .map_err(|_| RpcError::ConnectionInactive(self.address))?
    }

    /// Stop both I/O tasks; calls pending on this connection fail.
    pub fn close(&self) {
        self.closed.cancel();
    }
}

impl Drop for ClientChannel {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

async fn write_loop(
    address: SocketAddr,
    mut sink: FrameSink,
    mut rx: mpsc::Receiver<Outbound>,
    options: ChannelOptions,
    active: Arc<AtomicBool>,
    closed: CancellationToken,
    metrics: Arc<Metrics>,
) {
    let mut heartbeat_id = 0u32;
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            queued = rx.recv() => {
                let Some((message, ack)) = queued else { break };
                let result = sink.send(message).await;
                let fatal = matches!(result, Err(RpcError::Io(_)));
                if result.is_ok() {
                    metrics.frame_sent();
                }
                let _ = ack.send(result);
                if fatal {
                    warn!(peer = %address, "Write failed, closing connection");
                    break;
                }
            }
            _ = tokio::time::sleep(options.heartbeat_interval) => {
                heartbeat_id = heartbeat_id.wrapping_add(1);
                let ping = RpcMessage::ping(options.codec, options.compress, heartbeat_id);
                match sink.send(ping).await {
                    Ok(()) => {
                        debug!(peer = %address, "Write idle, heartbeat sent");
                        metrics.heartbeat_sent();
                        metrics.frame_sent();
                    }
                    Err(e) => {
                        warn!(peer = %address, error = %e, "Heartbeat failed, closing connection");
                        break;
                    }
                }
            }
        }
    }

    active.store(false, Ordering::Release);
    closed.cancel();
    let _ = sink.close().await;
}

async fn read_loop(
    id: ChannelId,
    address: SocketAddr,
    mut frames: FrameStream,
    pending: Arc<UnprocessedRequests>,
    active: Arc<AtomicBool>,
    closed: CancellationToken,
    metrics: Arc<Metrics>,
) {
    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break,
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(message)) => {
                metrics.frame_received();
                match message.body {
                    MessageBody::Response(response) => {
                        let request_id = response.request_id.clone();
                        if let Err(e) = pending.complete(response) {
                            metrics.correlation_error();
                            warn!(peer = %address, request_id = %request_id, error = %e, "Discarding response");
                        }
                    }
                    MessageBody::Pong => {
                        metrics.heartbeat_answered();
                        debug!(peer = %address, request_id = message.request_id, "Heartbeat answered");
                    }
                    other => {
                        warn!(peer = %address, kind = ?other.message_type(), "Unexpected frame from server");
                    }
                }
            }
            Some(Err(e)) => {
                if e.is_protocol_violation() {
                    metrics.protocol_error();
                }
                warn!(peer = %address, error = %e, "Closing connection after read error");
                break;
            }
            None => {
                info!(peer = %address, "Server closed the connection");
                break;
            }
        }
    }

    active.store(false, Ordering::Release);
    closed.cancel();
    let failed = pending.fail_all_for(id);
    if failed > 0 {
        warn!(peer = %address, failed, "Failed calls pending on closed connection");
    }
    metrics.connection_closed();
}
