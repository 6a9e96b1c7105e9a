//! # Error Types
//!
//! Error handling for the RPC transport core.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! [`RpcError`]. Variants are grouped by how far the failure reaches:
//!
//! ## Error Categories
//! - **Protocol Errors**: bad magic number, bad version, oversize frame. Fatal for the connection.
//! - **Lookup Errors**: no provider registered for a service key. Raised before anything is sent.
//! - **Transport Errors**: connect/write failures, dropped connections. Fail only the affected call.
//! - **Correlation Errors**: a response for an unknown or already-completed request id.
//! - **Invocation Errors**: the target method failed or its parameters did not match.
//!
//! ## Example Usage
//! ```rust
//! use netrpc::error::{RpcError, Result};
//!
//! fn parse_port(raw: &str) -> Result<u16> {
//!     raw.parse::<u16>()
//!         .map_err(|_| RpcError::InvalidAddress(raw.to_string()))
//! }
//!
//! assert!(parse_port("9995").is_ok());
//! assert!(matches!(parse_port("x"), Err(RpcError::InvalidAddress(_))));
//! ```

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Registry errors
    pub const ERR_REGISTRY_UNAVAILABLE: &str = "Coordination store is unavailable";
    pub const ERR_NODE_EXISTS: &str = "Node already exists";
    pub const ERR_NO_NODE: &str = "Node does not exist";

    /// Invocation errors
    pub const ERR_SERVICE_INVOCATION_FAILURE: &str = "Service invocation failed";
}

/// Primary error type for all RPC operations.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Unknown magic code: {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("Version isn't compatible: {0}")]
    UnsupportedVersion(u8),

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Frame length {0} is shorter than the header")]
    InvalidFrameLength(usize),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("Unknown codec id: {0}")]
    UnknownCodec(u8),

    #[error("Unknown compression id: {0}")]
    UnknownCompression(u8),

    #[error("Frame body is required for this message type")]
    MissingBody,

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Deserialize error: {0}")]
    Deserialize(String),

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("No provider available for service: {0}")]
    NoProviderAvailable(String),

    #[error("Method not found: {service}.{method}")]
    MethodNotFound { service: String, method: String },

    #[error("Parameter mismatch for {method}: expected {expected:?}, got {actual:?}")]
    ParameterMismatch {
        method: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Invocation failed: {0}")]
    Invocation(String),

    #[error("Response does not match request: expected {expected}, got {actual}")]
    RequestMismatch { expected: String, actual: String },

    #[error("Call failed for {service} (request {request_id}): {message}")]
    CallFailed {
        service: String,
        request_id: String,
        message: String,
    },

    #[error("Unknown or already completed request: {0}")]
    UnknownRequest(String),

    #[error("Connect to {0} timed out")]
    ConnectTimeout(SocketAddr),

    #[error("Channel to {0} is not active")]
    ConnectionInactive(SocketAddr),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request {0} timed out")]
    RequestTimeout(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("No such extension of {capability}: {name}")]
    ExtensionNotFound { capability: String, name: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RpcError {
    /// Whether this error means the frame stream can no longer be trusted and the
    /// connection has to be closed.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            RpcError::InvalidMagic(_)
                | RpcError::UnsupportedVersion(_)
                | RpcError::OversizedFrame(_)
                | RpcError::InvalidFrameLength(_)
                | RpcError::UnknownMessageType(_)
        )
    }
}

impl From<bincode::Error> for RpcError {
    fn from(err: bincode::Error) -> Self {
        RpcError::Deserialize(err.to_string())
    }
}

/// Type alias for Results using RpcError
pub type Result<T> = std::result::Result<T, RpcError>;
