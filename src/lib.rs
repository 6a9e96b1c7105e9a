//! # netrpc
//!
//! Transport core for a registry-driven RPC framework.
//!
//! - A length-prefixed binary frame with a fixed 16-byte header ([`core`])
//! - A pooled client transport that correlates responses by request id and keeps
//!   idle connections alive with heartbeats ([`transport::client`])
//! - A server transport dispatching calls to published services on a bounded
//!   worker pool ([`transport::server`])
//! - A registry cache over a coordination store, invalidated by child watches ([`registry`])
//! - Pluggable load balancing: weighted random, smooth round robin, consistent
//!   hashing and least active ([`loadbalance`])
//!
//! ## Example
//! ```rust,no_run
//! use netrpc::config::RpcConfig;
//! use netrpc::context::RpcContext;
//! use netrpc::protocol::message::RpcServiceProperties;
//! use netrpc::protocol::provider::RpcService;
//! use netrpc::service::proxy::RpcClientProxy;
//! use netrpc::transport::client::RpcClient;
//! use netrpc::transport::server::RpcServer;
//! use std::sync::Arc;
//!
//! # async fn demo() -> netrpc::error::Result<()> {
//! let context = RpcContext::in_memory(RpcConfig::default())?;
//!
//! let server = Arc::new(RpcServer::bind(context.clone()).await?);
//! let hello = RpcService::builder("Hello")
//!     .method("hello", |name: String| format!("Hello, {name}"))
//!     .build();
//! server.register_service(hello, "test1", "version1")?;
//! let running = server.clone();
//! tokio::spawn(async move { running.run().await });
//!
//! let client = Arc::new(RpcClient::new(context)?);
//! let proxy = RpcClientProxy::new(client, RpcServiceProperties::new("Hello", "test1", "version1"));
//! let greeting: String = proxy.invoke("hello", &"world".to_string()).await?;
//! assert_eq!(greeting, "Hello, world");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod extension;
pub mod loadbalance;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::RpcConfig;
pub use context::RpcContext;
pub use error::{Result, RpcError};
pub use protocol::message::{RpcRequest, RpcResponse, RpcServiceProperties};
pub use protocol::provider::RpcService;
pub use service::proxy::RpcClientProxy;
pub use transport::client::RpcClient;
pub use transport::server::RpcServer;
