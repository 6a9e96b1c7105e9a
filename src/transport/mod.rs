//! # Transport
//!
//! Client and server sides of the TCP transport.
//!
//! - [`client::RpcClient`] resolves a provider, reuses pooled connections and
//!   correlates responses through the pending table.
//! - [`server::RpcServer`] accepts connections and dispatches calls to published services.

pub mod channel;
pub mod channel_provider;
pub mod client;
pub mod pending;
pub mod server;
