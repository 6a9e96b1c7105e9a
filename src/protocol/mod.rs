//! # Protocol Layer
//!
//! Call bodies and server-side dispatch.
//!
//! ## Components
//! - **Message**: [`message::RpcRequest`], [`message::RpcResponse`] and the service key
//! - **Provider**: typed service builder and the process-local provider registry
//! - **Handler**: turns a request into a SUCCESS or FAIL response

pub mod handler;
pub mod message;
pub mod provider;

#[cfg(test)]
mod tests;
