//! # Service Registry
//!
//! Registration and discovery on top of a hierarchical coordination store.
//!
//! ## Layout
//! ```text
//! /<root>/<serviceName><group><version>/<host:port>   data = weight (UTF-8 decimal)
//! ```
//!
//! ## Components
//! - **Store**: the [`store::CoordinationStore`] surface and an in-memory implementation
//! - **Cache**: watched, generation-tagged address lists and a weight cache
//! - **Service Registry**: idempotent registration and shutdown cleanup
//! - **Discovery**: cache lookup plus load-balanced address selection

pub mod cache;
pub mod discovery;
pub mod service_registry;
pub mod store;
