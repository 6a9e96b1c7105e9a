//! # Utility Modules
//!
//! Supporting pieces shared by the client and server transports.
//!
//! ## Components
//! - **Compression**: LZ4 and Zstd body compressors selected by frame compression id
//! - **Buffer Pool**: scoped scratch buffers for body encoding
//! - **Logging**: `tracing-subscriber` setup
//! - **Metrics**: per-transport atomic counters
//! - **Timeout**: default deadlines
//! - **Worker Pool**: bounded executors for business dispatch

pub mod buffer_pool;
pub mod compression;
pub mod logging;
pub mod metrics;
pub mod timeout;
pub mod worker_pool;
