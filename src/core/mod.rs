//! # Core Protocol Components
//!
//! Frame layout, the tokio codec that frames it over byte streams, and body serializers.
//!
//! ## Components
//! - **Frame**: header constants, message types and the decoded [`frame::RpcMessage`]
//! - **Codec**: `tokio-util` Decoder/Encoder with length backpatching
//! - **Serialization**: bincode and JSON body serializers, parameter blob helpers
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(1)] [FullLength(4)] [Type(1)] [Codec(1)] [Compress(1)] [RequestId(4)] [Body(N)]
//! ```
//!
//! ## Security
//! - Maximum frame size: 8 MiB (prevents memory exhaustion)
//! - Magic bytes prevent accidental misinterpretation
//! - Length validation before allocation

pub mod codec;
pub mod frame;
pub mod serialization;
