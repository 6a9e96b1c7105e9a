//! # Serialization Formats
//!
//! Body serializers selected by the frame's codec id.
//!
//! Supports bincode (default) and JSON (debugging/interop). The frame header names the
//! format with a single byte; [`SerializationType`] maps it to an extension name and the
//! extension registry hands back a [`Serializer`].
//!
//! ## Parameter blobs
//! Call parameters and return values travel as opaque byte blobs inside the request and
//! response. They are always bincode, independent of the frame codec, so a service can be
//! invoked the same way whatever format its envelope uses. [`to_blob`] and [`from_blob`]
//! produce and read them.

use crate::core::frame::{MessageBody, MessageType, MAX_FRAME_LENGTH};
use crate::error::{Result, RpcError};
use crate::protocol::message::{RpcRequest, RpcResponse};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Codec ids carried in byte 10 of the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializationType {
    /// Binary compact format (default, fastest)
    #[default]
    Bincode = 0x01,
    /// Human-readable JSON format (debugging, interop)
    Json = 0x02,
}

impl SerializationType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(SerializationType::Bincode),
            0x02 => Some(SerializationType::Json),
            _ => None,
        }
    }

    /// Extension name for this id
    pub fn name(self) -> &'static str {
        match self {
            SerializationType::Bincode => "bincode",
            SerializationType::Json => "json",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bincode" => Some(SerializationType::Bincode),
            "json" => Some(SerializationType::Json),
            _ => None,
        }
    }
}

/// Serialization capability consumed by the frame codec
pub trait Serializer: Send + Sync {
    /// Append the encoded request or response to `out`.
    fn serialize(&self, body: &MessageBody, out: &mut Vec<u8>) -> Result<()>;

    /// Decode a request or response body according to `kind`.
    fn deserialize(&self, kind: MessageType, bytes: &[u8]) -> Result<MessageBody>;
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_FRAME_LENGTH as u64)
}

/// Encode a parameter or return value blob
pub fn to_blob<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    bincode_options()
        .serialize(value)
        .map_err(|e| RpcError::Serialize(e.to_string()))
}

/// Decode a parameter or return value blob
pub fn from_blob<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode_options()
        .deserialize(bytes)
        .map_err(|e| RpcError::Deserialize(e.to_string()))
}

fn heartbeat_has_no_body(kind: MessageType) -> RpcError {
    RpcError::Deserialize(format!("{kind:?} frames carry no serialized body"))
}

/// Bincode envelope serializer
#[derive(Debug, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn serialize(&self, body: &MessageBody, out: &mut Vec<u8>) -> Result<()> {
        let encoded = match body {
            MessageBody::Request(request) => bincode_options().serialize_into(out, request),
            MessageBody::Response(response) => bincode_options().serialize_into(out, response),
            MessageBody::Ping | MessageBody::Pong => {
                return Err(heartbeat_has_no_body(body.message_type()))
            }
        };
        encoded.map_err(|e| RpcError::Serialize(e.to_string()))
    }

    fn deserialize(&self, kind: MessageType, bytes: &[u8]) -> Result<MessageBody> {
        match kind {
            MessageType::Request => Ok(MessageBody::Request(from_blob::<RpcRequest>(bytes)?)),
            MessageType::Response => Ok(MessageBody::Response(from_blob::<RpcResponse>(bytes)?)),
            other => Err(heartbeat_has_no_body(other)),
        }
    }
}

/// JSON envelope serializer
#[derive(Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, body: &MessageBody, out: &mut Vec<u8>) -> Result<()> {
        let encoded = match body {
            MessageBody::Request(request) => serde_json::to_writer(out, request),
            MessageBody::Response(response) => serde_json::to_writer(out, response),
            MessageBody::Ping | MessageBody::Pong => {
                return Err(heartbeat_has_no_body(body.message_type()))
            }
        };
        encoded.map_err(|e| RpcError::Serialize(e.to_string()))
    }

    fn deserialize(&self, kind: MessageType, bytes: &[u8]) -> Result<MessageBody> {
        let decoded = match kind {
            MessageType::Request => serde_json::from_slice(bytes).map(MessageBody::Request),
            MessageType::Response => serde_json::from_slice(bytes).map(MessageBody::Response),
            other => return Err(heartbeat_has_no_body(other)),
        };
        decoded.map_err(|e| RpcError::Deserialize(e.to_string()))
    }
}
