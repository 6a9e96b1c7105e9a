//! # Frame Layout
//!
//! Constants and in-memory representation of one wire frame.
//!
//! ```text
//! 0      4    5            9     10     11       12          16
//! +------+----+------------+-----+------+--------+-----------+--------+
//! |magic |ver | full length|type |codec |compress| request id|  body  |
//! | (4)  |(1) |   (4, BE)  | (1) | (1)  |  (1)   |   (4, BE) |  (N)   |
//! +------+----+------------+-----+------+--------+-----------+--------+
//! ```
//!
//! The length field counts the header too. Heartbeat frames have no body on the
//! wire; their `"ping"`/`"pong"` payload is implied by the message type.

use crate::error::{Result, RpcError};
use crate::protocol::message::{RpcRequest, RpcResponse};

/// Identifies our frames on the wire
pub const MAGIC_NUMBER: [u8; 4] = *b"grpc";

/// Wire protocol version
pub const VERSION: u8 = 1;

/// Fixed header length in bytes
pub const HEAD_LENGTH: usize = 16;

/// Offset of the big-endian full-length field
pub const LENGTH_FIELD_OFFSET: usize = 5;

/// Upper bound on header + body
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Payload implied by a heartbeat ping
pub const PING: &str = "ping";

/// Payload implied by a heartbeat pong
pub const PONG: &str = "pong";

/// Frame type carried in byte 9
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Request = 1,
    Response = 2,
    HeartbeatPing = 3,
    HeartbeatPong = 4,
}

impl MessageType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(MessageType::Request),
            2 => Ok(MessageType::Response),
            3 => Ok(MessageType::HeartbeatPing),
            4 => Ok(MessageType::HeartbeatPong),
            other => Err(RpcError::UnknownMessageType(other)),
        }
    }

    pub fn is_heartbeat(self) -> bool {
        matches!(self, MessageType::HeartbeatPing | MessageType::HeartbeatPong)
    }
}

/// Decoded frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Request(RpcRequest),
    Response(RpcResponse),
    Ping,
    Pong,
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Request(_) => MessageType::Request,
            MessageBody::Response(_) => MessageType::Response,
            MessageBody::Ping => MessageType::HeartbeatPing,
            MessageBody::Pong => MessageType::HeartbeatPong,
        }
    }
}

/// One frame: header fields plus decoded body.
///
/// The message type is derived from the body so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcMessage {
    pub codec: u8,
    pub compress: u8,
    pub request_id: u32,
    pub body: MessageBody,
}

impl RpcMessage {
    pub fn new(codec: u8, compress: u8, request_id: u32, body: MessageBody) -> Self {
        Self {
            codec,
            compress,
            request_id,
            body,
        }
    }

    pub fn request(codec: u8, compress: u8, request_id: u32, request: RpcRequest) -> Self {
        Self::new(codec, compress, request_id, MessageBody::Request(request))
    }

    pub fn response(codec: u8, compress: u8, request_id: u32, response: RpcResponse) -> Self {
        Self::new(codec, compress, request_id, MessageBody::Response(response))
    }

    pub fn ping(codec: u8, compress: u8, request_id: u32) -> Self {
        Self::new(codec, compress, request_id, MessageBody::Ping)
    }

    pub fn pong(codec: u8, compress: u8, request_id: u32) -> Self {
        Self::new(codec, compress, request_id, MessageBody::Pong)
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Fixed heartbeat payload, if this is a heartbeat
    pub fn heartbeat_payload(&self) -> Option<&'static str> {
        match self.body {
            MessageBody::Ping => Some(PING),
            MessageBody::Pong => Some(PONG),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_codes() {
        for kind in [
            MessageType::Request,
            MessageType::Response,
            MessageType::HeartbeatPing,
            MessageType::HeartbeatPong,
        ] {
            assert!(matches!(MessageType::from_code(kind.code()), Ok(k) if k == kind));
        }
        assert!(matches!(
            MessageType::from_code(9),
            Err(RpcError::UnknownMessageType(9))
        ));
    }

    #[test]
    fn heartbeats_imply_payload() {
        let ping = RpcMessage::ping(1, 0, 7);
        assert_eq!(ping.message_type(), MessageType::HeartbeatPing);
        assert_eq!(ping.heartbeat_payload(), Some("ping"));
        assert_eq!(RpcMessage::pong(1, 0, 7).heartbeat_payload(), Some("pong"));
        assert!(MessageType::HeartbeatPong.is_heartbeat());
        assert!(!MessageType::Request.is_heartbeat());
    }
}
