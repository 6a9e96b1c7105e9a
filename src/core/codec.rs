//! # Frame Codec
//!
//! Tokio codec turning a byte stream into [`RpcMessage`]s and back.
//!
//! Decoding buffers until the full frame length announced in the header is available,
//! so TCP coalescing and fragmentation are both handled by `Framed`. Magic number,
//! version and length are checked as soon as their bytes arrive; a bad value is a
//! protocol violation and the stream ends there instead of skipping bytes.
//!
//! Encoding serializes and compresses the body into a pooled scratch buffer, then
//! writes the header with a zero length, appends the body and backpatches the length.

use crate::core::frame::{
    MessageBody, MessageType, RpcMessage, HEAD_LENGTH, LENGTH_FIELD_OFFSET, MAGIC_NUMBER,
    MAX_FRAME_LENGTH, VERSION,
};
use crate::error::{Result, RpcError};
use crate::extension::Extensions;
use crate::utils::buffer_pool::BufferPool;
use bytes::{Buf, BufMut, BytesMut};
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Codec for RPC frames, resolving serializers and compressors through [`Extensions`]
#[derive(Clone)]
pub struct RpcMessageCodec {
    extensions: Arc<Extensions>,
    buffers: BufferPool,
    max_frame_length: usize,
}

impl RpcMessageCodec {
    pub fn new(extensions: Arc<Extensions>) -> Self {
        Self::with_max_frame_length(extensions, MAX_FRAME_LENGTH)
    }

    /// Codec with a custom frame limit, clamped to at most [`MAX_FRAME_LENGTH`]
    pub fn with_max_frame_length(extensions: Arc<Extensions>, max_frame_length: usize) -> Self {
        Self {
            extensions,
            buffers: BufferPool::default(),
            max_frame_length: max_frame_length.clamp(HEAD_LENGTH, MAX_FRAME_LENGTH),
        }
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Validate whatever header bytes have arrived so far.
    ///
    /// Returns the full frame length once it is readable.
    fn check_header(&self, src: &BytesMut) -> Result<Option<usize>> {
        let available = src.len().min(MAGIC_NUMBER.len());
        if src[..available] != MAGIC_NUMBER[..available] {
            let mut magic = [0u8; 4];
            magic[..available].copy_from_slice(&src[..available]);
            return Err(RpcError::InvalidMagic(magic));
        }

        if src.len() > 4 && src[4] != VERSION {
            return Err(RpcError::UnsupportedVersion(src[4]));
        }

        if src.len() < LENGTH_FIELD_OFFSET + 4 {
            return Ok(None);
        }

        let mut length = [0u8; 4];
        length.copy_from_slice(&src[LENGTH_FIELD_OFFSET..LENGTH_FIELD_OFFSET + 4]);
        let full_length = u32::from_be_bytes(length) as usize;

        if full_length < HEAD_LENGTH {
            return Err(RpcError::InvalidFrameLength(full_length));
        }
        if full_length > self.max_frame_length {
            return Err(RpcError::OversizedFrame(full_length));
        }
        Ok(Some(full_length))
    }

    fn decode_body(&self, kind: MessageType, codec: u8, compress: u8, body: &[u8]) -> Result<MessageBody> {
        match kind {
            MessageType::HeartbeatPing => return Ok(MessageBody::Ping),
            MessageType::HeartbeatPong => return Ok(MessageBody::Pong),
            MessageType::Request | MessageType::Response => {}
        }

        if body.is_empty() {
            return Err(RpcError::MissingBody);
        }

        let compressor = self.extensions.compressor(compress)?;
        let serializer = self.extensions.serializer(codec)?;
        let raw = compressor.decompress(body)?;
        serializer.deserialize(kind, &raw)
    }
}

impl Decoder for RpcMessageCodec {
    type Item = RpcMessage;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }

        let full_length = match self.check_header(src) {
            Ok(Some(length)) => length,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "Rejecting malformed frame");
                return Err(e);
            }
        };

        if src.len() < full_length {
            src.reserve(full_length - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(full_length);
        frame.advance(LENGTH_FIELD_OFFSET + 4);
        let kind = MessageType::from_code(frame.get_u8())?;
        let codec = frame.get_u8();
        let compress = frame.get_u8();
        let request_id = frame.get_u32();

        let body = self.decode_body(kind, codec, compress, &frame)?;
        Ok(Some(RpcMessage::new(codec, compress, request_id, body)))
    }
}

impl Encoder<RpcMessage> for RpcMessageCodec {
    type Error = RpcError;

    fn encode(&mut self, item: RpcMessage, dst: &mut BytesMut) -> Result<()> {
        let mut scratch = self.buffers.acquire();
        if !item.message_type().is_heartbeat() {
            let serializer = self.extensions.serializer(item.codec)?;
            let compressor = self.extensions.compressor(item.compress)?;
            serializer.serialize(&item.body, &mut scratch)?;
            // receivers bound decompressed bodies by the same limit
            if scratch.len() > MAX_FRAME_LENGTH {
                return Err(RpcError::OversizedFrame(HEAD_LENGTH + scratch.len()));
            }
            let compressed = compressor.compress(&scratch)?;
            scratch.clear();
            scratch.extend_from_slice(&compressed);
        }

        let full_length = HEAD_LENGTH + scratch.len();
        if full_length > self.max_frame_length {
            return Err(RpcError::OversizedFrame(full_length));
        }

        let start = dst.len();
        dst.reserve(full_length);
        dst.put_slice(&MAGIC_NUMBER);
        dst.put_u8(VERSION);
        dst.put_u32(0);
        dst.put_u8(item.message_type().code());
        dst.put_u8(item.codec);
        dst.put_u8(item.compress);
        dst.put_u32(item.request_id);
        dst.put_slice(&scratch);

        let length_at = start + LENGTH_FIELD_OFFSET;
        dst[length_at..length_at + 4].copy_from_slice(&(full_length as u32).to_be_bytes());
        Ok(())
    }
}
