// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::core::codec::RpcMessageCodec;
use crate::core::frame::{MessageBody, RpcMessage};
use crate::core::serialization::{to_blob, SerializationType};
use crate::extension::Extensions;
use crate::protocol::handler::RpcRequestHandler;
use crate::protocol::message::{RpcRequest, ResponseCode};
use crate::protocol::provider::{param_type_names, RpcService, ServiceProvider};
use crate::utils::compression::CompressType;
use bytes::BytesMut;
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

fn calculator() -> Arc<ServiceProvider> {
    let provider = Arc::new(ServiceProvider::new());
    provider.publish(
        RpcService::builder("Calculator")
            .method("add", |(a, b): (i64, i64)| a + b)
            .build(),
        "",
        "",
    );
    provider
}

#[test]
fn test_request_survives_wire_and_dispatch() {
    let extensions = Arc::new(Extensions::with_codecs());
    let mut client_codec = RpcMessageCodec::new(extensions.clone());
    let mut server_codec = RpcMessageCodec::new(extensions);
    let handler = RpcRequestHandler::new(calculator());

    for (codec, compress) in [
        (SerializationType::Bincode, CompressType::None),
        (SerializationType::Json, CompressType::Lz4),
        (SerializationType::Bincode, CompressType::Zstd),
    ] {
        // =================== Client sends ===================
        let request = RpcRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            interface_name: "Calculator".into(),
            method_name: "add".into(),
            param_types: param_type_names::<(i64, i64)>(),
            parameters: to_blob(&(40i64, 2i64)).unwrap(),
            group: String::new(),
            version: String::new(),
        };
        let mut wire = BytesMut::new();
        client_codec
            .encode(
                RpcMessage::request(codec.code(), compress.code(), 11, request.clone()),
                &mut wire,
            )
            .expect("encode request");

        // =================== Server dispatches ===================
        let inbound = server_codec
            .decode(&mut wire)
            .expect("decode request")
            .expect("complete frame");
        let received = match inbound.body {
            MessageBody::Request(r) => r,
            other => panic!("Expected request, got {other:?}"),
        };
        assert_eq!(received, request);

        let response = handler.handle(&received);
        server_codec
            .encode(
                RpcMessage::response(inbound.codec, inbound.compress, inbound.request_id, response),
                &mut wire,
            )
            .expect("encode response");

        // =================== Client correlates ===================
        let outbound = client_codec
            .decode(&mut wire)
            .expect("decode response")
            .expect("complete frame");
        assert_eq!(outbound.request_id, 11);
        let response = match outbound.body {
            MessageBody::Response(r) => r,
            other => panic!("Expected response, got {other:?}"),
        };
        assert_eq!(response.request_id, request.request_id);
        assert_eq!(response.code, ResponseCode::Success);
        assert_eq!(response.decode_data::<i64>().unwrap(), 42);
    }
}

#[test]
fn test_coalesced_frames_decode_in_order() {
    let mut codec = RpcMessageCodec::new(Arc::new(Extensions::with_codecs()));
    let mut wire = BytesMut::new();
    codec.encode(RpcMessage::ping(1, 0, 1), &mut wire).unwrap();
    codec.encode(RpcMessage::pong(1, 0, 2), &mut wire).unwrap();
    codec.encode(RpcMessage::ping(1, 0, 3), &mut wire).unwrap();

    let ids: Vec<u32> = std::iter::from_fn(|| codec.decode(&mut wire).unwrap())
        .map(|m| m.request_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}
