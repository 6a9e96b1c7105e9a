#![allow(clippy::unwrap_used, clippy::uninlined_format_args)]

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use netrpc::core::codec::RpcMessageCodec;
use netrpc::core::frame::RpcMessage;
use netrpc::core::serialization::SerializationType;
use netrpc::extension::Extensions;
use netrpc::protocol::message::RpcRequest;
use netrpc::utils::compression::CompressType;
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

fn request(size: usize) -> RpcRequest {
    RpcRequest {
        request_id: "5c1b2a90-6c4e-4f5e-9f55-0a3f3c1f2d11".to_string(),
        interface_name: "github.javaguide.HelloService".to_string(),
        method_name: "hello".to_string(),
        param_types: vec!["hello::Hello".to_string()],
        parameters: (0..size).map(|i| (i % 251) as u8).collect(),
        group: "test1".to_string(),
        version: "version1".to_string(),
    }
}

fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");
    let codecs = [SerializationType::Bincode, SerializationType::Json];
    let compressions = [CompressType::None, CompressType::Lz4, CompressType::Zstd];

    for &size in &[64usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(size as u64));
        for codec_kind in codecs {
            for compress in compressions {
                let label = format!("{}_{}_{}b", codec_kind.name(), compress.name(), size);
                let message = RpcMessage::request(codec_kind.code(), compress.code(), 1, request(size));
                let mut codec = RpcMessageCodec::new(Arc::new(Extensions::with_codecs()));

                group.bench_function(format!("encode_{label}"), |b| {
                    let mut buf = BytesMut::with_capacity(size * 2);
                    b.iter(|| {
                        buf.clear();
                        codec.encode(black_box(message.clone()), &mut buf).unwrap();
                    })
                });

                let mut encoded = BytesMut::new();
                codec.encode(message.clone(), &mut encoded).unwrap();
                group.bench_function(format!("decode_{label}"), |b| {
                    b.iter(|| {
                        let mut buf = encoded.clone();
                        black_box(codec.decode(&mut buf).unwrap().unwrap());
                    })
                });
            }
        }
    }

    group.bench_function("heartbeat_roundtrip", |b| {
        let mut codec = RpcMessageCodec::new(Arc::new(Extensions::with_codecs()));
        let mut buf = BytesMut::with_capacity(16);
        b.iter(|| {
            codec.encode(RpcMessage::ping(1, 0, 7), &mut buf).unwrap();
            black_box(codec.decode(&mut buf).unwrap().unwrap());
        })
    });

    group.finish();
}

criterion_group!(benches, bench_frames);
criterion_main!(benches);
