#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Concurrent calls sharing one client and one connection, and concurrent
//! frame encoding.

use bytes::BytesMut;
use netrpc::config::RpcConfig;
use netrpc::context::RpcContext;
use netrpc::core::codec::RpcMessageCodec;
use netrpc::core::frame::{MessageBody, RpcMessage};
use netrpc::extension::Extensions;
use netrpc::protocol::message::{RpcResponse, RpcServiceProperties};
use netrpc::protocol::provider::RpcService;
use netrpc::registry::store::MemoryStore;
use netrpc::service::proxy::RpcClientProxy;
use netrpc::transport::client::RpcClient;
use netrpc::transport::server::RpcServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::codec::{Decoder, Encoder};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_are_correlated() {
    let store = Arc::new(MemoryStore::new());
    let server_context = RpcContext::new(
        RpcConfig::default_with_overrides(|c| {
            c.server.port = 0;
            c.server.worker_threads = 8;
        }),
        store.clone(),
    )
    .unwrap();
    let server = Arc::new(RpcServer::bind(server_context).await.unwrap());
    let echo = RpcService::builder("Echo")
        .method("echo", |n: u64| {
            // uneven service times make responses overtake each other
            std::thread::sleep(Duration::from_millis(n % 7));
            n * 2
        })
        .build();
    server.register_service(echo, "", "").unwrap();

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let running = server.clone();
    let serve = tokio::spawn(async move {
        running
            .run_until(async {
                let _ = stopped.await;
            })
            .await
    });

    let client_context = RpcContext::new(RpcConfig::default(), store).unwrap();
    let client = Arc::new(RpcClient::new(client_context).unwrap());
    let proxy = RpcClientProxy::new(client.clone(), RpcServiceProperties::new("Echo", "", ""));

    let mut calls = JoinSet::new();
    for n in 0..200u64 {
        let proxy = proxy.clone();
        calls.spawn(async move { (n, proxy.invoke::<u64, u64>("echo", &n).await) });
    }
    while let Some(joined) = calls.join_next().await {
        let (n, result) = joined.unwrap();
        assert_eq!(result.unwrap(), n * 2);
    }

    assert!(client.pending().is_empty());
    assert_eq!(client.channels().len(), 1);
    assert_eq!(client.metrics().snapshot().calls_succeeded, 200);

    let _ = stop.send(());
    serve.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_encode_decode_heavy() {
    let extensions = Arc::new(Extensions::with_codecs());
    let payload_sizes = [0usize, 64, 512, 4096, 65536];

    let mut tasks = JoinSet::new();
    for &size in &payload_sizes {
        let extensions = extensions.clone();
        tasks.spawn(async move {
            let mut codec = RpcMessageCodec::new(extensions);
            let mut buf = BytesMut::new();
            for i in 0..2_000u32 {
                let data = vec![((i as usize + size) & 0xFF) as u8; size];
                let message = RpcMessage::response(
                    1,
                    (i % 3) as u8,
                    i,
                    RpcResponse::success(Some(data.clone()), i.to_string()),
                );
                codec.encode(message, &mut buf).unwrap();
                let decoded = codec.decode(&mut buf).unwrap().unwrap();
                match decoded.body {
                    MessageBody::Response(r) => assert_eq!(r.data, Some(data)),
                    other => panic!("unexpected body: {other:?}"),
                }
                assert!(buf.is_empty());
            }
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }
}
