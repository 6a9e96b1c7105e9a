#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use netrpc::core::codec::RpcMessageCodec;
use netrpc::extension::Extensions;
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

fuzz_target!(|data: &[u8]| {
    let mut codec = RpcMessageCodec::new(Arc::new(Extensions::with_codecs()));
    let mut buf = BytesMut::from(data);

    // Decode until the input is exhausted or rejected; every decoded frame must re-encode.
    while let Ok(Some(message)) = codec.decode(&mut buf) {
        let mut out = BytesMut::new();
        let _ = codec.encode(message, &mut out);
    }
});
