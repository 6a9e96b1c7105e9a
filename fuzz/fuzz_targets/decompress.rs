#![no_main]

use libfuzzer_sys::fuzz_target;
use netrpc::utils::compression::{Compressor, Lz4Compressor, ZstdCompressor};

fuzz_target!(|data: &[u8]| {
    let lz4 = Lz4Compressor;
    let zstd = ZstdCompressor::default();

    // Raw input exercises the size guards on malformed streams
    let _ = lz4.decompress(data);
    let _ = zstd.decompress(data);

    if data.len() <= 1 << 20 {
        if let Ok(compressed) = lz4.compress(data) {
            assert_eq!(lz4.decompress(&compressed).ok().as_deref(), Some(data));
        }
    }
});
