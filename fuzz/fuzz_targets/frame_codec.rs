#![no_main]

use bytes::BytesMut;
use clipstream_transport::codec::FrameCodec;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Broker frames from an untrusted peer: bad length prefixes, oversized
    // frames, unknown opcodes, truncated bodies.
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from(data);

    loop {
        match codec.decode(&mut buf) {
            Ok(Some(_frame)) => continue,
            Ok(None) => break,
            Err(_) => break,
        }
    }
});
