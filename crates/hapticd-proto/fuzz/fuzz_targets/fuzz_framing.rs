#![no_main]

use bytes::BytesMut;
use hapticd_proto::JsonArrayCodec;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Feed the stream in two chunks to exercise resumed scanning.
    let split = data.len() / 2;
    let mut codec = JsonArrayCodec::new();
    let mut buf = BytesMut::from(&data[..split]);
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
    buf.extend_from_slice(&data[split..]);
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
});
