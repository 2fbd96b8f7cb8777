#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use multiuser_server::core::codec::FrameCodec;
use multiuser_server::utils::crypto::FrameCipher;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // First byte picks plain or encrypted framing; the rest is the stream
    let Some((&mode, stream)) = data.split_first() else {
        return;
    };
    let mut codec = if mode & 1 == 0 {
        FrameCodec::new()
    } else {
        match FrameCipher::new(b"fuzz-key") {
            Ok(cipher) => FrameCodec::with_cipher(cipher),
            Err(_) => return,
        }
    };

    // Feed in uneven chunks to exercise partial headers and bodies
    let mut buf = BytesMut::new();
    for chunk in stream.chunks(usize::from(mode >> 1).max(1)) {
        buf.extend_from_slice(chunk);
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }
});
