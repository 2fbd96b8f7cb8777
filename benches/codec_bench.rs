use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use multiuser_server::core::codec::{FrameCodec, MessageCodec};
use multiuser_server::core::packet::Frame;
use multiuser_server::core::proplist::PropList;
use multiuser_server::core::value::Value;
use multiuser_server::protocol::message::Message;
use multiuser_server::utils::crypto::FrameCipher;
use tokio_util::codec::{Decoder, Encoder};

fn sample_value(items: usize) -> Value {
    Value::List(
        (0..items)
            .map(|i| {
                PropList::new()
                    .with("id", i as i32)
                    .with("name", format!("player-{i}"))
                    .with("pos", Value::Point { x: i as i32, y: -(i as i32) })
                    .into()
            })
            .collect(),
    )
}

#[allow(clippy::unwrap_used)]
fn bench_value_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_encode_decode");

    for &items in &[1usize, 16, 256] {
        let value = sample_value(items);
        let bytes = value.encode();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_function(format!("encode_{items}_items"), |b| {
            b.iter(|| value.encode())
        });
        group.bench_function(format!("decode_{items}_items"), |b| {
            b.iter(|| Value::decode(&bytes, 0).unwrap())
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_codec");
    let key = b"benchmark-key";

    for &size in &[64usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(size as u64));

        for encrypted in [false, true] {
            let label = if encrypted { "cipher" } else { "plain" };
            let codec = move || {
                if encrypted {
                    FrameCodec::with_cipher(FrameCipher::new(key).unwrap())
                } else {
                    FrameCodec::new()
                }
            };

            group.bench_function(format!("encode_{label}_{size}b"), |b| {
                let mut enc = codec();
                b.iter_batched(
                    || vec![7u8; size],
                    |payload| {
                        let mut buf = BytesMut::with_capacity(size + 16);
                        enc.encode(Frame::new(payload), &mut buf).unwrap();
                    },
                    BatchSize::SmallInput,
                )
            });

            let mut stream = BytesMut::new();
            codec()
                .encode(Frame::new(vec![7u8; size]), &mut stream)
                .unwrap();
            group.bench_function(format!("decode_{label}_{size}b"), |b| {
                let mut dec = codec();
                b.iter_batched(
                    || stream.clone(),
                    |mut buf| {
                        let frame = dec.decode(&mut buf).unwrap();
                        assert!(frame.is_some());
                    },
                    BatchSize::SmallInput,
                )
            });
        }
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_message_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_roundtrip");
    let msg = Message::new(
        "move",
        "player-1",
        vec!["@Table7".to_string()],
        sample_value(4),
    );

    group.bench_function("encode_decode", |b| {
        let mut encoder = MessageCodec::new(FrameCodec::new());
        let mut decoder = MessageCodec::new(FrameCodec::new());
        b.iter_batched(
            || msg.clone(),
            |msg| {
                let mut buf = BytesMut::new();
                encoder.encode(msg, &mut buf).unwrap();
                decoder.decode(&mut buf).unwrap().unwrap()
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_value_encode_decode,
    bench_frame_codec,
    bench_message_roundtrip
);
criterion_main!(benches);
