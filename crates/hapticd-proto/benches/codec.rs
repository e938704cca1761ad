//! Benchmarks for the wire codec.
//!
//! Run with: cargo bench -p hapticd-proto
//! Results are saved to target/criterion/

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use hapticd_proto::{deserialize, serialize};
use hapticd_types::{
    DeviceAdded, DeviceInfo, DeviceList, DeviceMessages, Message, MessageAttributes,
    SpeedSubcommand, VibrateCmd,
};

fn make_device(index: u32) -> DeviceInfo {
    let mut messages = DeviceMessages::new();
    messages.insert("StopDeviceCmd".to_string(), MessageAttributes::default());
    messages.insert("VibrateCmd".to_string(), MessageAttributes::with_features(2));
    messages.insert("RotateCmd".to_string(), MessageAttributes::with_features(1));
    DeviceInfo {
        device_name: format!("Device {index}"),
        device_index: index,
        device_display_name: None,
        device_message_timing_gap: 50,
        device_messages: messages,
    }
}

fn vibrate_batch_text(count: u32) -> String {
    let messages: Vec<Message> = (1..=count)
        .map(|id| {
            VibrateCmd::new(
                id,
                id % 4,
                vec![
                    SpeedSubcommand { index: 0, speed: 0.5 },
                    SpeedSubcommand { index: 1, speed: 0.25 },
                ],
            )
            .map(Message::from)
        })
        .collect::<Result<_, _>>()
        .unwrap_or_default();
    serialize(&messages, 3).text
}

fn bench_deserialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("deserialize");

    for count in [1_u32, 16, 256] {
        let text = vibrate_batch_text(count);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("vibrate", count), &text, |b, text| {
            b.iter(|| deserialize(black_box(text)));
        });
    }

    group.finish();
}

fn bench_serialize_downgrade(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize");

    let list: Message = DeviceList {
        id: 1,
        devices: (1..=32).map(make_device).collect(),
    }
    .into();
    let added: Vec<Message> = (1..=32)
        .map(|i| DeviceAdded::from_info(0, make_device(i)).into())
        .collect();

    for target in [3_u32, 1, 0] {
        group.bench_with_input(
            BenchmarkId::new("device_list", target),
            &target,
            |b, &target| {
                b.iter(|| serialize(black_box(std::slice::from_ref(&list)), target));
            },
        );
        group.bench_with_input(
            BenchmarkId::new("device_added_x32", target),
            &target,
            |b, &target| {
                b.iter(|| serialize(black_box(&added), target));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_deserialize, bench_serialize_downgrade);
criterion_main!(benches);
