use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use vtdecode::sixel::SixelDecoder;
use vtdecode::utf8::decode_lossy;
use vtdecode::{sixel_decode, ParameterDecoder};

// Simple SIXEL test data
const SIMPLE_SIXEL: &[u8] = b"\x1bPq#0;2;100;0;0#0~~~\x1b\\";

// More complex pattern with colors
const COMPLEX_SIXEL: &[u8] = b"\x1bPq\
    #0;2;100;0;0#1;2;0;100;0#2;2;0;0;100\
    #0!10~#1!10~#2!10~-\
    #0!10@#1!10@#2!10@-\
    #0!10B#1!10B#2!10B\
    \x1b\\";

// SIXEL with repeat counts and multiple bands
const REPEATED_SIXEL: &[u8] = b"\x1bPq\
    #0;2;50;50;50\
    #0!50?!50@!50B!50F!50N!50^-\
    #0!50?!50@!50B!50F!50N!50^-\
    #0!50?!50@!50B!50F!50N!50^\
    \x1b\\";

fn bench_simple_decode(c: &mut Criterion) {
    c.bench_function("decode_simple_sixel", |b| {
        b.iter(|| {
            let result = sixel_decode(black_box(SIMPLE_SIXEL));
            assert!(result.is_ok());
            result
        })
    });
}

fn bench_complex_decode(c: &mut Criterion) {
    c.bench_function("decode_complex_sixel", |b| {
        b.iter(|| {
            let result = sixel_decode(black_box(COMPLEX_SIXEL));
            assert!(result.is_ok());
            result
        })
    });
}

fn bench_repeated_decode(c: &mut Criterion) {
    c.bench_function("decode_repeated_sixel", |b| {
        b.iter(|| {
            let result = sixel_decode(black_box(REPEATED_SIXEL));
            assert!(result.is_ok());
            result
        })
    });
}

/// Command stream only, with no rasterization.
fn bench_state_machine(c: &mut Criterion) {
    let payload = &REPEATED_SIXEL[3..REPEATED_SIXEL.len() - 2];
    c.bench_function("sixel_state_machine", |b| {
        let mut decoder = SixelDecoder::new();
        b.iter(|| {
            decoder.reset();
            decoder.feed(black_box(payload), &mut ());
            decoder.image_size()
        })
    });
}

fn bench_varying_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("varying_sizes");

    for size in [10, 50, 100, 200].iter() {
        let mut sixel_data = Vec::new();
        sixel_data.extend_from_slice(b"\x1bPq#0;2;100;0;0");

        // Generate bands of sixels
        for _ in 0..*size {
            sixel_data.extend_from_slice(b"#0!20~-");
        }
        sixel_data.extend_from_slice(b"\x1b\\");

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_bands", size)),
            &sixel_data,
            |b, data| {
                b.iter(|| {
                    let result = sixel_decode(black_box(data));
                    assert!(result.is_ok());
                    result
                })
            },
        );
    }

    group.finish();
}

fn bench_color_changes(c: &mut Criterion) {
    let mut group = c.benchmark_group("color_changes");

    for num_colors in [1, 4, 16, 64].iter() {
        let mut sixel_data = Vec::new();
        sixel_data.extend_from_slice(b"\x1bPq");

        // Define colors
        for i in 0..*num_colors {
            let r = (i * 100 / num_colors) % 100;
            let g = (i * 50) % 100;
            let b = (i * 75) % 100;
            sixel_data.extend_from_slice(format!("#{};2;{};{};{}", i, r, g, b).as_bytes());
        }

        // Use colors
        for i in 0..*num_colors {
            sixel_data.extend_from_slice(format!("#{}~~~", i).as_bytes());
        }

        sixel_data.extend_from_slice(b"\x1b\\");

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_colors", num_colors)),
            &sixel_data,
            |b, data| {
                b.iter(|| {
                    let result = sixel_decode(black_box(data));
                    assert!(result.is_ok());
                    result
                })
            },
        );
    }

    group.finish();
}

fn bench_utf8(c: &mut Criterion) {
    let mut group = c.benchmark_group("utf8");

    let ascii = "The quick brown fox jumps over the lazy dog. ".repeat(64);
    let mixed = "Grüße, 世界! Ωμέγα 🦀 ".repeat(64);
    let mut broken = mixed.clone().into_bytes();
    for byte in broken.iter_mut().step_by(7) {
        *byte ^= 0x40;
    }

    let inputs: [(&str, &[u8]); 3] = [
        ("ascii", ascii.as_bytes()),
        ("mixed", mixed.as_bytes()),
        ("broken", &broken),
    ];
    for (name, data) in inputs {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("decode_lossy", name), data, |b, data| {
            b.iter(|| decode_lossy(black_box(data)))
        });
    }

    group.finish();
}

fn bench_parameters(c: &mut Criterion) {
    let input = b"38;2;255;128;0;;1;65536;7m";
    c.bench_function("parameter_list", |b| {
        let mut decoder = ParameterDecoder::new();
        b.iter(|| {
            decoder.reset();
            for &byte in black_box(input) {
                if !decoder.feed_byte(byte).consumed {
                    break;
                }
            }
            decoder.len()
        })
    });
}

criterion_group!(
    benches,
    bench_simple_decode,
    bench_complex_decode,
    bench_repeated_decode,
    bench_state_machine,
    bench_varying_sizes,
    bench_color_changes,
    bench_utf8,
    bench_parameters
);

criterion_main!(benches);
