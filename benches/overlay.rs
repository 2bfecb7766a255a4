//! Criterion benchmarks for frame encoding and overlay rendering.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};

use beltwatch::overlay::{self, OverlayStyle};
use beltwatch::{FrameEncoding, FrameSample, MeasurementRecord, Severity};

fn frame(w: u32, h: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 96])
    }))
}

const SIZES: [(u32, u32); 3] = [(320, 240), (640, 480), (1280, 720)];

/// JPEG encode of one captured frame, as done on every tick.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_jpeg");
    for (w, h) in SIZES {
        let img = frame(w, h);
        group.throughput(Throughput::Elements((w * h) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(format!("{w}x{h}")), &img, |b, img| {
            b.iter(|| {
                let s = FrameSample::encode(img, 0.0, FrameEncoding::default()).unwrap();
                black_box(s.bytes().len())
            });
        });
    }
    group.finish();
}

fn bench_decode_and_paint(c: &mut Criterion) {
    let record = MeasurementRecord::new(-35.0, -8.75, Severity::Warning, 2.0);
    let style = OverlayStyle::default();

    let mut group = c.benchmark_group("overlay");
    for (w, h) in SIZES {
        let sample = FrameSample::encode(&frame(w, h), 0.0, FrameEncoding::default()).unwrap();
        let decoded = overlay::decode(&sample).unwrap();
        let label = format!("{w}x{h}");
        group.throughput(Throughput::Elements((w * h) as u64));

        group.bench_with_input(BenchmarkId::new("decode", &label), &sample, |b, s| {
            b.iter(|| black_box(overlay::decode(s).unwrap().width()));
        });

        group.bench_with_input(BenchmarkId::new("paint", &label), &decoded, |b, d| {
            let mut surface = RgbaImage::new(1, 1);
            b.iter(|| black_box(overlay::paint(&mut surface, d, &record, &style, None).drawn_x));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode_and_paint);
criterion_main!(benches);
