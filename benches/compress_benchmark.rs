use criterion::{criterion_group, criterion_main, Criterion};
use edit_aja::services::{compress_image, CompressOptions};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::hint::black_box;
use std::io::Cursor;

/// Phone-camera sized PNG with enough noise that JPEG can't shrink it trivially.
fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let v = (x.wrapping_mul(31) ^ y.wrapping_mul(17)).wrapping_mul(2654435761);
        Rgb([(v >> 8) as u8, (v >> 16) as u8, (v >> 24) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("Failed to encode fixture");
    out.into_inner()
}

fn benchmark_compress(c: &mut Criterion) {
    let large = noisy_png(3000, 2000);
    let small = noisy_png(640, 480);
    let opts = CompressOptions::default();

    let mut group = c.benchmark_group("upload_compression");
    group.sample_size(10);

    group.bench_function("camera_photo_downscale", |b| {
        b.iter(|| compress_image(black_box(&large), &opts))
    });

    group.bench_function("small_photo", |b| {
        b.iter(|| compress_image(black_box(&small), &opts))
    });

    group.finish();
}

criterion_group!(benches, benchmark_compress);
criterion_main!(benches);
