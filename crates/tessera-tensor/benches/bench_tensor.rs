use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use tessera_tensor::{ops, DType, Device, Tensor};

fn bench_affine(c: &mut Criterion) {
    let mut group = c.benchmark_group("affine");

    for (width, height) in [(256, 224), (512, 448), (1024, 896)].iter() {
        let id = format!("{width}x{height}");
        let src = Tensor::full(&[*height, *width, 3], 128.0, DType::U8, Device::Cpu).unwrap();
        let permuted = src.permute_axes(&[1, 0, 2]).unwrap();

        group.bench_with_input(BenchmarkId::new("u8_to_f32", &id), &src, |b, t| {
            b.iter(|| black_box(t.affine(1.0 / 255.0, 0.0, DType::F32).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("strided_u8_to_f32", &id), &permuted, |b, t| {
            b.iter(|| black_box(t.affine(1.0 / 255.0, 0.0, DType::F32).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("inplace_u8", &id), &src, |b, t| {
            b.iter(|| t.affine_(black_box(1.0), black_box(0.0)).unwrap())
        });
    }
    group.finish();
}

fn bench_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("ops");

    let lhs = Tensor::full(&[448, 512, 3], 1.0, DType::F32, Device::Cpu).unwrap();
    let rhs = Tensor::full(&[448, 512, 3], 2.0, DType::F32, Device::Cpu).unwrap();
    group.bench_function("add_f32", |b| {
        b.iter(|| black_box(ops::add(&lhs, &rhs).unwrap()))
    });

    let rgb = Tensor::full(&[448, 512, 3], 100.0, DType::U8, Device::Cpu).unwrap();
    group.bench_function("weighted_channel_sum_u8", |b| {
        b.iter(|| black_box(rgb.weighted_channel_sum(&[0.299, 0.587, 0.114]).unwrap()))
    });

    for half in [1, 3, 7] {
        group.bench_with_input(BenchmarkId::new("max_pool2d_u8", half), &half, |b, &h| {
            b.iter(|| black_box(rgb.max_pool2d(h).unwrap()))
        });
    }
    group.finish();
}

fn bench_views(c: &mut Criterion) {
    let t = Tensor::zeros(&[1024, 1024, 3], DType::U8, Device::Cpu).unwrap();
    c.bench_function("index_narrow", |b| {
        b.iter(|| black_box(t.index(black_box(512)).unwrap().narrow(0, 10, 100).unwrap()))
    });
    c.bench_function("clone", |b| b.iter(|| black_box(t.clone())));
}

criterion_group!(benches, bench_affine, bench_ops, bench_views);
criterion_main!(benches);
