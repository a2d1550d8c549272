//! Benchmarks for batched evaluation on the host device.

use batchmv::{BatchEvaluator, HostBatch, reference_products};
use batchmv_device::HostDevice;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_host");
    let device = HostDevice::new();
    let evaluator = BatchEvaluator::new(&device);

    for (size, num) in [(4, 1024), (16, 256), (64, 64)] {
        let batch = HostBatch::uniform(size, num, 1.0f32, 2.0).unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", size, num)),
            &batch,
            |bencher, batch| bencher.iter(|| evaluator.evaluate(black_box(batch)).unwrap()),
        );
    }

    group.finish();
}

fn bench_reference(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_nalgebra");

    for (size, num) in [(4, 1024), (16, 256), (64, 64)] {
        let batch = HostBatch::uniform(size, num, 1.0f32, 2.0).unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", size, num)),
            &batch,
            |bencher, batch| bencher.iter(|| reference_products(black_box(batch))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_evaluate, bench_reference);
criterion_main!(benches);
