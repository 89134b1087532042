//! Throughput of the storage engines' hot `alloc`/`free` path (spec
//! §4.2), across the malloc-backed and file-backed variants.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use objcache_backend::Stevedore;
use objcache_storage_file::FileEngine;
use objcache_storage_malloc::MallocEngine;

fn alloc_free(engine: &dyn Stevedore, size: usize) {
    let segment = engine.alloc(size).expect("engine has room");
    drop(segment);
}

fn bench_malloc(c: &mut Criterion) {
    let mut group = c.benchmark_group("malloc_alloc_free");
    for size in [64usize, 4096, 64 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let engine = MallocEngine::new("bench-malloc", None);
            b.iter(|| alloc_free(engine.as_ref(), size));
        });
    }
    group.finish();
}

fn bench_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_alloc_free");
    for size in [4096usize, 64 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let dir = tempfile::tempdir().expect("tempdir");
            let engine = FileEngine::open(dir.path().join("bench.store"), 16 * 1024 * 1024, 4096)
                .expect("file engine opens");
            b.iter(|| alloc_free(engine.as_ref(), size));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_malloc, bench_file);
criterion_main!(benches);
