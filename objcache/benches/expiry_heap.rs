//! Throughput of the 4-ary expiry min-heap (spec §4.4) under the
//! operation mix a live proxy drives it with: bulk `insert`, `reorder`
//! (rearm) of a random existing entry, and `pop_root` (tick drain).

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use objcache_backend::Store;
use objcache_core::ObjCore;
use objcache_expiry::ExpiryHeap;
use std::sync::Arc;

fn filled_heap(n: u64) -> (ExpiryHeap, Vec<Arc<ObjCore>>, Arc<Store>) {
    let mut heap = ExpiryHeap::new();
    let store = Arc::new(Store::default());
    let mut cores = Vec::with_capacity(n as usize);
    for i in 0..n {
        let core = ObjCore::new_busy(i);
        heap.insert(Arc::clone(&core), Arc::clone(&store), i as u32);
        cores.push(core);
    }
    (heap, cores, store)
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("expiry_heap_insert");
    for size in [1_000u64, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let store = Arc::new(Store::default());
            b.iter_batched(
                || {
                    let cores: Vec<_> = (0..size).map(ObjCore::new_busy).collect();
                    (ExpiryHeap::new(), cores)
                },
                |(mut heap, cores)| {
                    for (i, core) in cores.into_iter().enumerate() {
                        heap.insert(core, Arc::clone(&store), i as u32);
                    }
                    heap
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_reorder(c: &mut Criterion) {
    let mut group = c.benchmark_group("expiry_heap_reorder");
    for size in [1_000u64, 100_000] {
        let (mut heap, cores, store) = filled_heap(size);
        let mut i = 0u32;
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let core = &cores[(i as u64 % size) as usize];
                i = i.wrapping_add(7919);
                heap.reorder(core, i % size as u32);
            });
        });
        drop(store);
    }
    group.finish();
}

fn bench_pop_root(c: &mut Criterion) {
    let mut group = c.benchmark_group("expiry_heap_pop_root");
    for size in [1_000u64, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || filled_heap(size),
                |(mut heap, _cores, _store)| {
                    while heap.pop_root().is_some() {}
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_reorder, bench_pop_root);
criterion_main!(benches);
