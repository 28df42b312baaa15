// Benchmarks for the in-memory lock store
// Measures acquire/release throughput for single and multi-key requests

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use keyward_core::{LockCoordinator, MemoryStateStore};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn coordinator() -> LockCoordinator {
    LockCoordinator::new(Arc::new(MemoryStateStore::new(Duration::from_secs(60))))
}

fn bench_lock_unlock_single(c: &mut Criterion) {
    let rt = runtime();
    let coordinator = coordinator();
    let keys = vec!["bench-key".to_string()];

    c.bench_function("lock_unlock_single", |b| {
        b.to_async(&rt).iter(|| async {
            let tokens = coordinator.lock("bench", &keys, None).await.unwrap();
            black_box(coordinator.unlock("bench", &tokens).await.unwrap())
        })
    });
}

fn bench_lock_unlock_multi(c: &mut Criterion) {
    let rt = runtime();
    let coordinator = coordinator();

    let mut group = c.benchmark_group("lock_unlock_multi");
    for size in [2usize, 8, 32] {
        let keys: Vec<String> = (0..size).map(|i| format!("bench-key-{}", i)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &keys, |b, keys| {
            b.to_async(&rt).iter(|| async {
                let tokens = coordinator.lock("bench", keys, None).await.unwrap();
                black_box(coordinator.unlock("bench", &tokens).await.unwrap())
            })
        });
    }
    group.finish();
}

fn bench_check(c: &mut Criterion) {
    let rt = runtime();
    let coordinator = coordinator();
    let held = vec!["held".to_string()];
    rt.block_on(coordinator.lock("bench", &held, None)).unwrap();
    let mixed = vec!["free".to_string(), "held".to_string()];

    c.bench_function("check_mixed", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(coordinator.check(&mixed).await.unwrap()) })
    });
}

criterion_group!(
    benches,
    bench_lock_unlock_single,
    bench_lock_unlock_multi,
    bench_check,
);
criterion_main!(benches);
