//! Benchmarks for the thread queue variants.
//!
//! Benchmarks cover:
//! - Enqueue-to-completion throughput for every variant
//! - Raw storage push/pop
//! - Posting jobs to the shared worker pool

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use prometheus_thread_queue::config::{QueueOptions, ThreadQueueMode};
use prometheus_thread_queue::core::{CancellationContext, ExecutionResult};
use prometheus_thread_queue::infra::MonitorStorage;
use prometheus_thread_queue::queues::create_queue;
use prometheus_thread_queue::runtime::{Spawn, WorkerThreadPool};

// ============================================================================
// Helper Functions
// ============================================================================

fn summing_options(sum: &Arc<AtomicU64>, threads: usize) -> QueueOptions<u64> {
    let sum = Arc::clone(sum);
    QueueOptions::new(move |item: &u64, _: &CancellationContext| {
        sum.fetch_add(black_box(*item), Ordering::Relaxed);
        Ok(ExecutionResult::Success)
    })
    .with_threads(threads)
}

fn bench_modes() -> Vec<ThreadQueueMode> {
    ThreadQueueMode::ALL
        .into_iter()
        .filter(|mode| {
            cfg!(feature = "tokio-runtime") || !matches!(mode, ThreadQueueMode::Task | ThreadQueueMode::TaskGroup)
        })
        .collect()
}

// ============================================================================
// Queue Benchmarks
// ============================================================================

fn bench_drain_per_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_drain");
    group.sample_size(20);
    let items: u64 = 1_000;
    group.throughput(Throughput::Elements(items));

    for mode in bench_modes() {
        group.bench_with_input(BenchmarkId::from_parameter(mode), &mode, |b, &mode| {
            b.iter(|| {
                let sum = Arc::new(AtomicU64::new(0));
                let q = create_queue(mode, summing_options(&sum, 4), CancellationContext::new()).unwrap();
                for i in 0..items {
                    q.enqueue(i).unwrap();
                }
                q.complete().unwrap();
                assert!(q.wait());
                black_box(sum.load(Ordering::Relaxed));
            });
        });
    }
    group.finish();
}

fn bench_dedicated_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedicated_thread_scaling");
    group.sample_size(20);
    let items: u64 = 10_000;
    group.throughput(Throughput::Elements(items));

    for threads in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let sum = Arc::new(AtomicU64::new(0));
                let q = create_queue(ThreadQueueMode::Dedicated, summing_options(&sum, threads), CancellationContext::new())
                    .unwrap();
                for i in 0..items {
                    q.enqueue(i).unwrap();
                }
                q.complete().unwrap();
                assert!(q.wait());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Component Benchmarks
// ============================================================================

fn bench_monitor_storage(c: &mut Criterion) {
    let mut group = c.benchmark_group("monitor_storage_push_pop");

    for size in [100_u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let storage = MonitorStorage::new();
                for i in 0..size {
                    storage.push(i);
                }
                while let Some(item) = storage.try_pop() {
                    black_box(item);
                }
            });
        });
    }
    group.finish();
}

fn bench_worker_pool_post(c: &mut Criterion) {
    let pool = WorkerThreadPool::new("bench-pool", 4).unwrap();
    let mut group = c.benchmark_group("worker_pool_post");
    let jobs: u64 = 1_000;
    group.throughput(Throughput::Elements(jobs));

    group.bench_function("post_1000", |b| {
        b.iter(|| {
            let (tx, rx) = crossbeam_channel::bounded(jobs as usize);
            for i in 0..jobs {
                let tx = tx.clone();
                assert!(pool
                    .spawn(Box::new(move || {
                        let _ = tx.send(i);
                    }))
                    .is_ok());
            }
            drop(tx);
            black_box(rx.iter().count());
        });
    });
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(queue_benches, bench_drain_per_mode, bench_dedicated_thread_scaling);

criterion_group!(component_benches, bench_monitor_storage, bench_worker_pool_post);

criterion_main!(queue_benches, component_benches);
