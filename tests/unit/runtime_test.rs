//! Tests for worker pools, spawners and thread bookkeeping

use prometheus_thread_queue::runtime::{join_within, spawn_named, Spawn, WorkerHandles, WorkerThreadPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_worker_pool_runs_jobs() {
    let pool = WorkerThreadPool::new("unit-pool", 2).unwrap();
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let done = Arc::clone(&done);
        assert!(pool
            .spawn(Box::new(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }))
            .is_ok());
    }
    pool.shutdown();
    assert_eq!(done.load(Ordering::SeqCst), 10);
}

#[test]
fn test_worker_pool_rejects_after_shutdown() {
    let pool = WorkerThreadPool::new("unit-closed", 1).unwrap();
    pool.shutdown();
    assert!(pool.spawn(Box::new(|| {})).is_err());
}

#[test]
fn test_spawn_named_sets_thread_name() {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let handle = spawn_named("unit-named-0".to_string(), move || {
        let _ = tx.send(std::thread::current().name().map(ToString::to_string));
    })
    .unwrap();
    assert!(join_within("unit", handle, None));
    assert_eq!(rx.recv().unwrap().as_deref(), Some("unit-named-0"));
}

#[test]
fn test_join_within_detaches_stuck_thread() {
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
    let handle = spawn_named("unit-stuck".to_string(), move || {
        let _ = release_rx.recv();
    })
    .unwrap();
    assert!(!join_within("unit", handle, Some(Duration::from_millis(20))));
    drop(release_tx);
}

#[test]
fn test_worker_handles_join_all() {
    let handles = WorkerHandles::new();
    for i in 0..3 {
        handles.push(spawn_named(format!("unit-handle-{i}"), || {}).unwrap());
    }
    assert_eq!(handles.len(), 3);
    assert_eq!(handles.join_all("unit", Some(Instant::now() + Duration::from_secs(5))), 3);
    assert!(handles.is_empty());
}

#[cfg(feature = "tokio-runtime")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    use prometheus_thread_queue::runtime::TokioSpawner;

    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());
    let (tx, rx) = tokio::sync::oneshot::channel();
    assert!(spawner
        .spawn(Box::new(move || {
            tx.send(123).unwrap();
        }))
        .is_ok());

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}
