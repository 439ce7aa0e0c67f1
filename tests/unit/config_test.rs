//! Tests for configuration validation

use prometheus_thread_queue::config::{QueueConfig, QueueOptions, ThreadQueueMode, MAX_THREADS};
use prometheus_thread_queue::core::{AppResult, CallbackSet, CancellationContext, ExecutionResult, QueueError};
use prometheus_thread_queue::queues::queue_from_config;
use std::collections::HashMap;
use std::time::Duration;

fn noop() -> CallbackSet<u32> {
    CallbackSet::new(|_: &u32, _: &CancellationContext| Ok(ExecutionResult::Success))
}

#[test]
fn test_queue_config_validation() {
    let valid = QueueConfig {
        mode: ThreadQueueMode::Semaphore,
        threads: 4,
        wait_on_dispose: true,
        sleep_after_enqueue_ms: None,
        threshold_ms: None,
        name: Some("jobs".to_string()),
        access_mode: Some(0o660),
    };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_queue_config_invalid_threads() {
    let invalid = QueueConfig {
        threads: MAX_THREADS + 1,
        ..QueueConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_queue_config_name_requires_named_mode() {
    let invalid = QueueConfig {
        mode: ThreadQueueMode::Dedicated,
        name: Some("jobs".to_string()),
        ..QueueConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_queue_config_from_json() {
    let cfg = QueueConfig::from_json_str(r#"{"mode": "task_group", "threads": 3, "threshold_ms": 250}"#).unwrap();
    assert_eq!(cfg.mode, ThreadQueueMode::TaskGroup);
    assert_eq!(cfg.threads, 3);
    assert_eq!(cfg.threshold_ms, Some(250));
    assert!(!cfg.wait_on_dispose);

    assert!(QueueConfig::from_json_str(r#"{"mode": "fifo"}"#).is_err());
    assert!(QueueConfig::from_json_str(r#"{"threshold_ms": 0}"#).is_err());
}

#[test]
fn test_queue_config_from_lookup() {
    let vars: HashMap<&str, &str> = [
        ("THREAD_QUEUE_MODE", "mutex"),
        ("THREAD_QUEUE_THREADS", "1"),
        ("THREAD_QUEUE_WAIT_ON_DISPOSE", "yes"),
        ("THREAD_QUEUE_NAME", "nightly-import"),
        ("THREAD_QUEUE_ACCESS_MODE", "0o600"),
    ]
    .into_iter()
    .collect();
    let cfg = QueueConfig::from_lookup(|key| vars.get(key).map(ToString::to_string)).unwrap();
    assert_eq!(cfg.mode, ThreadQueueMode::Mutex);
    assert!(cfg.wait_on_dispose);
    assert_eq!(cfg.name.as_deref(), Some("nightly-import"));
    assert_eq!(cfg.access_mode, Some(0o600));

    let bad = QueueConfig::from_lookup(|key| (key == "THREAD_QUEUE_THREADS").then(|| "many".to_string()));
    assert!(bad.is_err());
}

#[test]
fn test_options_from_config() {
    let cfg = QueueConfig {
        mode: ThreadQueueMode::Event,
        threads: 2,
        sleep_after_enqueue_ms: Some(5),
        ..QueueConfig::default()
    };
    let options = QueueOptions::from_config(&cfg, noop()).unwrap();
    assert_eq!(options.threads, 2);
    assert_eq!(options.sleep_after_enqueue, Some(Duration::from_millis(5)));
    assert_eq!(options.effective_threads(), 2);
}

#[test]
fn test_options_zero_threads_uses_processor_count() {
    let options = QueueOptions::with_callbacks(noop());
    assert_eq!(options.effective_threads(), num_cpus::get().clamp(1, MAX_THREADS));
}

#[test]
fn test_options_validation() {
    assert!(QueueOptions::with_callbacks(noop()).with_threads(MAX_THREADS + 1).validate().is_err());
    assert!(QueueOptions::with_callbacks(noop()).with_threshold(Duration::ZERO).validate().is_err());
    assert!(QueueOptions::with_callbacks(noop()).with_name("").validate().is_err());
}

#[test]
fn test_queue_from_config_builds_requested_mode() {
    let cfg = QueueConfig {
        mode: ThreadQueueMode::LocalSemaphore,
        threads: 2,
        ..QueueConfig::default()
    };
    let q = queue_from_config(&cfg, noop(), CancellationContext::new()).unwrap();
    assert_eq!(q.mode(), ThreadQueueMode::LocalSemaphore);
    assert_eq!(q.threads(), 2);
    assert!(q.can_pause());
}

#[test]
fn test_config_from_json_file() -> AppResult<()> {
    let path = std::env::temp_dir().join(format!("ptq-config-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, r#"{"mode": "semaphore", "threads": 3, "name": "file-jobs"}"#)?;
    let cfg = QueueConfig::from_json_file(&path);
    std::fs::remove_file(&path)?;

    let cfg = cfg?;
    assert_eq!(cfg.mode, ThreadQueueMode::Semaphore);
    assert_eq!(cfg.threads, 3);
    assert_eq!(cfg.name.as_deref(), Some("file-jobs"));
    Ok(())
}

#[test]
fn test_config_file_errors_name_the_file() {
    let path = std::env::temp_dir().join(format!("ptq-missing-{}.json", uuid::Uuid::new_v4()));
    let err = QueueConfig::from_json_file(&path).unwrap_err();
    assert!(err.to_string().contains("ptq-missing-"));

    std::fs::write(&path, r#"{"mode": "event", "name": "not-allowed"}"#).unwrap();
    let err = QueueConfig::from_json_file(&path).unwrap_err();
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(err.downcast_ref::<QueueError>(), Some(QueueError::Configuration(_))));
}
