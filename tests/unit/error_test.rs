//! Tests for error types

use prometheus_thread_queue::core::{QueueError, TaskError};

#[test]
fn test_configuration_error() {
    let err = QueueError::Configuration("threads must be at most 1024, got 2000".to_string());
    assert_eq!(format!("{}", err), "configuration error: threads must be at most 1024, got 2000");
}

#[test]
fn test_canceled_error() {
    let err = QueueError::Canceled;
    assert_eq!(format!("{}", err), "operation canceled");
}

#[test]
fn test_timeout_error() {
    let err = QueueError::Timeout;
    assert_eq!(format!("{}", err), "operation timed out");
}

#[test]
fn test_task_error_from_anyhow() {
    let err: TaskError = anyhow::anyhow!("disk full").into();
    assert_eq!(format!("{}", err), "task failed: disk full");
}

#[test]
fn test_task_error_wrapped_in_queue_error() {
    let err: QueueError = TaskError::Timeout.into();
    assert_eq!(format!("{}", err), "execution error: task timed out");
}

#[test]
fn test_named_object_error_keeps_source() {
    let err = QueueError::NamedObject {
        name: "jobs".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
    };
    assert_eq!(format!("{}", err), "named object `jobs` unavailable: denied");
    assert!(std::error::Error::source(&err).is_some());
}
