//! Tests for utility functions

use prometheus_thread_queue::util::init_tracing;

#[test]
fn test_init_tracing_installs_once() {
    init_tracing();
    assert!(!init_tracing());
}
