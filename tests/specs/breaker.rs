//! Circuit breaker: consecutive failures open the circuit, the cooldown
//! admits a half-open probe, successes close it again.

use crate::prelude::*;
use sw_core::TaskState;
use sw_registry::{BreakerState, SelectError};

const TWO_INSTANCES: &str = r#"
[pools.default.instances.i1]
url = "https://i1:8834"

[pools.default.instances.i2]
url = "https://i2:8834"
"#;

#[tokio::test]
async fn open_circuit_excludes_instance_until_cooldown_cycle() {
    let spec = Spec::start(TWO_INSTANCES);
    spec.stop(); // registry-level spec; the worker is not needed

    // Five consecutive failures on i1 (the default threshold) open it.
    for _ in 0..5 {
        spec.registry.record_failure("default", "i1");
    }
    assert_eq!(
        spec.registry.breaker_state("default", "i1"),
        BreakerState::Open
    );

    // Selection avoids i1 entirely while the circuit is open.
    for _ in 0..10 {
        assert_eq!(spec.registry.select("default").unwrap(), "i2");
    }

    // After the 300s default cooldown the next admission is a half-open probe.
    spec.clock.advance(300_000);
    assert!(spec.registry.breaker_allow("default", "i1"));
    assert_eq!(
        spec.registry.breaker_state("default", "i1"),
        BreakerState::HalfOpen
    );

    // Two successes (the default threshold) close the circuit.
    spec.registry.record_success("default", "i1");
    spec.registry.record_success("default", "i1");
    assert_eq!(
        spec.registry.breaker_state("default", "i1"),
        BreakerState::Closed
    );

    // A failure in half-open reopens with a refreshed cooldown.
    for _ in 0..5 {
        spec.registry.record_failure("default", "i1");
    }
    spec.clock.advance(300_000);
    assert!(spec.registry.breaker_allow("default", "i1"));
    spec.registry.record_failure("default", "i1");
    assert_eq!(
        spec.registry.breaker_state("default", "i1"),
        BreakerState::Open
    );
    spec.clock.advance(299_999);
    assert!(!spec.registry.breaker_allow("default", "i1"));
    spec.clock.advance(1);
    assert!(spec.registry.breaker_allow("default", "i1"));
}

const ONE_INSTANCE: &str = r#"
[pools.default.instances.i1]
url = "https://i1:8834"
"#;

#[tokio::test]
async fn repeated_launch_failures_open_the_breaker_through_the_worker() {
    let spec = Spec::start(ONE_INSTANCE);
    let backend = spec.backend("default", "i1");
    for _ in 0..5 {
        backend.fail_next_fatal("launch", "scanner refused launch");
    }

    // Five tasks, each failing at launch, trip the breaker.
    let mut receipts = Vec::new();
    for i in 0..5 {
        receipts.push(spec.submit(&format!("T{i}")));
    }
    for receipt in &receipts {
        spec.wait_state(&receipt.task_id, TaskState::Failed).await;
    }

    assert!(
        wait_until(|| spec.registry.breaker_state("default", "i1") == BreakerState::Open).await
    );
    assert_eq!(spec.queue.dlq_depth("default"), 5);

    // With the only instance circuit-broken, selection reports no capacity.
    assert_eq!(
        spec.registry.select("default"),
        Err(SelectError::NoCapacity("default".to_string()))
    );
    spec.stop();
}
