// ciris-registry/tests/registry.rs
// ============================================================================
// Module: Registry Tests
// Description: Tests for selection, priorities, and circuit breakers.
// ============================================================================
//! ## Overview
//! Validates capability-superset selection, priority ordering with
//! registration-order tie-breaks, breaker transitions under a manual clock,
//! and the health roll-up.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use ciris_core::ChannelId;
use ciris_core::ChatMessage;
use ciris_core::CircuitState;
use ciris_core::Clock;
use ciris_core::CommunicationCapability;
use ciris_core::ErrorClass;
use ciris_core::Health;
use ciris_core::ManualClock;
use ciris_core::Priority;
use ciris_core::ServiceError;
use ciris_core::ServiceType;
use ciris_core::Timestamp;
use ciris_registry::BreakerConfig;
use ciris_registry::RegistryError;
use ciris_registry::ServiceProvider;
use ciris_registry::ServiceRegistry;

// ============================================================================
// SECTION: Stub Provider
// ============================================================================

/// Communication stub; registry tests never invoke it.
struct StubComm;

#[async_trait]
impl CommunicationCapability for StubComm {
    async fn send_message(
        &self,
        _channel_id: &ChannelId,
        _content: &str,
    ) -> Result<bool, ServiceError> {
        Ok(true)
    }

    async fn fetch_messages(
        &self,
        _channel_id: &ChannelId,
        _limit: usize,
    ) -> Result<Vec<ChatMessage>, ServiceError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a registry over a manual clock.
fn registry() -> (Arc<ManualClock>, ServiceRegistry) {
    let clock = Arc::new(ManualClock::starting_at(Timestamp::from_unix_millis(0)));
    let registry = ServiceRegistry::new(Arc::clone(&clock) as Arc<dyn Clock>, BreakerConfig {
        failure_threshold: 3,
        reset_timeout_millis: 300_000,
    });
    (clock, registry)
}

/// Capability set for a communication provider.
fn comm_caps() -> BTreeSet<String> {
    ["send_message", "fetch_messages"].into_iter().map(str::to_string).collect()
}

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Tests that selection requires a capability superset.
#[test]
fn test_selection_requires_capabilities() {
    let (_clock, registry) = registry();
    let narrow: BTreeSet<String> = ["send_message".to_string()].into_iter().collect();
    registry
        .register(narrow, Priority::High, ServiceProvider::Communication(Arc::new(StubComm)))
        .unwrap();

    assert!(registry.select(ServiceType::Communication, &["send_message"]).is_ok());
    let missing = registry.select(ServiceType::Communication, &["fetch_messages"]);
    assert!(matches!(missing, Err(RegistryError::NoProvider { .. })));
}

/// Tests priority ordering with registration-order tie-breaks.
#[test]
fn test_priority_then_registration_order() {
    let (_clock, registry) = registry();
    let first = registry
        .register(comm_caps(), Priority::Normal, ServiceProvider::Communication(Arc::new(StubComm)))
        .unwrap();
    let second = registry
        .register(comm_caps(), Priority::High, ServiceProvider::Communication(Arc::new(StubComm)))
        .unwrap();
    let third = registry
        .register(comm_caps(), Priority::High, ServiceProvider::Communication(Arc::new(StubComm)))
        .unwrap();

    let selected = registry.select(ServiceType::Communication, &["send_message"]).unwrap();
    assert_eq!(selected.handle, second, "higher priority wins; earlier registration breaks ties");
    assert_ne!(selected.handle, first);
    assert_ne!(selected.handle, third);
}

/// Tests selection against an empty registry.
#[test]
fn test_empty_registry_has_no_provider() {
    let (_clock, registry) = registry();
    let result = registry.select(ServiceType::Llm, &["generate_structured"]);
    assert!(matches!(result, Err(RegistryError::NoProvider { .. })));
}

/// Tests that unregistering removes the provider.
#[test]
fn test_unregister() {
    let (_clock, registry) = registry();
    let handle = registry
        .register(comm_caps(), Priority::Normal, ServiceProvider::Communication(Arc::new(StubComm)))
        .unwrap();
    registry.unregister(&handle).unwrap();
    assert!(registry.select(ServiceType::Communication, &["send_message"]).is_err());
    assert!(matches!(registry.unregister(&handle), Err(RegistryError::UnknownHandle(_))));
}

// ============================================================================
// SECTION: Circuit Breakers
// ============================================================================

/// Tests the full breaker cycle: open, fail over, recover, prefer again.
#[test]
fn test_breaker_opens_fails_over_and_recovers() {
    let (clock, registry) = registry();
    let primary = registry
        .register(comm_caps(), Priority::High, ServiceProvider::Communication(Arc::new(StubComm)))
        .unwrap();
    let fallback = registry
        .register(comm_caps(), Priority::Normal, ServiceProvider::Communication(Arc::new(StubComm)))
        .unwrap();

    // Three consecutive failures open the primary's circuit.
    for _ in 0..3 {
        registry.report_failure(&primary, ErrorClass::Transient);
    }
    let selected = registry.select(ServiceType::Communication, &["send_message"]).unwrap();
    assert_eq!(selected.handle, fallback, "open circuit is skipped");

    // After the reset timeout the primary half-opens and one success closes it.
    clock.advance_millis(300_000);
    let selected = registry.select(ServiceType::Communication, &["send_message"]).unwrap();
    assert_eq!(selected.handle, primary, "half-open provider is selectable again");
    registry.report_success(&primary);

    let selected = registry.select(ServiceType::Communication, &["send_message"]).unwrap();
    assert_eq!(selected.handle, primary, "recovered provider is preferred again");
    let registrations = registry.list().unwrap();
    let primary_state = registrations
        .iter()
        .find(|registration| registration.handle == primary)
        .unwrap()
        .circuit_state;
    assert_eq!(primary_state, CircuitState::Closed);
}

/// Tests that a half-open failure re-opens the circuit.
#[test]
fn test_half_open_failure_reopens() {
    let (clock, registry) = registry();
    let handle = registry
        .register(comm_caps(), Priority::High, ServiceProvider::Communication(Arc::new(StubComm)))
        .unwrap();
    for _ in 0..3 {
        registry.report_failure(&handle, ErrorClass::Transient);
    }
    clock.advance_millis(300_000);
    registry.report_failure(&handle, ErrorClass::Transient);
    assert!(registry.select(ServiceType::Communication, &["send_message"]).is_err());
}

/// Tests that caller-fault classes never trip the breaker.
#[test]
fn test_caller_fault_classes_do_not_trip() {
    let (_clock, registry) = registry();
    let handle = registry
        .register(comm_caps(), Priority::High, ServiceProvider::Communication(Arc::new(StubComm)))
        .unwrap();
    for _ in 0..10 {
        registry.report_failure(&handle, ErrorClass::PermissionDenied);
        registry.report_failure(&handle, ErrorClass::NotFound);
        registry.report_failure(&handle, ErrorClass::Validation);
    }
    let selected = registry.select(ServiceType::Communication, &["send_message"]).unwrap();
    assert_eq!(selected.handle, handle);
}

// ============================================================================
// SECTION: Health Roll-Up
// ============================================================================

/// Tests the per-type health roll-up.
#[test]
fn test_health_rollup() {
    let (_clock, registry) = registry();
    let healthy = registry
        .register(comm_caps(), Priority::High, ServiceProvider::Communication(Arc::new(StubComm)))
        .unwrap();
    let failing = registry
        .register(comm_caps(), Priority::Normal, ServiceProvider::Communication(Arc::new(StubComm)))
        .unwrap();

    let health = registry.health().unwrap();
    assert_eq!(health.get(&ServiceType::Communication), Some(&Health::Up));

    for _ in 0..3 {
        registry.report_failure(&failing, ErrorClass::Transient);
    }
    let health = registry.health().unwrap();
    assert_eq!(health.get(&ServiceType::Communication), Some(&Health::Degraded));

    for _ in 0..3 {
        registry.report_failure(&healthy, ErrorClass::Transient);
    }
    let health = registry.health().unwrap();
    assert_eq!(health.get(&ServiceType::Communication), Some(&Health::Down));
}
