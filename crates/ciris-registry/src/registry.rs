// ciris-registry/src/registry.rs
// ============================================================================
// Module: Service Registry
// Description: Capability-indexed directory of service providers.
// Purpose: Select healthy providers by priority and capability superset.
// Dependencies: ciris-core, tokio
// ============================================================================

//! ## Overview
//! The registry keeps, per service type, an ordered list of providers by
//! priority then registration order. Selection skips open circuits and
//! requires the provider's advertised capabilities to be a superset of the
//! request. Buses report call outcomes back here to drive the breakers.
//! The registry uses a single-writer-many-reader discipline; it holds no
//! business state beyond the directory itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use ciris_core::AuditSink;
use ciris_core::CircuitState;
use ciris_core::Clock;
use ciris_core::CommunicationCapability;
use ciris_core::ErrorClass;
use ciris_core::FilterCapability;
use ciris_core::Health;
use ciris_core::LlmCapability;
use ciris_core::MemoryCapability;
use ciris_core::Priority;
use ciris_core::ProviderHandle;
use ciris_core::RuntimeControlCapability;
use ciris_core::SecretsCapability;
use ciris_core::ServiceRegistration;
use ciris_core::ServiceType;
use ciris_core::TelemetryCapability;
use ciris_core::ToolCapability;
use ciris_core::WiseAuthorityCapability;
use thiserror::Error;

use crate::circuit::BreakerConfig;
use crate::circuit::CircuitBreaker;

// ============================================================================
// SECTION: Service Provider
// ============================================================================

/// Typed provider handle, one variant per service category.
#[derive(Clone)]
pub enum ServiceProvider {
    /// Message delivery and retrieval.
    Communication(Arc<dyn CommunicationCapability>),
    /// Graph memory storage.
    Memory(Arc<dyn MemoryCapability>),
    /// External tool execution.
    Tool(Arc<dyn ToolCapability>),
    /// Deferral approval and guidance.
    WiseAuthority(Arc<dyn WiseAuthorityCapability>),
    /// Structured language-model generation.
    Llm(Arc<dyn LlmCapability>),
    /// Content filtering.
    Filter(Arc<dyn FilterCapability>),
    /// Audit event logging.
    Audit(Arc<dyn AuditSink>),
    /// Metric recording.
    Telemetry(Arc<dyn TelemetryCapability>),
    /// Operator runtime control.
    RuntimeControl(Arc<dyn RuntimeControlCapability>),
    /// Secret encapsulation and decapsulation.
    Secrets(Arc<dyn SecretsCapability>),
}

impl ServiceProvider {
    /// Returns the service category this provider serves.
    #[must_use]
    pub const fn service_type(&self) -> ServiceType {
        match self {
            Self::Communication(_) => ServiceType::Communication,
            Self::Memory(_) => ServiceType::Memory,
            Self::Tool(_) => ServiceType::Tool,
            Self::WiseAuthority(_) => ServiceType::WiseAuthority,
            Self::Llm(_) => ServiceType::Llm,
            Self::Filter(_) => ServiceType::Filter,
            Self::Audit(_) => ServiceType::Audit,
            Self::Telemetry(_) => ServiceType::Telemetry,
            Self::RuntimeControl(_) => ServiceType::RuntimeControl,
            Self::Secrets(_) => ServiceType::Secrets,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No registered provider satisfies the capability request.
    #[error("no provider for {service_type} with capabilities {capabilities:?}")]
    NoProvider {
        /// Requested service category.
        service_type: ServiceType,
        /// Capabilities the caller required.
        capabilities: Vec<String>,
    },
    /// The provider handle is unknown.
    #[error("unknown provider handle: {0}")]
    UnknownHandle(String),
    /// The registry lock was poisoned by a panicking writer.
    #[error("registry lock poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Provider selected for one call.
#[derive(Clone)]
pub struct Selection {
    /// Handle used to report the call outcome.
    pub handle: ProviderHandle,
    /// Typed provider to invoke.
    pub provider: ServiceProvider,
}

// ============================================================================
// SECTION: Registry Internals
// ============================================================================

/// One registered provider with its breaker.
struct ProviderEntry {
    /// Handle issued at registration time.
    handle: ProviderHandle,
    /// Capabilities the provider advertises.
    capabilities: BTreeSet<String>,
    /// Selection priority.
    priority: Priority,
    /// Registration sequence for priority tie-breaks.
    seq: u64,
    /// Typed provider.
    provider: ServiceProvider,
    /// Circuit breaker for this provider.
    breaker: CircuitBreaker,
}

/// Mutable registry state behind the lock.
struct RegistryInner {
    /// Entries grouped by service type, unordered; selection sorts.
    entries: BTreeMap<ServiceType, Vec<ProviderEntry>>,
    /// Next registration sequence number.
    next_seq: u64,
}

// ============================================================================
// SECTION: Service Registry
// ============================================================================

/// Capability-indexed directory of service providers.
pub struct ServiceRegistry {
    /// Directory state (single writer, many readers).
    inner: RwLock<RegistryInner>,
    /// Clock driving breaker recovery.
    clock: Arc<dyn Clock>,
    /// Breaker configuration applied to new registrations.
    breaker_config: BreakerConfig,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, breaker_config: BreakerConfig) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                entries: BTreeMap::new(),
                next_seq: 0,
            }),
            clock,
            breaker_config,
        }
    }

    /// Registers a provider and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] when the directory lock is
    /// poisoned.
    pub fn register(
        &self,
        capabilities: BTreeSet<String>,
        priority: Priority,
        provider: ServiceProvider,
    ) -> Result<ProviderHandle, RegistryError> {
        let service_type = provider.service_type();
        let mut inner = self.inner.write().map_err(|_| RegistryError::Poisoned)?;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let handle = ProviderHandle::new(format!("{service_type}-{seq}"));
        tracing::info!(%handle, %service_type, ?priority, "provider registered");
        inner.entries.entry(service_type).or_default().push(ProviderEntry {
            handle: handle.clone(),
            capabilities,
            priority,
            seq,
            provider,
            breaker: CircuitBreaker::new(self.breaker_config),
        });
        Ok(handle)
    }

    /// Removes a provider from the directory.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownHandle`] when the handle is not
    /// registered.
    pub fn unregister(&self, handle: &ProviderHandle) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::Poisoned)?;
        for entries in inner.entries.values_mut() {
            if let Some(index) = entries.iter().position(|entry| &entry.handle == handle) {
                entries.remove(index);
                tracing::info!(%handle, "provider unregistered");
                return Ok(());
            }
        }
        Err(RegistryError::UnknownHandle(handle.to_string()))
    }

    /// Selects the best provider for a capability request.
    ///
    /// Returns the highest-priority provider whose circuit is not open and
    /// whose capabilities are a superset of the requirement; registration
    /// order breaks priority ties.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NoProvider`] when no registered provider
    /// satisfies the request.
    pub fn select(
        &self,
        service_type: ServiceType,
        required_capabilities: &[&str],
    ) -> Result<Selection, RegistryError> {
        self.select_excluding(service_type, required_capabilities, &[])
    }

    /// Selects the best provider while skipping excluded handles.
    ///
    /// Buses exclude providers that failed with caller-class errors for the
    /// remainder of the current call without tripping their breakers.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NoProvider`] when no registered provider
    /// satisfies the request.
    pub fn select_excluding(
        &self,
        service_type: ServiceType,
        required_capabilities: &[&str],
        excluded: &[ProviderHandle],
    ) -> Result<Selection, RegistryError> {
        let now = self.clock.now();
        let inner = self.inner.read().map_err(|_| RegistryError::Poisoned)?;
        let mut candidates: Vec<&ProviderEntry> = inner
            .entries
            .get(&service_type)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| {
                        entry.breaker.effective_state(now) != CircuitState::Open
                            && !excluded.contains(&entry.handle)
                            && required_capabilities
                                .iter()
                                .all(|capability| entry.capabilities.contains(*capability))
                    })
                    .collect()
            })
            .unwrap_or_default();

        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));

        candidates.first().map_or_else(
            || {
                Err(RegistryError::NoProvider {
                    service_type,
                    capabilities: required_capabilities
                        .iter()
                        .map(|capability| (*capability).to_string())
                        .collect(),
                })
            },
            |entry| {
                Ok(Selection {
                    handle: entry.handle.clone(),
                    provider: entry.provider.clone(),
                })
            },
        )
    }

    /// Records a successful call against a provider.
    pub fn report_success(&self, handle: &ProviderHandle) {
        let now = self.clock.now();
        if let Ok(mut inner) = self.inner.write() {
            if let Some(entry) = find_entry_mut(&mut inner, handle) {
                entry.breaker.record_success(now);
            }
        }
    }

    /// Records a failed call against a provider.
    ///
    /// Failures classified as caller problems (auth, validation, not-found)
    /// never trip the breaker; the bus has already removed the provider for
    /// the failing call.
    pub fn report_failure(&self, handle: &ProviderHandle, class: ErrorClass) {
        if !class.trips_breaker() {
            return;
        }
        let now = self.clock.now();
        if let Ok(mut inner) = self.inner.write() {
            if let Some(entry) = find_entry_mut(&mut inner, handle) {
                entry.breaker.record_failure(now);
                tracing::debug!(%handle, %class, "provider failure recorded");
            }
        }
    }

    /// Returns a per-type health roll-up.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] when the directory lock is
    /// poisoned.
    pub fn health(&self) -> Result<BTreeMap<ServiceType, Health>, RegistryError> {
        let now = self.clock.now();
        let inner = self.inner.read().map_err(|_| RegistryError::Poisoned)?;
        let mut rollup = BTreeMap::new();
        for (service_type, entries) in &inner.entries {
            let states: Vec<CircuitState> =
                entries.iter().map(|entry| entry.breaker.effective_state(now)).collect();
            let health = if states.is_empty()
                || states.iter().all(|state| *state == CircuitState::Open)
            {
                Health::Down
            } else if states.iter().any(|state| *state != CircuitState::Closed) {
                Health::Degraded
            } else {
                Health::Up
            };
            rollup.insert(*service_type, health);
        }
        Ok(rollup)
    }

    /// Lists every registration for the operator surface.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] when the directory lock is
    /// poisoned.
    pub fn list(&self) -> Result<Vec<ServiceRegistration>, RegistryError> {
        let now = self.clock.now();
        let inner = self.inner.read().map_err(|_| RegistryError::Poisoned)?;
        let mut registrations = Vec::new();
        for (service_type, entries) in &inner.entries {
            for entry in entries {
                let circuit_state = entry.breaker.effective_state(now);
                registrations.push(ServiceRegistration {
                    handle: entry.handle.clone(),
                    service_type: *service_type,
                    capabilities: entry.capabilities.clone(),
                    priority: entry.priority,
                    health: match circuit_state {
                        CircuitState::Closed => Health::Up,
                        CircuitState::HalfOpen => Health::Degraded,
                        CircuitState::Open => Health::Down,
                    },
                    circuit_state,
                });
            }
        }
        Ok(registrations)
    }

    /// Forces a provider's circuit closed (operator reset).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownHandle`] when the handle is not
    /// registered.
    pub fn reset_circuit(&self, handle: &ProviderHandle) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::Poisoned)?;
        let entry = find_entry_mut(&mut inner, handle)
            .ok_or_else(|| RegistryError::UnknownHandle(handle.to_string()))?;
        entry.breaker.reset();
        Ok(())
    }

    /// Changes a provider's selection priority (operator override).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownHandle`] when the handle is not
    /// registered.
    pub fn set_priority(
        &self,
        handle: &ProviderHandle,
        priority: Priority,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::Poisoned)?;
        let entry = find_entry_mut(&mut inner, handle)
            .ok_or_else(|| RegistryError::UnknownHandle(handle.to_string()))?;
        entry.priority = priority;
        Ok(())
    }

    /// Waits until at least one provider of each required type is registered.
    ///
    /// Polls the directory until the deadline, then proceeds with whatever is
    /// available; missing types are returned so the caller can log them.
    pub async fn wait_ready(
        &self,
        required: &[ServiceType],
        timeout: Duration,
    ) -> Vec<ServiceType> {
        let poll_interval = Duration::from_millis(100);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let missing: Vec<ServiceType> = {
                match self.inner.read() {
                    Ok(inner) => required
                        .iter()
                        .filter(|service_type| {
                            inner
                                .entries
                                .get(service_type)
                                .is_none_or(|entries| entries.is_empty())
                        })
                        .copied()
                        .collect(),
                    Err(_) => required.to_vec(),
                }
            };
            if missing.is_empty() || tokio::time::Instant::now() >= deadline {
                return missing;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Finds a mutable entry by handle across all service types.
fn find_entry_mut<'a>(
    inner: &'a mut RegistryInner,
    handle: &ProviderHandle,
) -> Option<&'a mut ProviderEntry> {
    inner
        .entries
        .values_mut()
        .flat_map(|entries| entries.iter_mut())
        .find(|entry| &entry.handle == handle)
}
