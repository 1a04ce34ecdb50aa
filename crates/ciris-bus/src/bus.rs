// ciris-bus/src/bus.rs
// ============================================================================
// Module: Bus Core
// Description: Shared select-retry-record machinery behind every typed bus.
// Purpose: Compose the retry and recording interceptors around provider calls.
// Dependencies: ciris-core, ciris-registry, tokio
// ============================================================================

//! ## Overview
//! The bus core performs the provider dance every typed bus repeats: select
//! from the registry, invoke, report the outcome, retry transients with
//! jittered backoff, exclude caller-fault providers for the remainder of the
//! call, and record a correlation row for the interaction. The typed buses
//! add nothing but their request and response shapes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use ciris_core::Clock;
use ciris_core::Correlation;
use ciris_core::CorrelationId;
use ciris_core::CorrelationStore;
use ciris_core::CorrelationType;
use ciris_core::ErrorClass;
use ciris_core::ProviderHandle;
use ciris_core::RetentionPolicy;
use ciris_core::ServiceError;
use ciris_core::ServiceType;
use ciris_registry::RegistryError;
use ciris_registry::ServiceProvider;
use ciris_registry::ServiceRegistry;
use thiserror::Error;
use uuid::Uuid;

use crate::retry::RetryPolicy;

// ============================================================================
// SECTION: Bus Errors
// ============================================================================

/// Errors surfaced by typed buses.
#[derive(Debug, Error)]
pub enum BusError {
    /// The registry cannot satisfy the capability request.
    #[error("no provider for {service_type} capability {capability}")]
    NoProvider {
        /// Requested service category.
        service_type: ServiceType,
        /// Capability that could not be satisfied.
        capability: String,
    },
    /// The selected provider failed after policy-driven retries.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// The registry itself failed.
    #[error("registry failure: {0}")]
    Registry(String),
}

impl BusError {
    /// Maps the bus failure onto the shared error taxonomy.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NoProvider { .. } => ErrorClass::NoProvider,
            Self::Service(error) => error.class,
            Self::Registry(_) => ErrorClass::Transient,
        }
    }
}

// ============================================================================
// SECTION: Bus Core
// ============================================================================

/// Shared machinery behind every typed bus.
pub struct BusCore {
    /// Provider directory.
    registry: Arc<ServiceRegistry>,
    /// Correlation recording sink, when configured.
    correlations: Option<Arc<dyn CorrelationStore>>,
    /// Clock stamping correlation rows.
    clock: Arc<dyn Clock>,
}

impl BusCore {
    /// Creates the bus core.
    #[must_use]
    pub fn new(
        registry: Arc<ServiceRegistry>,
        correlations: Option<Arc<dyn CorrelationStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            correlations,
            clock,
        }
    }

    /// Returns the provider directory.
    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Performs one capability call with selection, retries, and recording.
    ///
    /// `operation` names the capability for selection and correlation rows.
    /// The closure is invoked once per attempt with the selected provider.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoProvider`] when selection fails and
    /// [`BusError::Service`] when every permitted attempt failed.
    pub async fn call<T, F, Fut>(
        &self,
        service_type: ServiceType,
        operation: &str,
        policy: &RetryPolicy,
        op: F,
    ) -> Result<T, BusError>
    where
        F: Fn(ServiceProvider) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut excluded: Vec<ProviderHandle> = Vec::new();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let selection = match self.registry.select_excluding(
                service_type,
                &[operation],
                &excluded,
            ) {
                Ok(selection) => selection,
                Err(RegistryError::NoProvider { .. }) => {
                    self.record_outcome(service_type, operation, false);
                    return Err(BusError::NoProvider {
                        service_type,
                        capability: operation.to_string(),
                    });
                }
                Err(err) => return Err(BusError::Registry(err.to_string())),
            };

            match op(selection.provider).await {
                Ok(value) => {
                    self.registry.report_success(&selection.handle);
                    self.record_outcome(service_type, operation, true);
                    return Ok(value);
                }
                Err(error) => {
                    self.registry.report_failure(&selection.handle, error.class);
                    tracing::debug!(
                        %service_type,
                        operation,
                        attempt,
                        class = %error.class,
                        "bus call failed"
                    );
                    if error.class == ErrorClass::PermissionDenied {
                        // Caller-fault: drop this provider for the call and
                        // move straight to the next candidate.
                        excluded.push(selection.handle);
                        continue;
                    }
                    if !policy.retries(error.class) || attempt >= policy.max_attempts {
                        self.record_outcome(service_type, operation, false);
                        return Err(BusError::Service(error));
                    }
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }

    /// Records a correlation row for one bus interaction.
    fn record_outcome(&self, service_type: ServiceType, operation: &str, success: bool) {
        let Some(store) = &self.correlations else {
            return;
        };
        let mut tags = BTreeMap::new();
        tags.insert("operation".to_string(), operation.to_string());
        tags.insert("outcome".to_string(), if success { "ok" } else { "error" }.to_string());
        let row = Correlation {
            correlation_id: CorrelationId::new(Uuid::new_v4().to_string()),
            service_type,
            correlation_type: CorrelationType::ServiceCorrelation,
            timestamp: self.clock.now(),
            metric: None,
            log: None,
            tags,
            retention_policy: RetentionPolicy::Ephemeral,
        };
        if let Err(err) = store.add_correlation(&row) {
            tracing::warn!(error = %err, "failed to record bus correlation");
        }
    }
}
