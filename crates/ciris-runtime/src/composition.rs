// ciris-runtime/src/composition.rs
// ============================================================================
// Module: Composition Root
// Description: Wires clock, stores, registry, buses, pipeline, and processor.
// Purpose: The single place where concrete components become a runtime.
// Dependencies: every sibling crate
// ============================================================================

//! ## Overview
//! There are no global singletons: the clock, registry, persistence, audit
//! chain, buses, pipeline, and processor are constructed here and threaded
//! through constructors. Adapters receive the runtime handle to submit
//! messages and register their capability providers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use ciris_audit::AuditChain;
use ciris_audit::AuditError;
use ciris_audit::AuditSigner;
use ciris_audit::KeyError;
use ciris_bus::BusBundle;
use ciris_bus::BusCore;
use ciris_bus::LlmBus;
use ciris_config::CirisConfig;
use ciris_config::ScopeError;
use ciris_config::ScopedConfig;
use ciris_core::Clock;
use ciris_core::Conscience;
use ciris_core::ConscienceThresholds;
use ciris_core::CorrelationStore;
use ciris_core::DmaPipeline;
use ciris_core::GraphStore;
use ciris_core::IncomingMessage;
use ciris_core::PipelineConfig;
use ciris_core::Priority;
use ciris_core::SigningKeyId;
use ciris_core::SystemClock;
use ciris_core::TaskId;
use ciris_core::interfaces::StoreError;
use ciris_registry::BreakerConfig;
use ciris_registry::RegistryError;
use ciris_registry::ServiceProvider;
use ciris_registry::ServiceRegistry;
use ciris_store_sqlite::SqliteStore;
use ciris_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

use crate::control::ProcessorControl;
use crate::control::RuntimeController;
use crate::dmas::LlmActionSelectionDma;
use crate::dmas::LlmCommonSenseDma;
use crate::dmas::LlmDomainDma;
use crate::dmas::LlmEthicalDma;
use crate::emergency::EmergencyShutdown;
use crate::handlers::HandlerContext;
use crate::handlers::HandlerDispatcher;
use crate::ingress::Ingress;
use crate::ingress::IngressError;
use crate::processor::CognitiveProcessor;
use crate::processor::ProcessorSettings;
use crate::providers::LocalGraphMemory;
use crate::providers::LocalTelemetry;
use crate::shutdown::ShutdownHandle;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Runtime construction errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Persistence store failed to open.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Audit chain failed to open.
    #[error(transparent)]
    Audit(#[from] AuditError),
    /// Signing key failed to initialize.
    #[error(transparent)]
    Key(#[from] KeyError),
    /// Registry wiring failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Scoped configuration failed to load.
    #[error(transparent)]
    Config(#[from] ScopeError),
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// A fully wired CIRIS runtime.
pub struct CirisRuntime {
    /// Clock shared by every component.
    clock: Arc<dyn Clock>,
    /// Provider directory.
    registry: Arc<ServiceRegistry>,
    /// Audit chain.
    audit: Arc<AuditChain>,
    /// Cognitive processor.
    processor: Arc<CognitiveProcessor>,
    /// Operator control surface.
    controller: Arc<RuntimeController>,
    /// Emergency shutdown entry point.
    emergency: Arc<EmergencyShutdown>,
    /// Message ingress.
    ingress: Ingress,
}

impl CirisRuntime {
    /// Builds a runtime from configuration using the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when any component fails to initialize.
    pub fn build(config: CirisConfig) -> Result<Self, RuntimeError> {
        Self::build_with_clock(config, Arc::new(SystemClock))
    }

    /// Builds a runtime from configuration with an injected clock.
    ///
    /// Test harnesses inject a deterministic clock here; nothing else in the
    /// runtime reads wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when any component fails to initialize.
    pub fn build_with_clock(
        config: CirisConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RuntimeError> {
        let store = Arc::new(SqliteStore::open(&SqliteStoreConfig {
            path: config.storage.main_db_path.clone(),
            busy_timeout_ms: 5_000,
        })?);

        let registry = Arc::new(ServiceRegistry::new(Arc::clone(&clock), BreakerConfig {
            failure_threshold: config.registry.circuit_breaker_failure_threshold,
            reset_timeout_millis: config
                .registry
                .circuit_breaker_reset_timeout_seconds
                .saturating_mul(1_000),
        }));

        // Each boot signs with a fresh key id; prior keys stay verifiable.
        let signer = AuditSigner::generate(
            SigningKeyId::new(format!("audit-key-{}", clock.now().unix_millis())),
            config.audit.signing_algorithm,
        )?;
        let audit = Arc::new(AuditChain::open(
            &config.audit.journal_path,
            &config.audit.db_path,
            signer,
            Arc::clone(&clock),
        )?);

        registry.register(
            BTreeSet::from(["log".to_string()]),
            Priority::Critical,
            ServiceProvider::Audit(Arc::clone(&audit) as _),
        )?;
        registry.register(
            ["put_node", "get_node", "delete_node", "query_nodes", "put_edge"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            Priority::Normal,
            ServiceProvider::Memory(Arc::new(LocalGraphMemory::new(
                Arc::clone(&store) as Arc<dyn GraphStore>
            ))),
        )?;
        registry.register(
            BTreeSet::from(["record_metric".to_string()]),
            Priority::Normal,
            ServiceProvider::Telemetry(Arc::new(LocalTelemetry::new(
                Arc::clone(&store) as Arc<dyn CorrelationStore>,
                Arc::clone(&clock),
            ))),
        )?;

        let bus_core = Arc::new(BusCore::new(
            Arc::clone(&registry),
            Some(Arc::clone(&store) as Arc<dyn CorrelationStore>),
            Arc::clone(&clock),
        ));
        let buses = Arc::new(BusBundle::new(Arc::clone(&bus_core)));

        let llm_bus = Arc::new(LlmBus::new(Arc::clone(&bus_core)));
        let pipeline = Arc::new(DmaPipeline::new(
            Arc::new(LlmEthicalDma::new(Arc::clone(&llm_bus))),
            Arc::new(LlmCommonSenseDma::new(Arc::clone(&llm_bus))),
            Arc::new(LlmDomainDma::new(Arc::clone(&llm_bus), "general")),
            Arc::new(LlmActionSelectionDma::new(llm_bus)),
            Conscience::with_default_faculties(ConscienceThresholds {
                entropy_max: config.conscience.entropy_threshold,
                coherence_min: config.conscience.coherence_threshold,
            }),
            PipelineConfig {
                max_thought_depth: config.processor.max_thought_depth,
                dma_timeout: Duration::from_secs_f64(config.dma.timeout_seconds),
                dma_retry_limit: config.dma.retry_limit,
                ..PipelineConfig::default()
            },
        ));

        let handler_ctx = Arc::new(HandlerContext {
            buses,
            tasks: Arc::clone(&store) as _,
            thoughts: Arc::clone(&store) as _,
            scheduled: Arc::clone(&store) as _,
            audit: Arc::clone(&audit),
            clock: Arc::clone(&clock),
            shutdown: ShutdownHandle::new(),
        });

        let processor = Arc::new(CognitiveProcessor::new(
            pipeline,
            Arc::new(HandlerDispatcher::with_default_handlers()),
            Arc::clone(&handler_ctx),
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            Arc::clone(&registry),
            ProcessorSettings {
                max_active_thoughts: config.processor.max_active_thoughts,
                round_delay: Duration::from_secs_f64(config.processor.round_delay_seconds),
                shutdown_grace: Duration::from_secs_f64(config.processor.shutdown_grace_seconds),
                readiness_timeout: Duration::from_secs(config.registry.readiness_timeout_seconds),
            },
        ));

        registry.register(
            ["pause", "resume", "single_step", "queue_status"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            Priority::Critical,
            ServiceProvider::RuntimeControl(Arc::new(ProcessorControl::new(Arc::clone(
                &processor,
            )))),
        )?;

        let overlay_path = config
            .storage
            .main_db_path
            .parent()
            .map_or_else(|| "config.overlay.toml".into(), |dir| dir.join("config.overlay.toml"));
        let scoped_config = Arc::new(ScopedConfig::new(config.clone(), overlay_path)?);

        let controller = Arc::new(RuntimeController::new(
            Arc::clone(&processor),
            Arc::clone(&registry),
            scoped_config,
        ));
        let emergency = Arc::new(EmergencyShutdown::new(
            Arc::clone(&audit),
            config.audit.allowed_wa_keys.clone(),
            Arc::clone(&clock),
            processor.shutdown_handle(),
        ));
        let ingress = Ingress::new(
            Arc::clone(&store) as _,
            Arc::clone(&audit),
            Arc::clone(&clock),
        );

        Ok(Self {
            clock,
            registry,
            audit,
            processor,
            controller,
            emergency,
            ingress,
        })
    }

    /// Submits an adapter message; the single ingress function.
    ///
    /// # Errors
    ///
    /// Returns [`IngressError`] when the message is invalid or persistence
    /// fails.
    pub fn submit_message(&self, message: &IncomingMessage) -> Result<TaskId, IngressError> {
        self.ingress.submit_message(message)
    }

    /// Runs the processor loop until shutdown.
    ///
    /// # Errors
    ///
    /// Returns a processor error when startup self-checks fail.
    pub async fn run(&self) -> Result<(), crate::processor::ProcessorError> {
        self.processor.run().await
    }

    /// Registers an adapter-provided capability.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Registry`] when registration fails.
    pub fn register_provider(
        &self,
        capabilities: BTreeSet<String>,
        priority: Priority,
        provider: ServiceProvider,
    ) -> Result<ciris_core::ProviderHandle, RuntimeError> {
        Ok(self.registry.register(capabilities, priority, provider)?)
    }

    /// Returns the shared clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the provider directory.
    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Returns the audit chain.
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditChain> {
        &self.audit
    }

    /// Returns the cognitive processor.
    #[must_use]
    pub fn processor(&self) -> &Arc<CognitiveProcessor> {
        &self.processor
    }

    /// Returns the operator control surface.
    #[must_use]
    pub fn controller(&self) -> &Arc<RuntimeController> {
        &self.controller
    }

    /// Returns the emergency shutdown entry point.
    #[must_use]
    pub fn emergency(&self) -> &Arc<EmergencyShutdown> {
        &self.emergency
    }
}

// ============================================================================
// SECTION: Tracing Bootstrap
// ============================================================================

/// Initializes structured logging from the environment filter.
///
/// Safe to call once at process start; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
