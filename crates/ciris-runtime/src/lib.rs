// ciris-runtime/src/lib.rs
// ============================================================================
// Module: CIRIS Runtime Library
// Description: Public API surface for the assembled runtime.
// Purpose: Expose the processor, handlers, ingress, and composition root.
// Dependencies: crate submodules
// ============================================================================

//! ## Overview
//! The runtime crate assembles the core into a running agent: the cognitive
//! processor and its round loop, the ten action handlers, LLM-backed DMAs,
//! the message ingress, the operator control surface, and the emergency
//! shutdown entry point. The composition root wires every dependency
//! explicitly; there are no global singletons.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod composition;
pub mod control;
pub mod dmas;
pub mod emergency;
pub mod handlers;
pub mod ingress;
pub mod processor;
pub mod providers;
pub mod shutdown;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use composition::CirisRuntime;
pub use composition::RuntimeError;
pub use composition::init_tracing;
pub use control::AdapterRecord;
pub use control::ControlError;
pub use control::ProcessorControl;
pub use control::RuntimeController;
pub use dmas::LlmActionSelectionDma;
pub use dmas::LlmCommonSenseDma;
pub use dmas::LlmDomainDma;
pub use dmas::LlmEthicalDma;
pub use emergency::EmergencyShutdown;
pub use handlers::ActionHandler;
pub use handlers::HandlerContext;
pub use handlers::HandlerDispatcher;
pub use handlers::HandlerOutcome;
pub use ingress::Ingress;
pub use ingress::IngressError;
pub use processor::CognitiveProcessor;
pub use processor::CognitiveState;
pub use processor::ProcessorError;
pub use processor::ProcessorSettings;
pub use providers::LocalGraphMemory;
pub use providers::LocalTelemetry;
pub use shutdown::ShutdownHandle;
