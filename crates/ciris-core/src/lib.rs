// ciris-core/src/lib.rs
// ============================================================================
// Module: CIRIS Core Library
// Description: Public API surface for the CIRIS reasoning core.
// Purpose: Expose core types, interfaces, and the DMA pipeline.
// Dependencies: crate::{core, dma, interfaces}
// ============================================================================

//! ## Overview
//! The CIRIS core provides the data model, capability interfaces, and layered
//! decision-making pipeline for a moral-reasoning agent runtime. It is
//! backend-agnostic and integrates through explicit interfaces rather than
//! embedding into adapter frameworks.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod dma;
pub mod interfaces;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use dma::ActionSelectionContext;
pub use dma::ActionSelectionDma;
pub use dma::CommonSenseDma;
pub use dma::Conscience;
pub use dma::ConscienceFaculty;
pub use dma::ConscienceResult;
pub use dma::ConscienceThresholds;
pub use dma::DmaContext;
pub use dma::DmaEvaluations;
pub use dma::DmaPipeline;
pub use dma::DomainDma;
pub use dma::EthicalDma;
pub use dma::FacultyReport;
pub use dma::PipelineConfig;
pub use dma::PipelineOutcome;
pub use dma::identity_variance;
pub use interfaces::AuditSink;
pub use interfaces::ChatMessage;
pub use interfaces::CommunicationCapability;
pub use interfaces::CorrelationStore;
pub use interfaces::FilterCapability;
pub use interfaces::FilterVerdict;
pub use interfaces::GraphStore;
pub use interfaces::GuidanceRequest;
pub use interfaces::GuidanceResult;
pub use interfaces::LlmCapability;
pub use interfaces::LlmMessage;
pub use interfaces::LlmRole;
pub use interfaces::MemoryCapability;
pub use interfaces::QueueStatus;
pub use interfaces::RuntimeControlCapability;
pub use interfaces::ScheduledTaskStore;
pub use interfaces::SecretRef;
pub use interfaces::SecretsCapability;
pub use interfaces::StoreError;
pub use interfaces::StructuredResponse;
pub use interfaces::TaskStore;
pub use interfaces::TelemetryCapability;
pub use interfaces::ThoughtStore;
pub use interfaces::TokenUsage;
pub use interfaces::ToolCapability;
pub use interfaces::ToolDescriptor;
pub use interfaces::ToolResult;
pub use interfaces::WiseAuthorityCapability;
