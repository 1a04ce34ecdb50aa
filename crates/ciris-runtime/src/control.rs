// ciris-runtime/src/control.rs
// ============================================================================
// Module: Runtime Control Surface
// Description: Operator operations over processor, adapters, config, services.
// Purpose: Expose the stable operator surface, wire-format neutral.
// Dependencies: ciris-core, ciris-config, ciris-registry
// ============================================================================

//! ## Overview
//! The controller exposes the operator surface as plain methods named after
//! the stable operation names: processor pause/resume/step/queue, adapter
//! load/unload/list, config get/set/backup/restore by scope, and service
//! list/priority/circuit-reset. Transports (HTTP, CLI, chat commands) are
//! adapter concerns layered on top.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use ciris_config::ConfigScope;
use ciris_config::ScopeError;
use ciris_config::ScopedConfig;
use ciris_core::Priority;
use ciris_core::ProviderHandle;
use ciris_core::QueueStatus;
use ciris_core::RuntimeControlCapability;
use ciris_core::ServiceError;
use ciris_core::ServiceRegistration;
use ciris_registry::RegistryError;
use ciris_registry::ServiceRegistry;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::processor::CognitiveProcessor;
use crate::processor::ProcessorError;

// ============================================================================
// SECTION: Adapter Records
// ============================================================================

/// Record of a loaded adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterRecord {
    /// Adapter type label (for example `discord`, `http`, `cli`).
    pub adapter_type: String,
    /// Unique adapter instance id.
    pub adapter_id: String,
    /// Adapter configuration as provided by the operator.
    pub config: serde_json::Value,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Controller errors.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Processor operation failed.
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Config operation failed.
    #[error(transparent)]
    Config(#[from] ScopeError),
    /// Adapter id is already loaded or unknown.
    #[error("adapter error: {0}")]
    Adapter(String),
    /// Controller lock poisoned.
    #[error("controller lock poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Runtime Controller
// ============================================================================

/// The operator control surface.
pub struct RuntimeController {
    /// Processor under control.
    processor: Arc<CognitiveProcessor>,
    /// Provider directory.
    registry: Arc<ServiceRegistry>,
    /// Scoped configuration store.
    config: Arc<ScopedConfig>,
    /// Loaded adapters by id.
    adapters: RwLock<BTreeMap<String, AdapterRecord>>,
}

impl RuntimeController {
    /// Creates the controller.
    #[must_use]
    pub fn new(
        processor: Arc<CognitiveProcessor>,
        registry: Arc<ServiceRegistry>,
        config: Arc<ScopedConfig>,
    ) -> Self {
        Self {
            processor,
            registry,
            config,
            adapters: RwLock::new(BTreeMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // processor/*
    // ------------------------------------------------------------------

    /// `processor/pause`: pauses the round loop.
    pub fn processor_pause(&self) {
        self.processor.pause();
    }

    /// `processor/resume`: resumes the round loop.
    pub fn processor_resume(&self) {
        self.processor.resume();
    }

    /// `processor/step`: processes one round, returning thoughts processed.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when the round fails.
    pub async fn processor_step(&self) -> Result<usize, ControlError> {
        Ok(self.processor.single_step().await?)
    }

    /// `processor/queue`: returns the queue snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when the queue cannot be read.
    pub fn processor_queue(&self) -> Result<QueueStatus, ControlError> {
        Ok(self.processor.queue_status()?)
    }

    // ------------------------------------------------------------------
    // adapters/*
    // ------------------------------------------------------------------

    /// `adapters/load`: records a loaded adapter instance.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Adapter`] when the id is already loaded.
    pub fn adapters_load(
        &self,
        adapter_type: &str,
        adapter_id: &str,
        config: serde_json::Value,
    ) -> Result<(), ControlError> {
        let mut adapters = self.adapters.write().map_err(|_| ControlError::Poisoned)?;
        if adapters.contains_key(adapter_id) {
            return Err(ControlError::Adapter(format!("adapter already loaded: {adapter_id}")));
        }
        adapters.insert(adapter_id.to_string(), AdapterRecord {
            adapter_type: adapter_type.to_string(),
            adapter_id: adapter_id.to_string(),
            config,
        });
        tracing::info!(adapter_id, adapter_type, "adapter loaded");
        Ok(())
    }

    /// `adapters/unload`: removes a loaded adapter instance.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Adapter`] when the id is unknown.
    pub fn adapters_unload(&self, adapter_id: &str) -> Result<AdapterRecord, ControlError> {
        let mut adapters = self.adapters.write().map_err(|_| ControlError::Poisoned)?;
        adapters
            .remove(adapter_id)
            .ok_or_else(|| ControlError::Adapter(format!("adapter not loaded: {adapter_id}")))
    }

    /// `adapters/list`: lists loaded adapters.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Poisoned`] when the lock is poisoned.
    pub fn adapters_list(&self) -> Result<Vec<AdapterRecord>, ControlError> {
        let adapters = self.adapters.read().map_err(|_| ControlError::Poisoned)?;
        Ok(adapters.values().cloned().collect())
    }

    // ------------------------------------------------------------------
    // config/*
    // ------------------------------------------------------------------

    /// `config/get`: reads the effective value at a dotted path.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when the overlay store fails.
    pub fn config_get(&self, path: &str) -> Result<Option<toml::Value>, ControlError> {
        Ok(self.config.get(path)?)
    }

    /// `config/set`: writes a value at a dotted path in a scope.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when the overlay store fails.
    pub fn config_set(
        &self,
        scope: ConfigScope,
        path: &str,
        value: toml::Value,
    ) -> Result<(), ControlError> {
        Ok(self.config.set(scope, path, value)?)
    }

    /// `config/backup`: snapshots the persistent overlay.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when the snapshot fails.
    pub fn config_backup(&self) -> Result<PathBuf, ControlError> {
        Ok(self.config.backup()?)
    }

    /// `config/restore`: restores the persistent overlay from its snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when no snapshot exists or the restore fails.
    pub fn config_restore(&self) -> Result<(), ControlError> {
        Ok(self.config.restore()?)
    }

    // ------------------------------------------------------------------
    // services/*
    // ------------------------------------------------------------------

    /// `services/list`: lists every registration.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when the registry fails.
    pub fn services_list(&self) -> Result<Vec<ServiceRegistration>, ControlError> {
        Ok(self.registry.list()?)
    }

    /// `services/priority/set`: overrides a provider's priority.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when the handle is unknown.
    pub fn services_set_priority(
        &self,
        handle: &ProviderHandle,
        priority: Priority,
    ) -> Result<(), ControlError> {
        Ok(self.registry.set_priority(handle, priority)?)
    }

    /// `services/circuit/reset`: forces a provider's circuit closed.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when the handle is unknown.
    pub fn services_reset_circuit(&self, handle: &ProviderHandle) -> Result<(), ControlError> {
        Ok(self.registry.reset_circuit(handle)?)
    }
}

// ============================================================================
// SECTION: Bus-Facing Control Capability
// ============================================================================

/// Thin wrapper registering the processor on the runtime-control bus.
pub struct ProcessorControl {
    /// Processor under control.
    processor: Arc<CognitiveProcessor>,
}

impl ProcessorControl {
    /// Creates the wrapper.
    #[must_use]
    pub const fn new(processor: Arc<CognitiveProcessor>) -> Self {
        Self {
            processor,
        }
    }
}

#[async_trait]
impl RuntimeControlCapability for ProcessorControl {
    async fn pause(&self) -> Result<(), ServiceError> {
        self.processor.pause();
        Ok(())
    }

    async fn resume(&self) -> Result<(), ServiceError> {
        self.processor.resume();
        Ok(())
    }

    async fn single_step(&self) -> Result<usize, ServiceError> {
        self.processor
            .single_step()
            .await
            .map_err(|error| ServiceError::transient(error.to_string()))
    }

    async fn queue_status(&self) -> Result<QueueStatus, ServiceError> {
        self.processor
            .queue_status()
            .map_err(|error| ServiceError::transient(error.to_string()))
    }
}
