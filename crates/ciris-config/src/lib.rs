// ciris-config/src/lib.rs
// ============================================================================
// Module: CIRIS Config Library
// Description: Public API surface for configuration loading and scopes.
// Purpose: Expose strict config parsing and the scoped overlay store.
// Dependencies: crate::{config, scopes}
// ============================================================================

//! ## Overview
//! The config crate loads the CIRIS TOML configuration fail-closed and
//! layers operator overlays over it in three scopes with explicit survival
//! semantics.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod scopes;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuditConfig;
pub use config::CONFIG_ENV_VAR;
pub use config::CirisConfig;
pub use config::ConfigError;
pub use config::ConscienceConfig;
pub use config::DEFAULT_CONFIG_NAME;
pub use config::DmaConfig;
pub use config::MASTER_SECRET_ENV_VAR;
pub use config::MAX_CONFIG_FILE_SIZE;
pub use config::ProcessorConfig;
pub use config::RegistryConfig;
pub use config::StorageConfig;
pub use scopes::ConfigScope;
pub use scopes::ScopeError;
pub use scopes::ScopedConfig;
