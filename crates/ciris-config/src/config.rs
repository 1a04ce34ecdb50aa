// ciris-config/src/config.rs
// ============================================================================
// Module: CIRIS Configuration
// Description: Configuration loading and validation for the CIRIS runtime.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml, ciris-audit
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size limits. Missing
//! files yield defaults; invalid files fail closed. Every recognized option
//! carries the documented default so an empty file is a valid deployment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use ciris_audit::SigningAlgorithm;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "ciris.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "CIRIS_CONFIG";
/// Environment variable supplying the master secret for the secrets store.
pub const MASTER_SECRET_ENV_VAR: &str = "CIRIS_MASTER_SECRET";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file exceeds the size limit.
    #[error("config file too large: {actual} bytes (max {max})")]
    TooLarge {
        /// Maximum allowed bytes.
        max: u64,
        /// Actual file size in bytes.
        actual: u64,
    },
    /// Config file failed to parse.
    #[error("config parse error: {0}")]
    Parse(String),
    /// A config value failed validation.
    #[error("config validation error: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Processor loop options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Cap on concurrently active thoughts.
    pub max_active_thoughts: usize,
    /// Follow-up depth cap.
    pub max_thought_depth: u32,
    /// Controller sleep between rounds, in seconds.
    pub round_delay_seconds: f64,
    /// Grace window for in-flight work at shutdown, in seconds.
    pub shutdown_grace_seconds: f64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_active_thoughts: 50,
            max_thought_depth: 7,
            round_delay_seconds: 5.0,
            shutdown_grace_seconds: 10.0,
        }
    }
}

/// DMA evaluation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DmaConfig {
    /// Per-DMA evaluation deadline, in seconds.
    pub timeout_seconds: f64,
    /// Retry limit for retryable DMA failures.
    pub retry_limit: u32,
}

impl Default for DmaConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30.0,
            retry_limit: 3,
        }
    }
}

/// Conscience threshold options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConscienceConfig {
    /// Entropy scores above this value request reconsideration.
    pub entropy_threshold: f64,
    /// Coherence scores below this value request reconsideration.
    pub coherence_threshold: f64,
}

impl Default for ConscienceConfig {
    fn default() -> Self {
        Self {
            entropy_threshold: 0.40,
            coherence_threshold: 0.60,
        }
    }
}

/// Registry and circuit breaker options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Consecutive failures before a circuit opens.
    pub circuit_breaker_failure_threshold: u32,
    /// Seconds an open circuit waits before half-opening.
    pub circuit_breaker_reset_timeout_seconds: i64,
    /// Seconds the processor waits for required services at startup.
    pub readiness_timeout_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_failure_threshold: 3,
            circuit_breaker_reset_timeout_seconds: 300,
            readiness_timeout_seconds: 30,
        }
    }
}

/// Audit chain options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Signing algorithm for new audit entries.
    pub signing_algorithm: SigningAlgorithm,
    /// Path of the JSONL journal (authoritative sink).
    pub journal_path: PathBuf,
    /// Path of the SQLite index (mirror sink).
    pub db_path: PathBuf,
    /// Base64-encoded Wise Authority public keys accepted for emergency
    /// commands.
    pub allowed_wa_keys: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            signing_algorithm: SigningAlgorithm::Ed25519,
            journal_path: PathBuf::from("data/audit.jsonl"),
            db_path: PathBuf::from("data/audit.db"),
            allowed_wa_keys: Vec::new(),
        }
    }
}

/// Storage options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Path of the main database (tasks, thoughts, correlations, graph,
    /// scheduled tasks).
    pub main_db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            main_db_path: PathBuf::from("data/ciris.db"),
        }
    }
}

// ============================================================================
// SECTION: Root Configuration
// ============================================================================

/// Root CIRIS configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CirisConfig {
    /// Processor loop options.
    pub processor: ProcessorConfig,
    /// DMA evaluation options.
    pub dma: DmaConfig,
    /// Conscience threshold options.
    pub conscience: ConscienceConfig,
    /// Registry and circuit breaker options.
    pub registry: RegistryConfig,
    /// Audit chain options.
    pub audit: AuditConfig,
    /// Storage options.
    pub storage: StorageConfig,
}

impl CirisConfig {
    /// Loads configuration from an explicit path, the `CIRIS_CONFIG`
    /// environment variable, or the default filename, in that order.
    ///
    /// A missing file yields defaults; an unreadable or invalid file fails
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file exists but cannot be used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = path.map_or_else(
            || {
                env::var(CONFIG_ENV_VAR)
                    .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_NAME), PathBuf::from)
            },
            Path::to_path_buf,
        );
        if !resolved.exists() {
            tracing::info!(path = %resolved.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_file(&resolved)
    }

    /// Loads configuration from a file that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, is oversized,
    /// fails to parse, or fails validation.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let metadata = fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                max: MAX_CONFIG_FILE_SIZE,
                actual: metadata.len(),
            });
        }
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let config: Self =
            toml::from_str(&contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processor.max_active_thoughts == 0 {
            return Err(ConfigError::Invalid(
                "processor.max_active_thoughts must be positive".to_string(),
            ));
        }
        if self.processor.round_delay_seconds < 0.0 {
            return Err(ConfigError::Invalid(
                "processor.round_delay_seconds must not be negative".to_string(),
            ));
        }
        if self.dma.timeout_seconds <= 0.0 {
            return Err(ConfigError::Invalid(
                "dma.timeout_seconds must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.conscience.entropy_threshold) {
            return Err(ConfigError::Invalid(
                "conscience.entropy_threshold must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.conscience.coherence_threshold) {
            return Err(ConfigError::Invalid(
                "conscience.coherence_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.registry.circuit_breaker_failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "registry.circuit_breaker_failure_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
