// ciris-config/src/scopes.rs
// ============================================================================
// Module: Scoped Configuration Overlay
// Description: Runtime, session, and persistent configuration scopes.
// Purpose: Let operators adjust options with explicit survival semantics.
// Dependencies: serde, toml, crate::config
// ============================================================================

//! ## Overview
//! Operator configuration writes name a scope. Runtime values last until the
//! process exits, session values last until the session ends, and persistent
//! values are written to an overlay file and survive restarts. Lookup order
//! is runtime over session over persistent over the base file. Backup and
//! restore snapshot the persistent overlay.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::config::CirisConfig;

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Survival scope of a configuration write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigScope {
    /// Lives until the process exits.
    Runtime,
    /// Lives until the session ends.
    Session,
    /// Written to the overlay file; survives restarts.
    Persistent,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Scoped configuration errors.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// Overlay file could not be read or written.
    #[error("config overlay io error: {0}")]
    Io(String),
    /// Overlay file failed to parse.
    #[error("config overlay parse error: {0}")]
    Parse(String),
    /// Overlay lock poisoned.
    #[error("config overlay lock poisoned")]
    Poisoned,
    /// No backup exists to restore.
    #[error("no config backup found at {0}")]
    NoBackup(String),
}

// ============================================================================
// SECTION: Overlay State
// ============================================================================

/// Flat dotted-path overlays per scope.
#[derive(Default)]
struct Overlays {
    /// Runtime-scope values.
    runtime: BTreeMap<String, toml::Value>,
    /// Session-scope values.
    session: BTreeMap<String, toml::Value>,
    /// Persistent-scope values (mirrored to disk).
    persistent: BTreeMap<String, toml::Value>,
}

impl Overlays {
    /// Returns the map for a scope.
    fn scope_mut(&mut self, scope: ConfigScope) -> &mut BTreeMap<String, toml::Value> {
        match scope {
            ConfigScope::Runtime => &mut self.runtime,
            ConfigScope::Session => &mut self.session,
            ConfigScope::Persistent => &mut self.persistent,
        }
    }
}

// ============================================================================
// SECTION: Scoped Config
// ============================================================================

/// Base configuration plus scoped operator overlays.
pub struct ScopedConfig {
    /// Base configuration loaded at startup.
    base: CirisConfig,
    /// Scoped overlays.
    overlays: RwLock<Overlays>,
    /// Path of the persistent overlay file.
    persistent_path: PathBuf,
}

impl ScopedConfig {
    /// Creates a scoped config, loading any existing persistent overlay.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError`] when an existing overlay file cannot be used.
    pub fn new(base: CirisConfig, persistent_path: PathBuf) -> Result<Self, ScopeError> {
        let mut overlays = Overlays::default();
        if persistent_path.exists() {
            let contents = fs::read_to_string(&persistent_path)
                .map_err(|err| ScopeError::Io(err.to_string()))?;
            overlays.persistent =
                toml::from_str(&contents).map_err(|err| ScopeError::Parse(err.to_string()))?;
        }
        Ok(Self {
            base,
            overlays: RwLock::new(overlays),
            persistent_path,
        })
    }

    /// Returns the base configuration loaded at startup.
    #[must_use]
    pub const fn base(&self) -> &CirisConfig {
        &self.base
    }

    /// Reads the effective value at a dotted path.
    ///
    /// Lookup order: runtime, session, persistent, then the base file.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::Poisoned`] when the overlay lock is poisoned.
    pub fn get(&self, path: &str) -> Result<Option<toml::Value>, ScopeError> {
        let overlays = self.overlays.read().map_err(|_| ScopeError::Poisoned)?;
        if let Some(value) = overlays
            .runtime
            .get(path)
            .or_else(|| overlays.session.get(path))
            .or_else(|| overlays.persistent.get(path))
        {
            return Ok(Some(value.clone()));
        }
        drop(overlays);
        Ok(self.base_value(path))
    }

    /// Writes a value at a dotted path in the given scope.
    ///
    /// Persistent writes are mirrored to the overlay file before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError`] when the persistent overlay cannot be written.
    pub fn set(
        &self,
        scope: ConfigScope,
        path: &str,
        value: toml::Value,
    ) -> Result<(), ScopeError> {
        let mut overlays = self.overlays.write().map_err(|_| ScopeError::Poisoned)?;
        overlays.scope_mut(scope).insert(path.to_string(), value);
        if scope == ConfigScope::Persistent {
            let serialized = toml::to_string(&overlays.persistent)
                .map_err(|err| ScopeError::Parse(err.to_string()))?;
            write_atomically(&self.persistent_path, &serialized)?;
        }
        tracing::info!(?scope, path, "config value written");
        Ok(())
    }

    /// Snapshots the persistent overlay next to itself.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::Io`] when the snapshot cannot be written.
    pub fn backup(&self) -> Result<PathBuf, ScopeError> {
        let overlays = self.overlays.read().map_err(|_| ScopeError::Poisoned)?;
        let serialized = toml::to_string(&overlays.persistent)
            .map_err(|err| ScopeError::Parse(err.to_string()))?;
        let backup_path = backup_path(&self.persistent_path);
        write_atomically(&backup_path, &serialized)?;
        Ok(backup_path)
    }

    /// Restores the persistent overlay from its snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::NoBackup`] when no snapshot exists.
    pub fn restore(&self) -> Result<(), ScopeError> {
        let backup_path = backup_path(&self.persistent_path);
        if !backup_path.exists() {
            return Err(ScopeError::NoBackup(backup_path.display().to_string()));
        }
        let contents =
            fs::read_to_string(&backup_path).map_err(|err| ScopeError::Io(err.to_string()))?;
        let restored: BTreeMap<String, toml::Value> =
            toml::from_str(&contents).map_err(|err| ScopeError::Parse(err.to_string()))?;
        let mut overlays = self.overlays.write().map_err(|_| ScopeError::Poisoned)?;
        overlays.persistent = restored;
        let serialized = toml::to_string(&overlays.persistent)
            .map_err(|err| ScopeError::Parse(err.to_string()))?;
        write_atomically(&self.persistent_path, &serialized)
    }

    /// Looks up a dotted path in the serialized base configuration.
    fn base_value(&self, path: &str) -> Option<toml::Value> {
        let root = toml::Value::try_from(&self.base).ok()?;
        let mut current = &root;
        for segment in path.split('.') {
            current = current.as_table()?.get(segment)?;
        }
        Some(current.clone())
    }
}

// ============================================================================
// SECTION: File Helpers
// ============================================================================

/// Returns the snapshot path for an overlay file.
fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");
    PathBuf::from(backup)
}

/// Writes contents via a temp file and rename.
fn write_atomically(path: &Path, contents: &str) -> Result<(), ScopeError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| ScopeError::Io(err.to_string()))?;
        }
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    fs::write(&temp, contents).map_err(|err| ScopeError::Io(err.to_string()))?;
    fs::rename(&temp, path).map_err(|err| ScopeError::Io(err.to_string()))
}
