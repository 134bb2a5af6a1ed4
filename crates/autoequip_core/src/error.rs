//! Error types for the fallible edges of the engine.
//!
//! Equip decisions themselves never fail: they return a
//! [`crate::job::Decision`]. Errors only arise from host mutations on the
//! reference [`crate::colony::Colony`], configuration loading and save/load.

use thiserror::Error;

use crate::components::{MapId, PawnId, WeaponDefId, WeaponId};

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error type for host mutations and persistence.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown pawn.
    #[error("Pawn not found: {0}")]
    PawnNotFound(PawnId),

    /// Unknown weapon.
    #[error("Weapon not found: {0}")]
    WeaponNotFound(WeaponId),

    /// Unknown map.
    #[error("Map not found: {0}")]
    MapNotFound(MapId),

    /// Unknown weapon definition.
    #[error("Unknown weapon definition: {0}")]
    UnknownWeaponDef(WeaponDefId),

    /// Configuration could not be used.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failed to serialize or deserialize a save.
    #[error("Save data error: {0}")]
    SaveData(String),

    /// Save written by an incompatible version.
    #[error("Save version mismatch: expected {expected}, got {found}")]
    SaveVersionMismatch {
        /// Version this build writes.
        expected: u32,
        /// Version found in the data.
        found: u32,
    },

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Errors from loading or validating an [`crate::config::EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse RON.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// A value is outside its allowed range.
    #[error("Invalid config value for '{field}': {message}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}
