//! Engine configuration.
//!
//! Passed explicitly into [`crate::arbiter::JobArbiter`] instead of living
//! in a process-wide settings object, so two engines with different
//! settings can run side by side in tests.
//!
//! # Example RON
//!
//! ```ron
//! EngineConfig(
//!     mod_enabled: true,
//!     disable_during_raids: true,
//!     weapon_upgrade_threshold: 1.1,
//!     search_radius: 55.0,
//! )
//! ```
//!
//! Omitted fields take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::{decimal_serde, percent, Fixed};

/// Default upgrade threshold (candidate must beat current by 10%).
pub const DEFAULT_UPGRADE_THRESHOLD_PERCENT: i64 = 110;

/// Default search radius in tiles.
pub const DEFAULT_SEARCH_RADIUS: i32 = 55;

/// Default cooldown before a pawn may re-pick a weapon it dropped.
pub const DEFAULT_DROPPED_COOLDOWN_TICKS: u64 = 600;

/// Tunable engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global switch; when off no job is ever emitted.
    pub mod_enabled: bool,

    /// Suppress upgrades for armed pawns during large hostile incursions.
    pub disable_during_raids: bool,

    /// Let completely unarmed pawns pick up a weapon even while raids
    /// suppress upgrades.
    pub allow_unarmed_pickup_during_raids: bool,

    /// A candidate must score above `current * threshold` to replace the
    /// current weapon.
    #[serde(with = "decimal_serde")]
    pub weapon_upgrade_threshold: Fixed,

    /// Allow same-type upgrades while the current weapon is forced.
    pub allow_forced_weapon_upgrades: bool,

    /// Allow leaving a forced weapon for a different weapon type.
    pub allow_forced_cross_type_upgrades: bool,

    /// Score ratio a cross-type candidate needs to replace a forced weapon.
    #[serde(with = "decimal_serde")]
    pub forced_cross_type_margin: Fixed,

    /// Let children (below adult age) equip weapons.
    pub allow_children_to_equip_weapons: bool,

    /// Minimum age for children when allowed.
    pub children_min_age: u32,

    /// Automate temporary colonists as well.
    pub allow_temporary_colonists: bool,

    /// Candidate search radius in tiles.
    #[serde(with = "decimal_serde")]
    pub search_radius: Fixed,

    /// Ticks during which a pawn ignores a weapon it dropped itself.
    pub dropped_item_cooldown_ticks: u64,

    /// Ticks after issue when an equip job expires.
    pub job_expiry_ticks: u64,

    /// How often the driver evaluates each pawn.
    pub think_interval_ticks: u64,

    /// How often the driver runs cache maintenance.
    pub maintenance_interval_ticks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mod_enabled: true,
            disable_during_raids: true,
            allow_unarmed_pickup_during_raids: true,
            weapon_upgrade_threshold: percent(DEFAULT_UPGRADE_THRESHOLD_PERCENT),
            allow_forced_weapon_upgrades: false,
            allow_forced_cross_type_upgrades: false,
            forced_cross_type_margin: percent(150),
            allow_children_to_equip_weapons: false,
            children_min_age: 13,
            allow_temporary_colonists: false,
            search_radius: Fixed::from_num(DEFAULT_SEARCH_RADIUS),
            dropped_item_cooldown_ticks: DEFAULT_DROPPED_COOLDOWN_TICKS,
            job_expiry_ticks: 2500,
            think_interval_ticks: 60,
            maintenance_interval_ticks: 250,
        }
    }
}

impl EngineConfig {
    /// Conservative settings used when no configuration is available:
    /// the engine is switched off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            mod_enabled: false,
            ..Self::default()
        }
    }

    /// Resolve an optional configuration, falling back to [`Self::disabled`].
    #[must_use]
    pub fn resolve(config: Option<Self>) -> Self {
        config.unwrap_or_else(|| {
            tracing::warn!("No engine configuration available, automatic equipping disabled");
            Self::disabled()
        })
    }

    /// Load and validate a configuration from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron_str(&contents)
    }

    /// Parse and validate a configuration from a RON string.
    pub fn from_ron_str(ron_text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(ron_text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that all values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weapon_upgrade_threshold < Fixed::ONE {
            return Err(ConfigError::Invalid {
                field: "weapon_upgrade_threshold",
                message: format!(
                    "must be at least 1.0, got {}",
                    self.weapon_upgrade_threshold
                ),
            });
        }
        if self.forced_cross_type_margin < Fixed::ONE {
            return Err(ConfigError::Invalid {
                field: "forced_cross_type_margin",
                message: format!(
                    "must be at least 1.0, got {}",
                    self.forced_cross_type_margin
                ),
            });
        }
        if self.search_radius <= Fixed::ZERO {
            return Err(ConfigError::Invalid {
                field: "search_radius",
                message: format!("must be positive, got {}", self.search_radius),
            });
        }
        if self.think_interval_ticks == 0 {
            return Err(ConfigError::Invalid {
                field: "think_interval_ticks",
                message: "must be non-zero".to_string(),
            });
        }
        if self.maintenance_interval_ticks == 0 {
            return Err(ConfigError::Invalid {
                field: "maintenance_interval_ticks",
                message: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Effective ratio for leaving a forced weapon for another type.
    ///
    /// Never lower than the regular upgrade threshold, so forcing can
    /// only make switching harder.
    #[must_use]
    pub fn effective_cross_type_margin(&self) -> Fixed {
        self.forced_cross_type_margin
            .max(self.weapon_upgrade_threshold)
            .max(Fixed::ONE)
    }
}
