//! Weapon definition data for data-driven weapon types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{WeaponClass, WeaponDefId};
use crate::math::{decimal_serde, Fixed};

/// Data-driven weapon definition ("weapon type").
///
/// # Example RON
///
/// ```ron
/// WeaponDef(
///     id: "assault_rifle",
///     label: "assault rifle",
///     class: Ranged,
///     base_power: 14.0,
///     category: "guns",
///     max_hit_points: 100,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponDef {
    /// Unique type id, stable across save/load.
    pub id: WeaponDefId,

    /// Human-readable label.
    pub label: String,

    /// Ranged or melee.
    pub class: WeaponClass,

    /// Baseline usefulness before quality, condition and pawn modifiers.
    #[serde(with = "decimal_serde")]
    pub base_power: Fixed,

    /// Category used by outfit allow-lists (e.g. `"guns"`, `"blades"`).
    pub category: String,

    /// Durability of a fresh instance.
    #[serde(default = "default_max_hit_points")]
    pub max_hit_points: u32,
}

/// Default durability for definitions that omit it.
const fn default_max_hit_points() -> u32 {
    100
}

impl WeaponDef {
    /// Create a definition.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        class: WeaponClass,
        base_power: Fixed,
        category: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            label: id.replace('_', " "),
            id: WeaponDefId(id),
            class,
            base_power,
            category: category.into(),
            max_hit_points: default_max_hit_points(),
        }
    }

    /// Whether this is a ranged weapon.
    #[must_use]
    pub fn is_ranged(&self) -> bool {
        self.class == WeaponClass::Ranged
    }
}

/// Lookup table of weapon definitions, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponDefRegistry {
    defs: BTreeMap<WeaponDefId, WeaponDef>,
}

impl WeaponDefRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock weapon set used by fixtures and built-in scenarios.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for def in [
            WeaponDef::new("pistol", WeaponClass::Ranged, Fixed::from_num(10), "guns"),
            WeaponDef::new("revolver", WeaponClass::Ranged, Fixed::from_num(11), "guns"),
            WeaponDef::new("assault_rifle", WeaponClass::Ranged, Fixed::from_num(14), "guns"),
            WeaponDef::new("sniper_rifle", WeaponClass::Ranged, Fixed::from_num(15), "guns"),
            WeaponDef::new("knife", WeaponClass::Melee, Fixed::from_num(7), "blades"),
            WeaponDef::new("longsword", WeaponClass::Melee, Fixed::from_num(12), "blades"),
            WeaponDef::new("mace", WeaponClass::Melee, Fixed::from_num(11), "blunt"),
        ] {
            registry.insert(def);
        }
        registry
    }

    /// Parse a list of definitions from RON (`[WeaponDef(..), ..]`).
    pub fn from_ron_str(ron_text: &str) -> Result<Self, ron::error::SpannedError> {
        let defs: Vec<WeaponDef> = ron::from_str(ron_text)?;
        let mut registry = Self::new();
        for def in defs {
            registry.insert(def);
        }
        Ok(registry)
    }

    /// Add or replace a definition.
    pub fn insert(&mut self, def: WeaponDef) {
        self.defs.insert(def.id.clone(), def);
    }

    /// Look up a definition.
    #[must_use]
    pub fn get(&self, id: &WeaponDefId) -> Option<&WeaponDef> {
        self.defs.get(id)
    }

    /// Whether a definition exists.
    #[must_use]
    pub fn contains(&self, id: &WeaponDefId) -> bool {
        self.defs.contains_key(id)
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Iterate definitions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &WeaponDef> {
        self.defs.values()
    }
}
