//! Scenario loading and configuration.
//!
//! Scenarios define a starting colony for headless verification: maps,
//! pawns, ground weapons, forced assignments, raids and the expectations
//! checked after the run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use autoequip_core::colony::Colony;
use autoequip_core::components::{
    Capabilities, MapId, Membership, Pawn, PawnId, Quality, Skills, Trait, WeaponDefId,
};
use autoequip_core::config::EngineConfig;
use autoequip_core::error::{ConfigError, EngineError};
use autoequip_core::host::WorldView;
use autoequip_core::math::Vec2Fixed;
use autoequip_core::simulation::Simulation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// A placement names a weapon definition that does not exist.
    #[error("Unknown weapon definition: {0}")]
    UnknownWeaponDef(String),
    /// A forced assignment or expectation names a pawn that is not placed.
    #[error("Unknown pawn: {0}")]
    UnknownPawn(String),
    /// Structurally invalid scenario.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
    /// The scenario's engine configuration is rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The colony refused a placement.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A complete scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Engine settings. Defaults apply when absent.
    #[serde(default)]
    pub config: Option<EngineConfig>,
    /// Number of maps.
    #[serde(default = "default_maps")]
    pub maps: usize,
    /// Indices of maps with an active large raid.
    #[serde(default)]
    pub raids: Vec<usize>,
    /// Pawns to place.
    pub pawns: Vec<PawnPlacement>,
    /// Weapons to put on the ground.
    #[serde(default)]
    pub weapons: Vec<WeaponPlacement>,
    /// Forced weapon types per pawn.
    #[serde(default)]
    pub forced: Vec<ForcedAssignment>,
    /// How long to run.
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    /// Checked after the run.
    #[serde(default)]
    pub expectations: Vec<Expectation>,
}

const fn default_maps() -> usize {
    1
}

const fn default_ticks() -> u64 {
    600
}

const fn default_true() -> bool {
    true
}

/// A pawn at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PawnPlacement {
    /// Unique name, used by forced assignments and expectations.
    pub name: String,
    /// Map index.
    #[serde(default)]
    pub map: usize,
    /// Tile position (x, y).
    pub position: (i32, i32),
    /// Shooting skill.
    #[serde(default)]
    pub shooting: u8,
    /// Melee skill.
    #[serde(default)]
    pub melee: u8,
    /// Traits.
    #[serde(default)]
    pub traits: Vec<Trait>,
    /// Age in years.
    #[serde(default = "default_age")]
    pub age: u32,
    /// Colony membership.
    #[serde(default)]
    pub membership: Membership,
    /// Whether the pawn can fight at all.
    #[serde(default = "default_true")]
    pub violence_capable: bool,
    /// Whether the player is controlling it directly.
    #[serde(default)]
    pub drafted: bool,
    /// Weapon in hand at start.
    #[serde(default)]
    pub equipped: Option<HeldWeapon>,
}

const fn default_age() -> u32 {
    30
}

impl PawnPlacement {
    /// An unarmed adult colonist.
    #[must_use]
    pub fn new(name: impl Into<String>, x: i32, y: i32, shooting: u8, melee: u8) -> Self {
        Self {
            name: name.into(),
            map: 0,
            position: (x, y),
            shooting,
            melee,
            traits: Vec::new(),
            age: default_age(),
            membership: Membership::Colonist,
            violence_capable: true,
            drafted: false,
            equipped: None,
        }
    }

    /// Start with a weapon in hand.
    #[must_use]
    pub fn holding(mut self, def: impl Into<String>, quality: Quality) -> Self {
        self.equipped = Some(HeldWeapon {
            def: def.into(),
            quality,
        });
        self
    }
}

/// A weapon held by a pawn at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeldWeapon {
    /// Weapon definition id.
    pub def: String,
    /// Quality tier.
    pub quality: Quality,
}

/// A ground weapon at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaponPlacement {
    /// Weapon definition id.
    pub def: String,
    /// Quality tier.
    pub quality: Quality,
    /// Map index.
    #[serde(default)]
    pub map: usize,
    /// Tile position (x, y).
    pub position: (i32, i32),
    /// Starts forbidden.
    #[serde(default)]
    pub forbidden: bool,
    /// Remaining hit points; full when absent.
    #[serde(default)]
    pub hit_points: Option<u32>,
}

impl WeaponPlacement {
    /// A full-durability, allowed weapon on map 0.
    #[must_use]
    pub fn new(def: impl Into<String>, quality: Quality, x: i32, y: i32) -> Self {
        Self {
            def: def.into(),
            quality,
            map: 0,
            position: (x, y),
            forbidden: false,
            hit_points: None,
        }
    }

    /// Mark as forbidden.
    #[must_use]
    pub fn forbidden(mut self) -> Self {
        self.forbidden = true;
        self
    }
}

/// A weapon type forced for a pawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForcedAssignment {
    /// Pawn name.
    pub pawn: String,
    /// Weapon definition id.
    pub def: String,
}

/// A condition checked after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expectation {
    /// The pawn ends holding a weapon of this definition.
    Equipped {
        /// Pawn name.
        pawn: String,
        /// Weapon definition id.
        def: String,
    },
    /// The pawn ends holding a weapon of this quality.
    EquippedQuality {
        /// Pawn name.
        pawn: String,
        /// Quality tier.
        quality: Quality,
    },
    /// The pawn ends with nothing in hand.
    Unarmed {
        /// Pawn name.
        pawn: String,
    },
    /// The pawn was issued at most this many jobs.
    MaxJobsFor {
        /// Pawn name.
        pawn: String,
        /// Upper bound.
        max: usize,
    },
}

impl Expectation {
    /// Name of the pawn this expectation is about.
    #[must_use]
    pub fn pawn(&self) -> &str {
        match self {
            Self::Equipped { pawn, .. }
            | Self::EquippedQuality { pawn, .. }
            | Self::Unarmed { pawn }
            | Self::MaxJobsFor { pawn, .. } => pawn,
        }
    }
}

/// A scenario turned into a ready-to-run simulation.
#[derive(Debug)]
pub struct BuiltScenario {
    /// The simulation at tick 0.
    pub simulation: Simulation,
    /// Pawn ids by scenario name.
    pub pawns: BTreeMap<String, PawnId>,
    /// Map ids by scenario index.
    pub maps: Vec<MapId>,
}

impl Scenario {
    /// Names of the built-in scenarios.
    pub const BUILTIN: [&'static str; 5] =
        ["unarmed_pickup", "upgrade", "forbidden", "contention", "raid"];

    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// A built-in scenario by name, or a RON file by path.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        match Self::builtin(name_or_path) {
            Some(scenario) => Ok(scenario),
            None => Self::load(name_or_path),
        }
    }

    /// Look up a built-in scenario.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "unarmed_pickup" => Some(Self::unarmed_pickup()),
            "upgrade" => Some(Self::upgrade()),
            "forbidden" => Some(Self::forbidden()),
            "contention" => Some(Self::contention()),
            "raid" => Some(Self::raid()),
            _ => None,
        }
    }

    fn empty(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            config: None,
            maps: 1,
            raids: Vec::new(),
            pawns: Vec::new(),
            weapons: Vec::new(),
            forced: Vec::new(),
            ticks: default_ticks(),
            expectations: Vec::new(),
        }
    }

    /// An unarmed shooter next to an excellent pistol.
    #[must_use]
    pub fn unarmed_pickup() -> Self {
        Self {
            pawns: vec![PawnPlacement::new("ada", 0, 0, 12, 3)],
            weapons: vec![WeaponPlacement::new("pistol", Quality::Excellent, 1, 0)],
            expectations: vec![
                Expectation::Equipped {
                    pawn: "ada".into(),
                    def: "pistol".into(),
                },
                Expectation::MaxJobsFor {
                    pawn: "ada".into(),
                    max: 1,
                },
            ],
            ..Self::empty("unarmed_pickup", "Unarmed colonist picks up an adjacent pistol")
        }
    }

    /// A clear upgrade next to a marginal one.
    #[must_use]
    pub fn upgrade() -> Self {
        Self {
            pawns: vec![
                PawnPlacement::new("bo", 0, 0, 14, 2).holding("pistol", Quality::Normal),
                PawnPlacement::new("cy", 40, 0, 14, 2).holding("pistol", Quality::Normal),
            ],
            weapons: vec![
                WeaponPlacement::new("assault_rifle", Quality::Good, 3, 2),
                WeaponPlacement {
                    hit_points: Some(85),
                    ..WeaponPlacement::new("revolver", Quality::Normal, 42, 0)
                },
            ],
            expectations: vec![
                Expectation::Equipped {
                    pawn: "bo".into(),
                    def: "assault_rifle".into(),
                },
                Expectation::Equipped {
                    pawn: "cy".into(),
                    def: "pistol".into(),
                },
                Expectation::MaxJobsFor {
                    pawn: "bo".into(),
                    max: 1,
                },
                Expectation::MaxJobsFor {
                    pawn: "cy".into(),
                    max: 0,
                },
            ],
            ..Self::empty(
                "upgrade",
                "A clearly better rifle is taken, a barely better revolver is not",
            )
        }
    }

    /// The better weapon is forbidden.
    #[must_use]
    pub fn forbidden() -> Self {
        Self {
            pawns: vec![PawnPlacement::new("di", 0, 0, 10, 4)],
            weapons: vec![
                WeaponPlacement::new("sniper_rifle", Quality::Legendary, 2, 0).forbidden(),
                WeaponPlacement::new("pistol", Quality::Poor, 4, 0),
            ],
            expectations: vec![
                Expectation::Equipped {
                    pawn: "di".into(),
                    def: "pistol".into(),
                },
                Expectation::EquippedQuality {
                    pawn: "di".into(),
                    quality: Quality::Poor,
                },
            ],
            ..Self::empty("forbidden", "Forbidden weapons are never picked up")
        }
    }

    /// Four pawns, one rifle.
    #[must_use]
    pub fn contention() -> Self {
        let pawns: Vec<PawnPlacement> = (0..4)
            .map(|i| PawnPlacement::new(format!("p{i}"), i * 3, 0, 10, 5))
            .collect();
        let mut expectations: Vec<Expectation> = pawns
            .iter()
            .skip(1)
            .map(|p| Expectation::Unarmed {
                pawn: p.name.clone(),
            })
            .collect();
        expectations.push(Expectation::Equipped {
            pawn: "p0".into(),
            def: "assault_rifle".into(),
        });
        Self {
            pawns,
            weapons: vec![WeaponPlacement::new("assault_rifle", Quality::Normal, 5, 5)],
            expectations,
            ..Self::empty("contention", "Only one of several pawns claims a single rifle")
        }
    }

    /// A raid is underway: armed pawns hold, unarmed pawns arm up.
    #[must_use]
    pub fn raid() -> Self {
        Self {
            raids: vec![0],
            pawns: vec![
                PawnPlacement::new("ed", 0, 0, 12, 2).holding("pistol", Quality::Poor),
                PawnPlacement::new("fa", 10, 0, 12, 2),
            ],
            weapons: vec![
                WeaponPlacement::new("sniper_rifle", Quality::Good, 2, 0),
                WeaponPlacement::new("revolver", Quality::Normal, 12, 0),
            ],
            expectations: vec![
                Expectation::Equipped {
                    pawn: "ed".into(),
                    def: "pistol".into(),
                },
                Expectation::MaxJobsFor {
                    pawn: "ed".into(),
                    max: 0,
                },
                Expectation::Equipped {
                    pawn: "fa".into(),
                    def: "sniper_rifle".into(),
                },
            ],
            ..Self::empty("raid", "Raids suppress upgrades but not emergency pickups")
        }
    }

    /// Check cross-references without building anything.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.maps == 0 {
            return Err(ScenarioError::Invalid("at least one map is required".into()));
        }
        let mut names = BTreeSet::new();
        for pawn in &self.pawns {
            if !names.insert(pawn.name.as_str()) {
                return Err(ScenarioError::Invalid(format!("duplicate pawn name {}", pawn.name)));
            }
            self.check_map(pawn.map)?;
        }
        for weapon in &self.weapons {
            self.check_map(weapon.map)?;
        }
        for &raid in &self.raids {
            self.check_map(raid)?;
        }
        let referenced = self
            .forced
            .iter()
            .map(|f| f.pawn.as_str())
            .chain(self.expectations.iter().map(Expectation::pawn));
        for name in referenced {
            if !names.contains(name) {
                return Err(ScenarioError::UnknownPawn(name.to_string()));
            }
        }
        if let Some(config) = &self.config {
            config.validate()?;
        }
        Ok(())
    }

    fn check_map(&self, index: usize) -> Result<(), ScenarioError> {
        if index >= self.maps {
            return Err(ScenarioError::Invalid(format!(
                "map index {index} out of range (scenario has {} maps)",
                self.maps
            )));
        }
        Ok(())
    }

    /// Build the starting colony and wrap it in a simulation.
    pub fn build(&self) -> Result<BuiltScenario, ScenarioError> {
        self.validate()?;

        let mut colony = Colony::with_standard_defs();
        let maps: Vec<MapId> = (0..self.maps).map(|_| colony.add_map()).collect();

        let mut pawns = BTreeMap::new();
        for placement in &self.pawns {
            let mut pawn = Pawn::new(
                PawnId(0),
                placement.name.clone(),
                maps[placement.map],
                Vec2Fixed::from_tiles(placement.position.0, placement.position.1),
            );
            pawn.skills = Skills::new(placement.shooting, placement.melee);
            pawn.traits.extend(placement.traits.iter().copied());
            pawn.age_years = placement.age;
            pawn.membership = placement.membership;
            pawn.capabilities = Capabilities {
                violence_capable: placement.violence_capable,
                drafted: placement.drafted,
                ..Capabilities::default()
            };
            let id = colony.add_pawn(pawn)?;
            if let Some(held) = &placement.equipped {
                let def = known_def(&colony, &held.def)?;
                colony.give_weapon(id, &def, held.quality)?;
            }
            pawns.insert(placement.name.clone(), id);
        }

        for placement in &self.weapons {
            let def = known_def(&colony, &placement.def)?;
            let position = Vec2Fixed::from_tiles(placement.position.0, placement.position.1);
            let id = colony.spawn_weapon(&def, placement.quality, maps[placement.map], position)?;
            if placement.forbidden {
                colony.set_forbidden(id, true)?;
            }
            if let Some(hit_points) = placement.hit_points {
                let max = colony.weapon(id).map_or(0, |w| w.max_hit_points);
                colony.damage_weapon(id, max.saturating_sub(hit_points))?;
            }
        }

        for &raid in &self.raids {
            colony.start_raid(maps[raid]);
        }

        let config = self.config.clone().unwrap_or_default();
        let mut simulation = Simulation::new(colony, config);
        for assignment in &self.forced {
            let pawn = pawns
                .get(&assignment.pawn)
                .copied()
                .ok_or_else(|| ScenarioError::UnknownPawn(assignment.pawn.clone()))?;
            let def = known_def(simulation.colony(), &assignment.def)?;
            simulation.arbiter_mut().forced_mut().add_forced_type(pawn, def);
        }

        tracing::debug!(
            scenario = %self.name,
            pawns = pawns.len(),
            weapons = self.weapons.len(),
            "Scenario built"
        );
        Ok(BuiltScenario {
            simulation,
            pawns,
            maps,
        })
    }
}

fn known_def(colony: &Colony, id: &str) -> Result<WeaponDefId, ScenarioError> {
    let def = WeaponDefId::new(id);
    if colony.weapon_def(&def).is_none() {
        return Err(ScenarioError::UnknownWeaponDef(id.to_string()));
    }
    Ok(def)
}
