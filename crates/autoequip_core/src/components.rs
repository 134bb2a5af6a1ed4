//! Entity data the engine reads.
//!
//! Pawns and weapons are owned by the host simulation. These are plain
//! data types with no behavior beyond simple queries; the engine only
//! ever reads them through [`crate::host::WorldView`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::{percent, Fixed, Vec2Fixed};

/// Age in years at which a pawn stops counting as a child.
pub const ADULT_AGE: u32 = 18;

/// Highest level a skill can reach.
pub const MAX_SKILL_LEVEL: u8 = 20;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a pawn.
    PawnId,
    "pawn"
);
entity_id!(
    /// Unique identifier for a weapon instance.
    WeaponId,
    "weapon"
);
entity_id!(
    /// Unique identifier for a map.
    MapId,
    "map"
);

/// Identity of a weapon definition ("type"), e.g. `"assault_rifle"`.
///
/// Unlike [`WeaponId`], definition ids are stable across save/load.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeaponDefId(pub String);

impl WeaponDefId {
    /// Create a definition id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw string id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WeaponDefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WeaponDefId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// Weapon Types
// ============================================================================

/// Crafting quality tier, ordered from worst to best.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Quality {
    /// Barely functional.
    Awful,
    /// Below standard.
    Poor,
    /// Standard quality.
    #[default]
    Normal,
    /// Above standard.
    Good,
    /// Noticeably superior.
    Excellent,
    /// Work of a master crafter.
    Masterwork,
    /// Unique, best possible.
    Legendary,
}

impl Quality {
    /// All tiers in ascending order.
    pub const ALL: [Quality; 7] = [
        Quality::Awful,
        Quality::Poor,
        Quality::Normal,
        Quality::Good,
        Quality::Excellent,
        Quality::Masterwork,
        Quality::Legendary,
    ];

    /// Score multiplier for this tier. Strictly increasing with tier.
    #[must_use]
    pub fn multiplier(self) -> Fixed {
        let pct = match self {
            Quality::Awful => 70,
            Quality::Poor => 85,
            Quality::Normal => 100,
            Quality::Good => 115,
            Quality::Excellent => 130,
            Quality::Masterwork => 145,
            Quality::Legendary => 165,
        };
        percent(pct)
    }
}

/// Broad weapon class, used for skill matching and trait bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponClass {
    /// Guns, bows and other projectile weapons.
    Ranged,
    /// Blades, clubs and other close-combat weapons.
    Melee,
}

/// Where a weapon currently is.
///
/// Only [`WeaponState::OnGround`] weapons are spawned on a map and
/// therefore eligible as candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponState {
    /// Lying on a map tile.
    OnGround {
        /// Map the weapon lies on.
        map: MapId,
        /// Tile position.
        position: Vec2Fixed,
    },
    /// Held as a pawn's primary weapon.
    Equipped {
        /// Holder.
        pawn: PawnId,
    },
    /// Carried in a pawn's inventory.
    Carried {
        /// Carrier.
        pawn: PawnId,
    },
    /// Inside a container (shelf, crate, transport pod).
    Stored {
        /// Host-defined container id.
        container: u64,
    },
    /// Removed from the world but not destroyed.
    Despawned,
    /// Destroyed; the weapon will never come back.
    Destroyed,
}

/// A weapon instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Weapon {
    /// Unique instance id.
    pub id: WeaponId,
    /// Definition (type) of this weapon.
    pub def: WeaponDefId,
    /// Crafting quality.
    pub quality: Quality,
    /// Current durability.
    pub hit_points: u32,
    /// Maximum durability.
    pub max_hit_points: u32,
    /// Current location / lifecycle state.
    pub state: WeaponState,
    /// Whether the player has forbidden this item.
    pub forbidden: bool,
    /// Persona bond: only this pawn may use the weapon.
    pub bonded_to: Option<PawnId>,
}

impl Weapon {
    /// Whether the weapon lies on a map and can be picked up.
    #[must_use]
    pub const fn is_spawned(&self) -> bool {
        matches!(self.state, WeaponState::OnGround { .. })
    }

    /// Whether the weapon has been destroyed.
    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        matches!(self.state, WeaponState::Destroyed)
    }

    /// Map and position if the weapon lies on the ground.
    #[must_use]
    pub const fn ground_position(&self) -> Option<(MapId, Vec2Fixed)> {
        match self.state {
            WeaponState::OnGround { map, position } => Some((map, position)),
            _ => None,
        }
    }

    /// Durability as a fraction in `0..=1`.
    #[must_use]
    pub fn condition(&self) -> Fixed {
        if self.max_hit_points == 0 {
            return Fixed::ZERO;
        }
        let hp = self.hit_points.min(self.max_hit_points);
        Fixed::from_num(hp) / Fixed::from_num(self.max_hit_points)
    }

    /// Whether `pawn` may use this weapon (persona bond check).
    #[must_use]
    pub fn usable_by(&self, pawn: PawnId) -> bool {
        self.bonded_to.map_or(true, |owner| owner == pawn)
    }
}

// ============================================================================
// Pawn Types
// ============================================================================

/// Combat skill levels, each `0..=20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Skills {
    /// Ranged proficiency.
    pub shooting: u8,
    /// Close-combat proficiency.
    pub melee: u8,
}

impl Skills {
    /// Create a skill set, clamping both levels to the valid range.
    #[must_use]
    pub fn new(shooting: u8, melee: u8) -> Self {
        Self {
            shooting: shooting.min(MAX_SKILL_LEVEL),
            melee: melee.min(MAX_SKILL_LEVEL),
        }
    }

    /// Skill level relevant to a weapon class.
    #[must_use]
    pub fn level_for(self, class: WeaponClass) -> u8 {
        match class {
            WeaponClass::Ranged => self.shooting,
            WeaponClass::Melee => self.melee,
        }
    }
}

/// Character traits that bias weapon preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Trait {
    /// Hates ranged weapons, fights better in melee.
    Brawler,
    /// Fires quickly and carelessly; still likes guns.
    TriggerHappy,
    /// Aims slowly and precisely; likes guns.
    CarefulShooter,
}

/// How a pawn belongs to the colony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Membership {
    /// Permanent colony member.
    #[default]
    Colonist,
    /// Temporary member (quest lodger, borrowed worker).
    Temporary,
    /// Guest, trader or prisoner; never automated.
    Visitor,
}

/// Capability and condition flags reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    /// Whether the pawn is capable of violence at all.
    pub violence_capable: bool,
    /// Under direct player control.
    pub drafted: bool,
    /// Incapacitated.
    pub downed: bool,
    /// In a mental break (berserk, wandering).
    pub mental_break: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            violence_capable: true,
            drafted: false,
            downed: false,
            mental_break: false,
        }
    }
}

/// What the pawn is currently doing, as far as the engine cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Activity {
    /// Nothing in particular.
    #[default]
    Idle,
    /// Doing other work that can be interrupted.
    Working,
    /// Already walking to equip a weapon.
    EquippingWeapon,
}

/// A pawn (colony character).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pawn {
    /// Unique id.
    pub id: PawnId,
    /// Display name.
    pub name: String,
    /// Map the pawn is on (`None` while travelling off-map).
    pub map: Option<MapId>,
    /// Tile position.
    pub position: Vec2Fixed,
    /// Combat skills.
    pub skills: Skills,
    /// Traits.
    pub traits: BTreeSet<Trait>,
    /// Biological age in years.
    pub age_years: u32,
    /// Colony membership.
    pub membership: Membership,
    /// Capability flags.
    pub capabilities: Capabilities,
    /// Currently equipped primary weapon.
    pub equipped: Option<WeaponId>,
    /// Current activity.
    pub activity: Activity,
}

impl Pawn {
    /// Create an adult colonist with default capabilities and no weapon.
    #[must_use]
    pub fn new(id: PawnId, name: impl Into<String>, map: MapId, position: Vec2Fixed) -> Self {
        Self {
            id,
            name: name.into(),
            map: Some(map),
            position,
            skills: Skills::default(),
            traits: BTreeSet::new(),
            age_years: 30,
            membership: Membership::Colonist,
            capabilities: Capabilities::default(),
            equipped: None,
            activity: Activity::Idle,
        }
    }

    /// Whether the pawn has a trait.
    #[must_use]
    pub fn has_trait(&self, t: Trait) -> bool {
        self.traits.contains(&t)
    }

    /// Whether the pawn is younger than [`ADULT_AGE`].
    #[must_use]
    pub const fn is_child(&self) -> bool {
        self.age_years < ADULT_AGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_multiplier_strictly_increasing() {
        for pair in Quality::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].multiplier() < pair[1].multiplier());
        }
    }

    #[test]
    fn test_condition_fraction() {
        let mut weapon = Weapon {
            id: WeaponId(1),
            def: WeaponDefId::new("pistol"),
            quality: Quality::Normal,
            hit_points: 50,
            max_hit_points: 100,
            state: WeaponState::Despawned,
            forbidden: false,
            bonded_to: None,
        };
        assert_eq!(weapon.condition(), Fixed::from_num(0.5));

        weapon.max_hit_points = 0;
        assert_eq!(weapon.condition(), Fixed::ZERO);
    }

    #[test]
    fn test_bonded_weapon_usable_only_by_owner() {
        let weapon = Weapon {
            id: WeaponId(1),
            def: WeaponDefId::new("persona_blade"),
            quality: Quality::Legendary,
            hit_points: 100,
            max_hit_points: 100,
            state: WeaponState::Despawned,
            forbidden: false,
            bonded_to: Some(PawnId(7)),
        };
        assert!(weapon.usable_by(PawnId(7)));
        assert!(!weapon.usable_by(PawnId(8)));
    }

    #[test]
    fn test_skills_clamped() {
        let skills = Skills::new(40, 3);
        assert_eq!(skills.level_for(WeaponClass::Ranged), MAX_SKILL_LEVEL);
        assert_eq!(skills.level_for(WeaponClass::Melee), 3);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(PawnId(3).to_string(), "pawn#3");
        assert_eq!(WeaponDefId::new("knife").to_string(), "knife");
    }
}
