//! Seams between the engine and the host simulation.
//!
//! The engine never owns pawns, weapons, outfits, reservations or raid
//! state. It reads them through the traits in this module:
//!
//! - [`WorldView`] - read-only access to pawns, weapons, definitions and outfits
//! - [`RaidGate`] - whether a large hostile incursion is active on a map
//! - [`ReservationManager`] - mutual exclusion over weapon claims
//!
//! [`ReservationTable`] is an in-memory [`ReservationManager`] suitable for
//! hosts that have no reservation system of their own.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::components::{MapId, Pawn, PawnId, Quality, Weapon, WeaponId, WeaponDefId};
use crate::data::WeaponDef;
use crate::math::{decimal_serde, Fixed};

/// Read-only view of the host world.
pub trait WorldView {
    /// Current simulation tick.
    fn current_tick(&self) -> u64;

    /// Look up a pawn.
    fn pawn(&self, id: PawnId) -> Option<&Pawn>;

    /// Look up a weapon. Destroyed weapons may be absent.
    fn weapon(&self, id: WeaponId) -> Option<&Weapon>;

    /// Look up a weapon definition.
    fn weapon_def(&self, id: &WeaponDefId) -> Option<&WeaponDef>;

    /// Outfit policy assigned to a pawn, if any. `None` allows everything.
    fn outfit(&self, pawn: PawnId) -> Option<&OutfitFilter>;

    /// Ids of all weapons lying on a map, in ascending order.
    fn spawned_weapons(&self, map: MapId) -> Vec<WeaponId>;

    /// All maps known to the host, in ascending order.
    fn maps(&self) -> Vec<MapId>;
}

/// Host condition that can globally suppress automatic equipping.
pub trait RaidGate {
    /// Whether a large hostile incursion is currently active on `map`.
    fn is_large_hostile_incursion_active(&self, map: MapId) -> bool;
}

/// Host-owned mutual exclusion over item claims.
///
/// At most one live reservation may exist per target. The engine calls
/// [`ReservationManager::reserve`] immediately before emitting a job.
pub trait ReservationManager {
    /// Whether `pawn` could reserve `target` right now.
    fn can_reserve(&self, pawn: PawnId, target: WeaponId) -> bool;

    /// Try to claim `target` for `pawn`. Returns `false` if another pawn
    /// holds it.
    fn reserve(&mut self, pawn: PawnId, target: WeaponId) -> bool;

    /// Release any claim on `target`.
    fn release(&mut self, target: WeaponId);

    /// Current claimant of `target`.
    fn reserved_by(&self, target: WeaponId) -> Option<PawnId>;
}

/// In-memory [`ReservationManager`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationTable {
    claims: HashMap<WeaponId, PawnId>,
}

impl ReservationTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Release every claim held by `pawn`.
    pub fn release_all_for(&mut self, pawn: PawnId) {
        self.claims.retain(|_, holder| *holder != pawn);
    }

    /// Number of live claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Whether there are no claims.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

impl ReservationManager for ReservationTable {
    fn can_reserve(&self, pawn: PawnId, target: WeaponId) -> bool {
        self.claims
            .get(&target)
            .map_or(true, |holder| *holder == pawn)
    }

    fn reserve(&mut self, pawn: PawnId, target: WeaponId) -> bool {
        match self.claims.get(&target) {
            Some(holder) => *holder == pawn,
            None => {
                self.claims.insert(target, pawn);
                true
            }
        }
    }

    fn release(&mut self, target: WeaponId) {
        self.claims.remove(&target);
    }

    fn reserved_by(&self, target: WeaponId) -> Option<PawnId> {
        self.claims.get(&target).copied()
    }
}

/// Inclusive quality range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityRange {
    /// Lowest allowed tier.
    pub min: Quality,
    /// Highest allowed tier.
    pub max: Quality,
}

impl QualityRange {
    /// Every tier.
    pub const ANY: Self = Self {
        min: Quality::Awful,
        max: Quality::Legendary,
    };

    /// Whether `quality` lies inside the range (both bounds inclusive).
    #[must_use]
    pub fn contains(self, quality: Quality) -> bool {
        quality >= self.min && quality <= self.max
    }
}

impl Default for QualityRange {
    fn default() -> Self {
        Self::ANY
    }
}

/// Per-pawn outfit policy deciding which weapons a pawn may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutfitFilter {
    /// Allowed quality tiers.
    pub quality: QualityRange,
    /// Lowest allowed durability fraction (inclusive).
    #[serde(with = "decimal_serde")]
    pub min_hit_points: Fixed,
    /// Highest allowed durability fraction (inclusive).
    #[serde(with = "decimal_serde")]
    pub max_hit_points: Fixed,
    /// Allowed categories; `None` allows all.
    pub allowed_categories: Option<BTreeSet<String>>,
}

impl Default for OutfitFilter {
    fn default() -> Self {
        Self {
            quality: QualityRange::ANY,
            min_hit_points: Fixed::ZERO,
            max_hit_points: Fixed::ONE,
            allowed_categories: None,
        }
    }
}

impl OutfitFilter {
    /// A filter that allows every weapon.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Restrict to the given quality range.
    #[must_use]
    pub fn with_quality(mut self, min: Quality, max: Quality) -> Self {
        self.quality = QualityRange { min, max };
        self
    }

    /// Restrict to the given durability fraction range.
    #[must_use]
    pub fn with_hit_points(mut self, min: Fixed, max: Fixed) -> Self {
        self.min_hit_points = min;
        self.max_hit_points = max;
        self
    }

    /// Restrict to the given categories.
    #[must_use]
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    /// Whether this policy allows `weapon` of definition `def`.
    #[must_use]
    pub fn allows(&self, weapon: &Weapon, def: &WeaponDef) -> bool {
        if !self.quality.contains(weapon.quality) {
            return false;
        }
        let condition = weapon.condition();
        if condition < self.min_hit_points || condition > self.max_hit_points {
            return false;
        }
        self.allowed_categories
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&def.category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{WeaponClass, WeaponState};
    use crate::math::ratio;

    fn weapon(quality: Quality, hit_points: u32) -> Weapon {
        Weapon {
            id: WeaponId(1),
            def: WeaponDefId::new("pistol"),
            quality,
            hit_points,
            max_hit_points: 100,
            state: WeaponState::Despawned,
            forbidden: false,
            bonded_to: None,
        }
    }

    fn pistol_def() -> WeaponDef {
        WeaponDef::new("pistol", WeaponClass::Ranged, Fixed::from_num(10), "guns")
    }

    #[test]
    fn test_reservation_is_exclusive() {
        let mut table = ReservationTable::new();
        let target = WeaponId(5);

        assert!(table.reserve(PawnId(1), target));
        assert!(!table.can_reserve(PawnId(2), target));
        assert!(!table.reserve(PawnId(2), target));
        assert_eq!(table.reserved_by(target), Some(PawnId(1)));

        // Re-reserving by the holder is fine.
        assert!(table.reserve(PawnId(1), target));

        table.release(target);
        assert!(table.reserve(PawnId(2), target));
    }

    #[test]
    fn test_release_all_for_pawn() {
        let mut table = ReservationTable::new();
        table.reserve(PawnId(1), WeaponId(1));
        table.reserve(PawnId(1), WeaponId(2));
        table.reserve(PawnId(2), WeaponId(3));

        table.release_all_for(PawnId(1));
        assert_eq!(table.len(), 1);
        assert_eq!(table.reserved_by(WeaponId(3)), Some(PawnId(2)));
    }

    #[test]
    fn test_outfit_quality_bounds_inclusive() {
        let filter = OutfitFilter::allow_all().with_quality(Quality::Normal, Quality::Excellent);
        let def = pistol_def();
        assert!(!filter.allows(&weapon(Quality::Poor, 100), &def));
        assert!(filter.allows(&weapon(Quality::Normal, 100), &def));
        assert!(filter.allows(&weapon(Quality::Excellent, 100), &def));
        assert!(!filter.allows(&weapon(Quality::Masterwork, 100), &def));
    }

    #[test]
    fn test_outfit_hit_point_bounds_inclusive() {
        let filter = OutfitFilter::allow_all().with_hit_points(ratio(1, 2), Fixed::ONE);
        let def = pistol_def();
        assert!(filter.allows(&weapon(Quality::Normal, 50), &def));
        assert!(!filter.allows(&weapon(Quality::Normal, 49), &def));
        assert!(filter.allows(&weapon(Quality::Normal, 100), &def));
    }

    #[test]
    fn test_outfit_categories() {
        let filter = OutfitFilter::allow_all().with_categories(["blades"]);
        assert!(!filter.allows(&weapon(Quality::Normal, 100), &pistol_def()));

        let knife = WeaponDef::new("knife", WeaponClass::Melee, Fixed::from_num(7), "blades");
        assert!(filter.allows(&weapon(Quality::Normal, 100), &knife));
    }
}
