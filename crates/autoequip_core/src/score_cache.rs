//! Memoized (pawn, weapon) scores.
//!
//! Each entry stores a fingerprint of every scoring input (pawn skills and
//! traits, weapon quality, durability, bond and definition). A lookup whose
//! fingerprint no longer matches recomputes, so skill gains or weapon damage
//! never serve a stale score. Explicit hooks drop entries for removed pawns
//! and weapons so nothing outlives its subject.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::components::{Pawn, PawnId, Weapon, WeaponId};
use crate::data::WeaponDef;
use crate::host::WorldView;
use crate::math::Fixed;
use crate::scoring;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CachedScore {
    fingerprint: u64,
    score: Fixed,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreCacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that had to compute.
    pub misses: u64,
}

/// Cache of computed scores keyed by (pawn, weapon).
#[derive(Debug, Clone, Default)]
pub struct ScoreCache {
    entries: HashMap<(PawnId, WeaponId), CachedScore>,
    stats: ScoreCacheStats,
}

fn fingerprint(pawn: &Pawn, weapon: &Weapon, def: &WeaponDef) -> u64 {
    let mut hasher = DefaultHasher::new();
    pawn.skills.hash(&mut hasher);
    pawn.traits.hash(&mut hasher);
    weapon.def.hash(&mut hasher);
    weapon.quality.hash(&mut hasher);
    weapon.hit_points.hash(&mut hasher);
    weapon.max_hit_points.hash(&mut hasher);
    weapon.bonded_to.hash(&mut hasher);
    def.class.hash(&mut hasher);
    def.base_power.to_bits().hash(&mut hasher);
    hasher.finish()
}

impl ScoreCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Score `weapon` for `pawn`, using the cached value when inputs are
    /// unchanged. Returns zero when either side is missing.
    pub fn score<W: WorldView + ?Sized>(
        &mut self,
        world: &W,
        pawn: PawnId,
        weapon: WeaponId,
    ) -> Fixed {
        let key = (pawn, weapon);
        let (Some(p), Some(w)) = (world.pawn(pawn), world.weapon(weapon)) else {
            self.entries.remove(&key);
            return Fixed::ZERO;
        };
        let Some(def) = world.weapon_def(&w.def) else {
            self.entries.remove(&key);
            return Fixed::ZERO;
        };

        let print = fingerprint(p, w, def);
        if let Some(cached) = self.entries.get(&key) {
            if cached.fingerprint == print {
                self.stats.hits += 1;
                return cached.score;
            }
        }

        self.stats.misses += 1;
        let value = scoring::score(Some(p), Some(w), Some(def));
        self.entries.insert(
            key,
            CachedScore {
                fingerprint: print,
                score: value,
            },
        );
        value
    }

    /// Drop every entry for a pawn (removed, or skills/traits changed).
    pub fn on_pawn_removed(&mut self, pawn: PawnId) {
        self.entries.retain(|(p, _), _| *p != pawn);
    }

    /// Drop every entry for a weapon.
    pub fn on_weapon_removed(&mut self, weapon: WeaponId) {
        self.entries.retain(|(_, w), _| *w != weapon);
    }

    /// Remove entries whose pawn or weapon no longer exists or is destroyed.
    /// Returns the number removed.
    pub fn prune<W: WorldView + ?Sized>(&mut self, world: &W) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(pawn, weapon), _| Self::subjects_alive(world, *pawn, *weapon));
        before - self.entries.len()
    }

    fn subjects_alive<W: WorldView + ?Sized>(world: &W, pawn: PawnId, weapon: WeaponId) -> bool {
        world.pawn(pawn).is_some() && world.weapon(weapon).is_some_and(|w| !w.is_destroyed())
    }

    /// Whether any entry references a vanished pawn or destroyed weapon.
    #[must_use]
    pub fn contains_destroyed_entries<W: WorldView + ?Sized>(&self, world: &W) -> bool {
        self.entries
            .keys()
            .any(|(pawn, weapon)| !Self::subjects_alive(world, *pawn, *weapon))
    }

    /// Number of cached entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Hit/miss counters.
    #[must_use]
    pub const fn stats(&self) -> ScoreCacheStats {
        self.stats
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colony::Colony;
    use crate::components::{Quality, Skills, WeaponDefId};
    use crate::math::Vec2Fixed;

    fn setup() -> (Colony, PawnId, WeaponId) {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        let pawn = colony.spawn_colonist("Ada", map, Vec2Fixed::ZERO);
        let weapon = colony
            .spawn_weapon(
                &WeaponDefId::new("assault_rifle"),
                Quality::Normal,
                map,
                Vec2Fixed::from_tiles(2, 0),
            )
            .unwrap();
        (colony, pawn, weapon)
    }

    #[test]
    fn test_second_lookup_hits() {
        let (colony, pawn, weapon) = setup();
        let mut cache = ScoreCache::new();

        let first = cache.score(&colony, pawn, weapon);
        let second = cache.score(&colony, pawn, weapon);
        assert_eq!(first, second);
        assert_eq!(cache.stats(), ScoreCacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_skill_change_recomputes() {
        let (mut colony, pawn, weapon) = setup();
        let mut cache = ScoreCache::new();

        let before = cache.score(&colony, pawn, weapon);
        colony.pawn_mut(pawn).unwrap().skills = Skills::new(20, 0);
        let after = cache.score(&colony, pawn, weapon);

        assert!(after > before);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_damage_recomputes() {
        let (mut colony, pawn, weapon) = setup();
        let mut cache = ScoreCache::new();

        let before = cache.score(&colony, pawn, weapon);
        colony.damage_weapon(weapon, 60).unwrap();
        assert!(cache.score(&colony, pawn, weapon) < before);
    }

    #[test]
    fn test_missing_subjects_score_zero_and_leave_no_entry() {
        let (mut colony, pawn, weapon) = setup();
        let mut cache = ScoreCache::new();
        cache.score(&colony, pawn, weapon);
        assert_eq!(cache.size(), 1);

        colony.destroy_weapon(weapon).unwrap();
        assert!(cache.contains_destroyed_entries(&colony));
        assert_eq!(cache.score(&colony, pawn, weapon), Fixed::ZERO);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_prune_and_hooks() {
        let (mut colony, pawn, weapon) = setup();
        let mut cache = ScoreCache::new();
        cache.score(&colony, pawn, weapon);

        colony.remove_pawn(pawn).unwrap();
        assert_eq!(cache.prune(&colony), 1);
        assert!(!cache.contains_destroyed_entries(&colony));

        let (colony, pawn, weapon) = setup();
        cache.score(&colony, pawn, weapon);
        cache.on_weapon_removed(weapon);
        assert_eq!(cache.size(), 0);
        cache.score(&colony, pawn, weapon);
        cache.on_pawn_removed(pawn);
        assert_eq!(cache.size(), 0);
    }
}
