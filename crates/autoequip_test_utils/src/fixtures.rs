//! Test fixtures and helpers.
//!
//! Pre-built colonies, pawns and weapon layouts for consistent testing.
//! All helpers panic on setup errors; they are for tests only.

use autoequip_core::colony::Colony;
use autoequip_core::components::{MapId, PawnId, Quality, Skills, Trait, WeaponDefId, WeaponId};
use autoequip_core::config::EngineConfig;
use autoequip_core::math::{Fixed, Vec2Fixed};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: engine code never uses floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> Fixed {
    Fixed::from_num(n)
}

/// Tile position.
#[must_use]
pub fn tile(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_tiles(x, y)
}

/// Definition id shorthand.
#[must_use]
pub fn def(id: &str) -> WeaponDefId {
    WeaponDefId::new(id)
}

/// Default config, but evaluating every tick and cleaning up often.
#[must_use]
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        think_interval_ticks: 1,
        maintenance_interval_ticks: 10,
        ..EngineConfig::default()
    }
}

/// A colony with the standard definitions and one map.
#[must_use]
pub fn standard_colony() -> (Colony, MapId) {
    let mut colony = Colony::with_standard_defs();
    let map = colony.add_map();
    (colony, map)
}

/// An adult colonist with the given skills.
///
/// # Panics
///
/// Panics if the pawn cannot be found after spawning.
pub fn colonist(colony: &mut Colony, map: MapId, at: (i32, i32), skills: Skills) -> PawnId {
    let id = colony.spawn_colonist("Colonist", map, tile(at.0, at.1));
    colony
        .pawn_mut(id)
        .expect("pawn just spawned")
        .skills = skills;
    id
}

/// A colonist who shoots well and fights poorly.
pub fn shooter(colony: &mut Colony, map: MapId, at: (i32, i32)) -> PawnId {
    colonist(colony, map, at, Skills::new(15, 2))
}

/// A colonist who fights well and shoots poorly.
pub fn fighter(colony: &mut Colony, map: MapId, at: (i32, i32)) -> PawnId {
    colonist(colony, map, at, Skills::new(2, 15))
}

/// A brawler: melee-skilled with the trait that penalizes guns.
///
/// # Panics
///
/// Panics if the pawn cannot be found after spawning.
pub fn brawler(colony: &mut Colony, map: MapId, at: (i32, i32)) -> PawnId {
    let id = fighter(colony, map, at);
    colony
        .pawn_mut(id)
        .expect("pawn just spawned")
        .traits
        .insert(Trait::Brawler);
    id
}

/// Spawn a weapon on the ground.
///
/// # Panics
///
/// Panics on an unknown definition or map.
pub fn ground_weapon(
    colony: &mut Colony,
    map: MapId,
    id: &str,
    quality: Quality,
    at: (i32, i32),
) -> WeaponId {
    colony
        .spawn_weapon(&def(id), quality, map, tile(at.0, at.1))
        .expect("weapon spawn")
}

/// Put a new weapon in a pawn's hands.
///
/// # Panics
///
/// Panics on an unknown definition, pawn, or if the pawn is already armed.
pub fn arm(colony: &mut Colony, pawn: PawnId, id: &str, quality: Quality) -> WeaponId {
    colony
        .give_weapon(pawn, &def(id), quality)
        .expect("weapon given")
}

/// A busier colony: four shooters in a row and a spread of weapons.
#[must_use]
pub fn skirmish_colony() -> (Colony, MapId) {
    let (mut colony, map) = standard_colony();
    for i in 0..4 {
        shooter(&mut colony, map, (i * 5, 0));
    }
    let layout = [
        ("pistol", Quality::Poor, (3, 3)),
        ("revolver", Quality::Normal, (8, -2)),
        ("assault_rifle", Quality::Good, (12, 6)),
        ("sniper_rifle", Quality::Excellent, (30, 30)),
        ("knife", Quality::Masterwork, (1, -4)),
        ("longsword", Quality::Normal, (18, 1)),
        ("mace", Quality::Awful, (-6, 2)),
    ];
    for (id, quality, at) in layout {
        ground_weapon(&mut colony, map, id, quality, at);
    }
    (colony, map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoequip_core::host::WorldView;

    #[test]
    fn test_skirmish_colony_shape() {
        let (colony, map) = skirmish_colony();
        assert_eq!(colony.pawn_count(), 4);
        assert_eq!(colony.spawned_weapons(map).len(), 7);
    }

    #[test]
    fn test_arm_equips() {
        let (mut colony, map) = standard_colony();
        let pawn = shooter(&mut colony, map, (0, 0));
        let weapon = arm(&mut colony, pawn, "pistol", Quality::Normal);
        assert_eq!(colony.pawn_equipped(pawn), Some(weapon));
    }

    #[test]
    fn test_brawler_has_trait() {
        let (mut colony, map) = standard_colony();
        let pawn = brawler(&mut colony, map, (0, 0));
        assert!(colony.pawn(pawn).unwrap().has_trait(Trait::Brawler));
    }
}
