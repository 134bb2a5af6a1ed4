//! Spatial index of weapons lying on each map.
//!
//! Space is partitioned into square cells of [`CELL_SIZE`] tiles. A
//! near-query only touches cells intersecting the bounding square of the
//! search circle, then does an exact distance check per weapon.
//!
//! The cache tolerates drift from the host: every query re-checks each
//! weapon against the [`WorldView`], never returns a weapon that is no
//! longer on the ground, and prunes or relocates stale entries it meets.
//! [`WeaponCache::invalidate`] rebuilds a map from scratch. A map is built
//! on its first query; incremental adds before that never stand in for the
//! rebuild.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::components::{MapId, Weapon, WeaponId};
use crate::host::WorldView;
use crate::math::{Fixed, Vec2Fixed};

/// Side length of one grid cell, in tiles.
pub const CELL_SIZE: i32 = 10;

/// Integer grid cell coordinate.
pub type CellCoord = (i32, i32);

/// Convert a world position to the cell containing it.
#[must_use]
pub fn cell_of(position: Vec2Fixed) -> CellCoord {
    let size = Fixed::from_num(CELL_SIZE);
    (
        (position.x / size).floor().to_num::<i32>(),
        (position.y / size).floor().to_num::<i32>(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexedWeapon {
    cell: CellCoord,
    position: Vec2Fixed,
}

#[derive(Debug, Clone, Default)]
struct MapIndex {
    cells: HashMap<CellCoord, BTreeSet<WeaponId>>,
    entries: HashMap<WeaponId, IndexedWeapon>,
}

impl MapIndex {
    fn insert(&mut self, id: WeaponId, position: Vec2Fixed) {
        self.remove(id);
        let cell = cell_of(position);
        self.cells.entry(cell).or_default().insert(id);
        self.entries.insert(id, IndexedWeapon { cell, position });
    }

    fn remove(&mut self, id: WeaponId) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };
        if let Some(bucket) = self.cells.get_mut(&entry.cell) {
            bucket.remove(&id);
            if bucket.is_empty() {
                self.cells.remove(&entry.cell);
            }
        }
        true
    }

    /// Cells to visit for a query, in deterministic order.
    fn cells_for(&self, point: Vec2Fixed, radius: Fixed) -> Vec<CellCoord> {
        let offset = Vec2Fixed::new(radius, radius);
        let (min_x, min_y) = cell_of(point.saturating_sub(offset));
        let (max_x, max_y) = cell_of(point.saturating_add(offset));
        let span = i64::from(max_x - min_x + 1) * i64::from(max_y - min_y + 1);

        let mut cells: Vec<CellCoord> = if span > self.cells.len() as i64 {
            // Huge radius: walking occupied cells is cheaper than the square.
            self.cells
                .keys()
                .copied()
                .filter(|&(x, y)| x >= min_x && x <= max_x && y >= min_y && y <= max_y)
                .collect()
        } else {
            (min_x..=max_x)
                .flat_map(|x| (min_y..=max_y).map(move |y| (x, y)))
                .filter(|cell| self.cells.contains_key(cell))
                .collect()
        };
        cells.sort_unstable();
        cells
    }
}

/// Per-map spatial index over ground weapons.
#[derive(Debug, Clone, Default)]
pub struct WeaponCache {
    maps: BTreeMap<MapId, MapIndex>,
    locations: HashMap<WeaponId, MapId>,
    /// Maps rebuilt from the host at least once.
    built: BTreeSet<MapId>,
}

impl WeaponCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell size used by the grid, in tiles.
    #[must_use]
    pub const fn cell_size(&self) -> i32 {
        CELL_SIZE
    }

    /// Index a weapon if it lies on the ground. Returns whether it was indexed.
    ///
    /// Re-adding an indexed weapon moves it to its current position.
    pub fn add_weapon(&mut self, weapon: &Weapon) -> bool {
        let Some((map, position)) = weapon.ground_position() else {
            self.remove_weapon(weapon.id);
            return false;
        };
        if let Some(previous) = self.locations.get(&weapon.id).copied() {
            if previous != map {
                self.remove_weapon(weapon.id);
            }
        }
        self.maps.entry(map).or_default().insert(weapon.id, position);
        self.locations.insert(weapon.id, map);
        true
    }

    /// Drop a weapon from the index. Returns whether it was indexed.
    pub fn remove_weapon(&mut self, id: WeaponId) -> bool {
        let Some(map) = self.locations.remove(&id) else {
            return false;
        };
        self.maps
            .get_mut(&map)
            .is_some_and(|index| index.remove(id))
    }

    /// Rebuild a map's index from the host's ground truth.
    ///
    /// Idempotent: produces the same membership as adding every spawned
    /// weapon one at a time.
    pub fn invalidate<W: WorldView + ?Sized>(&mut self, map: MapId, world: &W) {
        if let Some(old) = self.maps.remove(&map) {
            for id in old.entries.keys() {
                self.locations.remove(id);
            }
        }
        self.maps.insert(map, MapIndex::default());
        self.built.insert(map);
        for id in world.spawned_weapons(map) {
            if let Some(weapon) = world.weapon(id) {
                if weapon.ground_position().is_some_and(|(m, _)| m == map) {
                    self.add_weapon(weapon);
                }
            }
        }
        tracing::debug!(
            map = %map,
            weapons = self.map_size(map),
            "Weapon cache rebuilt"
        );
    }

    /// Rebuild every map the host knows about and forget the rest.
    pub fn invalidate_all<W: WorldView + ?Sized>(&mut self, world: &W) {
        self.clear();
        for map in world.maps() {
            self.invalidate(map, world);
        }
    }

    /// Weapons on `map` within `radius` of `point`, in ascending id order.
    ///
    /// Builds the map from `world` first if it has never been built. Each hit is re-validated against `world`. Entries whose weapon is
    /// gone or no longer on this map are pruned; entries whose weapon moved
    /// are re-indexed at the new position.
    pub fn weapons_near<W: WorldView + ?Sized>(
        &mut self,
        map: MapId,
        point: Vec2Fixed,
        radius: Fixed,
        world: &W,
    ) -> Vec<WeaponId> {
        if !self.is_built(map) {
            self.invalidate(map, world);
        }
        let Some(index) = self.maps.get(&map) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        let mut stale = Vec::new();
        let mut moved = Vec::new();

        for cell in index.cells_for(point, radius) {
            let Some(bucket) = index.cells.get(&cell) else {
                continue;
            };
            for &id in bucket {
                let ground = world.weapon(id).and_then(Weapon::ground_position);
                match ground {
                    Some((weapon_map, position)) if weapon_map == map => {
                        if index.entries.get(&id).map(|e| e.position) != Some(position) {
                            moved.push((id, position));
                        }
                        if point.within_radius(position, radius) {
                            found.push(id);
                        }
                    }
                    _ => stale.push(id),
                }
            }
        }

        if !stale.is_empty() {
            tracing::trace!(map = %map, count = stale.len(), "Pruning stale weapon cache entries");
        }
        for id in stale {
            self.remove_weapon(id);
        }
        if let Some(index) = self.maps.get_mut(&map) {
            for (id, position) in moved {
                index.insert(id, position);
            }
        }

        found.sort_unstable();
        found
    }

    /// Brute-force reference query over the host's ground truth.
    #[must_use]
    pub fn linear_scan<W: WorldView + ?Sized>(
        map: MapId,
        point: Vec2Fixed,
        radius: Fixed,
        world: &W,
    ) -> Vec<WeaponId> {
        let mut found: Vec<WeaponId> = world
            .spawned_weapons(map)
            .into_iter()
            .filter(|&id| {
                world
                    .weapon(id)
                    .and_then(Weapon::ground_position)
                    .is_some_and(|(m, position)| m == map && point.within_radius(position, radius))
            })
            .collect();
        found.sort_unstable();
        found
    }

    /// Remove every entry whose weapon is no longer on the ground.
    /// Returns the number of entries removed.
    pub fn prune<W: WorldView + ?Sized>(&mut self, world: &W) -> usize {
        let dead: Vec<WeaponId> = self
            .locations
            .iter()
            .filter(|(id, map)| !Self::entry_is_live(**id, **map, world))
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            self.remove_weapon(*id);
        }
        dead.len()
    }

    fn entry_is_live<W: WorldView + ?Sized>(id: WeaponId, map: MapId, world: &W) -> bool {
        world
            .weapon(id)
            .and_then(Weapon::ground_position)
            .is_some_and(|(m, _)| m == map)
    }

    /// Whether any entry refers to a destroyed or vanished weapon.
    #[must_use]
    pub fn contains_destroyed_entries<W: WorldView + ?Sized>(&self, world: &W) -> bool {
        self.locations
            .keys()
            .any(|id| world.weapon(*id).map_or(true, Weapon::is_destroyed))
    }

    /// Whether `map` has been rebuilt from the host. Incremental adds alone
    /// do not count.
    #[must_use]
    pub fn is_built(&self, map: MapId) -> bool {
        self.built.contains(&map)
    }

    /// Whether a weapon is indexed.
    #[must_use]
    pub fn contains(&self, id: WeaponId) -> bool {
        self.locations.contains_key(&id)
    }

    /// Total number of indexed weapons.
    #[must_use]
    pub fn size(&self) -> usize {
        self.locations.len()
    }

    /// Number of indexed weapons on one map.
    #[must_use]
    pub fn map_size(&self, map: MapId) -> usize {
        self.maps.get(&map).map_or(0, |index| index.entries.len())
    }

    /// Number of occupied cells on one map.
    #[must_use]
    pub fn occupied_cells(&self, map: MapId) -> usize {
        self.maps.get(&map).map_or(0, |index| index.cells.len())
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.maps.clear();
        self.locations.clear();
        self.built.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colony::Colony;
    use crate::components::{Quality, WeaponDefId};

    fn colony_with_weapons(positions: &[(i32, i32)]) -> (Colony, MapId, Vec<WeaponId>) {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        let ids = positions
            .iter()
            .map(|&(x, y)| {
                colony
                    .spawn_weapon(
                        &WeaponDefId::new("pistol"),
                        Quality::Normal,
                        map,
                        Vec2Fixed::from_tiles(x, y),
                    )
                    .unwrap()
            })
            .collect();
        (colony, map, ids)
    }

    fn cache_for(colony: &Colony, map: MapId) -> WeaponCache {
        let mut cache = WeaponCache::new();
        cache.invalidate(map, colony);
        cache
    }

    #[test]
    fn test_cell_size() {
        assert_eq!(WeaponCache::new().cell_size(), 10);
        assert_eq!(cell_of(Vec2Fixed::from_tiles(9, 10)), (0, 1));
        assert_eq!(cell_of(Vec2Fixed::from_tiles(-1, -10)), (-1, -1));
        assert_eq!(cell_of(Vec2Fixed::from_tiles(-11, 0)), (-2, 0));
    }

    #[test]
    fn test_weapons_near_matches_linear_scan() {
        let (colony, map, _) =
            colony_with_weapons(&[(0, 0), (5, 5), (12, 3), (30, 30), (-8, 2), (49, 0)]);
        let mut cache = cache_for(&colony, map);

        for (point, radius) in [
            (Vec2Fixed::ZERO, 10),
            (Vec2Fixed::from_tiles(10, 10), 25),
            (Vec2Fixed::from_tiles(40, 0), 9),
            (Vec2Fixed::ZERO, 500),
        ] {
            let radius = Fixed::from_num(radius);
            assert_eq!(
                cache.weapons_near(map, point, radius, &colony),
                WeaponCache::linear_scan(map, point, radius, &colony)
            );
        }
    }

    #[test]
    fn test_query_touches_only_nearby_cells() {
        let (colony, map, _) = colony_with_weapons(&[(0, 0), (100, 100), (200, 200)]);
        let cache = cache_for(&colony, map);
        let index = &cache.maps[&map];
        let cells = index.cells_for(Vec2Fixed::ZERO, Fixed::from_num(5));
        assert_eq!(cells, vec![(0, 0)]);
    }

    #[test]
    fn test_destroyed_weapon_never_returned() {
        let (mut colony, map, ids) = colony_with_weapons(&[(1, 1), (2, 2)]);
        let mut cache = cache_for(&colony, map);

        // Destroy behind the cache's back.
        colony.destroy_weapon(ids[0]).unwrap();
        assert!(cache.contains_destroyed_entries(&colony));

        let near = cache.weapons_near(map, Vec2Fixed::ZERO, Fixed::from_num(10), &colony);
        assert_eq!(near, vec![ids[1]]);
        // The query pruned the stale entry.
        assert!(!cache.contains(ids[0]));
        assert!(!cache.contains_destroyed_entries(&colony));
    }

    #[test]
    fn test_moved_weapon_is_reindexed() {
        let (mut colony, map, ids) = colony_with_weapons(&[(1, 1)]);
        let mut cache = cache_for(&colony, map);

        colony
            .move_weapon(ids[0], Vec2Fixed::from_tiles(3, 1))
            .unwrap();
        let near = cache.weapons_near(map, Vec2Fixed::ZERO, Fixed::from_num(5), &colony);
        assert_eq!(near, vec![ids[0]]);

        // Moved far away: still in a visited cell this time, excluded by distance.
        colony
            .move_weapon(ids[0], Vec2Fixed::from_tiles(9, 9))
            .unwrap();
        let near = cache.weapons_near(map, Vec2Fixed::ZERO, Fixed::from_num(5), &colony);
        assert!(near.is_empty());
        assert_eq!(cache.maps[&map].entries[&ids[0]].position, Vec2Fixed::from_tiles(9, 9));
    }

    #[test]
    fn test_invalidate_is_idempotent_and_matches_incremental() {
        let (colony, map, ids) = colony_with_weapons(&[(0, 0), (15, 15), (-20, 4)]);

        let mut incremental = WeaponCache::new();
        for id in &ids {
            incremental.add_weapon(colony.weapon(*id).unwrap());
        }

        let mut rebuilt = cache_for(&colony, map);
        rebuilt.invalidate(map, &colony);

        assert_eq!(rebuilt.size(), incremental.size());
        assert_eq!(rebuilt.occupied_cells(map), incremental.occupied_cells(map));
        for id in &ids {
            assert!(rebuilt.contains(*id));
        }
    }

    #[test]
    fn test_first_query_builds_despite_earlier_add() {
        let (mut colony, map, ids) = colony_with_weapons(&[(2, 0), (4, 0)]);
        let late = colony
            .spawn_weapon(
                &WeaponDefId::new("knife"),
                Quality::Awful,
                map,
                Vec2Fixed::from_tiles(6, 0),
            )
            .unwrap();

        let mut cache = WeaponCache::new();
        cache.add_weapon(colony.weapon(late).unwrap());
        assert!(!cache.is_built(map));

        let near = cache.weapons_near(map, Vec2Fixed::ZERO, Fixed::from_num(10), &colony);
        assert_eq!(near, vec![ids[0], ids[1], late]);
        assert!(cache.is_built(map));
        assert_eq!(cache.size(), 3);
    }

    #[test]
    fn test_huge_radius_near_range_limit() {
        let (colony, map, ids) = colony_with_weapons(&[(500_000_000, 0), (-1_000_000_000, 7)]);
        let mut cache = cache_for(&colony, map);
        let point = Vec2Fixed::from_tiles(500_000_000, 0);
        let radius = Fixed::from_num(2_000_000_000);

        let near = cache.weapons_near(map, point, radius, &colony);
        assert_eq!(near, WeaponCache::linear_scan(map, point, radius, &colony));
        assert!(near.contains(&ids[0]));
    }

    #[test]
    fn test_add_remove() {
        let (colony, map, ids) = colony_with_weapons(&[(0, 0)]);
        let mut cache = WeaponCache::new();
        assert!(cache.add_weapon(colony.weapon(ids[0]).unwrap()));
        assert_eq!(cache.map_size(map), 1);
        assert!(cache.remove_weapon(ids[0]));
        assert!(!cache.remove_weapon(ids[0]));
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.occupied_cells(map), 0);
    }

    #[test]
    fn test_prune_removes_non_ground_weapons() {
        let (mut colony, map, ids) = colony_with_weapons(&[(0, 0), (1, 0), (2, 0)]);
        let mut cache = cache_for(&colony, map);

        colony.despawn_weapon(ids[0]).unwrap();
        colony.store_weapon(ids[1], 99).unwrap();

        assert_eq!(cache.prune(&colony), 2);
        assert_eq!(cache.size(), 1);
        assert!(cache.contains(ids[2]));
    }
}
