//! In-memory reference host.
//!
//! [`Colony`] owns pawns, weapons, outfits and raid state and implements
//! [`WorldView`] and [`RaidGate`] for the engine. It is what the headless
//! runner, the tick driver and the tests use; a real game would implement
//! the traits over its own world instead.

use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::components::{
    MapId, Pawn, PawnId, Quality, Weapon, WeaponDefId, WeaponId, WeaponState,
};
use crate::data::{WeaponDef, WeaponDefRegistry};
use crate::error::{EngineError, Result};
use crate::host::{OutfitFilter, RaidGate, WorldView};
use crate::math::Vec2Fixed;

/// Reference host world.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Colony {
    tick: u64,
    defs: WeaponDefRegistry,
    maps: BTreeSet<MapId>,
    pawns: HashMap<PawnId, Pawn>,
    weapons: HashMap<WeaponId, Weapon>,
    outfits: HashMap<PawnId, OutfitFilter>,
    raids: BTreeSet<MapId>,
    next_map_id: u64,
    next_pawn_id: u64,
    next_weapon_id: u64,
}

impl Colony {
    /// Create an empty colony using the given definitions.
    #[must_use]
    pub fn new(defs: WeaponDefRegistry) -> Self {
        Self {
            defs,
            next_map_id: 1,
            next_pawn_id: 1,
            next_weapon_id: 1,
            ..Self::default()
        }
    }

    /// Create an empty colony with [`WeaponDefRegistry::standard`].
    #[must_use]
    pub fn with_standard_defs() -> Self {
        Self::new(WeaponDefRegistry::standard())
    }

    /// Weapon definitions.
    #[must_use]
    pub const fn defs(&self) -> &WeaponDefRegistry {
        &self.defs
    }

    /// Advance the clock by one tick and return the new tick.
    pub fn advance_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Add an empty map.
    pub fn add_map(&mut self) -> MapId {
        let id = MapId(self.next_map_id);
        self.next_map_id += 1;
        self.maps.insert(id);
        id
    }

    fn require_map(&self, map: MapId) -> Result<()> {
        if self.maps.contains(&map) {
            Ok(())
        } else {
            Err(EngineError::MapNotFound(map))
        }
    }

    // ------------------------------------------------------------------
    // Pawns
    // ------------------------------------------------------------------

    /// Add a pawn, assigning it a fresh id. Any id on `pawn` is replaced.
    pub fn add_pawn(&mut self, mut pawn: Pawn) -> Result<PawnId> {
        if let Some(map) = pawn.map {
            self.require_map(map)?;
        }
        let id = PawnId(self.next_pawn_id);
        self.next_pawn_id += 1;
        pawn.id = id;
        pawn.equipped = None;
        self.pawns.insert(id, pawn);
        Ok(id)
    }

    /// Add an adult colonist with default skills. An unknown map is
    /// registered on the fly.
    pub fn spawn_colonist(&mut self, name: &str, map: MapId, position: Vec2Fixed) -> PawnId {
        if self.maps.insert(map) {
            self.next_map_id = self.next_map_id.max(map.0 + 1);
        }
        let id = PawnId(self.next_pawn_id);
        self.next_pawn_id += 1;
        self.pawns.insert(id, Pawn::new(id, name, map, position));
        id
    }

    /// Mutable access to a pawn.
    pub fn pawn_mut(&mut self, id: PawnId) -> Option<&mut Pawn> {
        self.pawns.get_mut(&id)
    }

    /// Remove a pawn from the world. Its equipped weapon leaves with it.
    pub fn remove_pawn(&mut self, id: PawnId) -> Result<Pawn> {
        let pawn = self.pawns.remove(&id).ok_or(EngineError::PawnNotFound(id))?;
        for weapon in self.weapons.values_mut() {
            if matches!(
                weapon.state,
                WeaponState::Equipped { pawn: p } | WeaponState::Carried { pawn: p } if p == id
            ) {
                weapon.state = WeaponState::Despawned;
            }
        }
        self.outfits.remove(&id);
        Ok(pawn)
    }

    /// Pawn ids in ascending order.
    #[must_use]
    pub fn pawn_ids(&self) -> Vec<PawnId> {
        let mut ids: Vec<PawnId> = self.pawns.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Weapon a pawn currently holds.
    #[must_use]
    pub fn pawn_equipped(&self, pawn: PawnId) -> Option<WeaponId> {
        self.pawns.get(&pawn).and_then(|p| p.equipped)
    }

    /// Number of pawns.
    #[must_use]
    pub fn pawn_count(&self) -> usize {
        self.pawns.len()
    }

    /// Move a pawn within its map.
    pub fn move_pawn(&mut self, id: PawnId, position: Vec2Fixed) -> Result<()> {
        let pawn = self.pawns.get_mut(&id).ok_or(EngineError::PawnNotFound(id))?;
        pawn.position = position;
        Ok(())
    }

    /// Assign an outfit policy to a pawn.
    pub fn set_outfit(&mut self, pawn: PawnId, outfit: OutfitFilter) -> Result<()> {
        if !self.pawns.contains_key(&pawn) {
            return Err(EngineError::PawnNotFound(pawn));
        }
        self.outfits.insert(pawn, outfit);
        Ok(())
    }

    /// Remove a pawn's outfit policy, allowing everything.
    pub fn clear_outfit(&mut self, pawn: PawnId) {
        self.outfits.remove(&pawn);
    }

    // ------------------------------------------------------------------
    // Weapons
    // ------------------------------------------------------------------

    fn create_weapon(&mut self, def: &WeaponDefId, quality: Quality, state: WeaponState) -> Result<WeaponId> {
        let max_hit_points = self
            .defs
            .get(def)
            .ok_or_else(|| EngineError::UnknownWeaponDef(def.clone()))?
            .max_hit_points;
        let id = WeaponId(self.next_weapon_id);
        self.next_weapon_id += 1;
        self.weapons.insert(
            id,
            Weapon {
                id,
                def: def.clone(),
                quality,
                hit_points: max_hit_points,
                max_hit_points,
                state,
                forbidden: false,
                bonded_to: None,
            },
        );
        Ok(id)
    }

    /// Spawn a full-durability weapon on the ground.
    pub fn spawn_weapon(
        &mut self,
        def: &WeaponDefId,
        quality: Quality,
        map: MapId,
        position: Vec2Fixed,
    ) -> Result<WeaponId> {
        self.require_map(map)?;
        self.create_weapon(def, quality, WeaponState::OnGround { map, position })
    }

    /// Create a weapon directly in a pawn's hands, replacing nothing.
    pub fn give_weapon(&mut self, pawn: PawnId, def: &WeaponDefId, quality: Quality) -> Result<WeaponId> {
        if self.pawns.get(&pawn).ok_or(EngineError::PawnNotFound(pawn))?.equipped.is_some() {
            return Err(EngineError::InvalidState(format!("{pawn} already holds a weapon")));
        }
        let id = self.create_weapon(def, quality, WeaponState::Equipped { pawn })?;
        if let Some(p) = self.pawns.get_mut(&pawn) {
            p.equipped = Some(id);
        }
        Ok(id)
    }

    /// Mutable access to a weapon.
    pub fn weapon_mut(&mut self, id: WeaponId) -> Option<&mut Weapon> {
        self.weapons.get_mut(&id)
    }

    /// Weapon ids in ascending order.
    #[must_use]
    pub fn weapon_ids(&self) -> Vec<WeaponId> {
        let mut ids: Vec<WeaponId> = self.weapons.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of weapons, wherever they are.
    #[must_use]
    pub fn weapon_count(&self) -> usize {
        self.weapons.len()
    }

    fn weapon_entry(&mut self, id: WeaponId) -> Result<&mut Weapon> {
        self.weapons.get_mut(&id).ok_or(EngineError::WeaponNotFound(id))
    }

    /// Clear the holder's `equipped` slot if this weapon is in it.
    fn detach(&mut self, id: WeaponId) -> Result<()> {
        let state = self.weapon_entry(id)?.state;
        if let WeaponState::Equipped { pawn } = state {
            if let Some(holder) = self.pawns.get_mut(&pawn) {
                if holder.equipped == Some(id) {
                    holder.equipped = None;
                }
            }
        }
        Ok(())
    }

    /// Destroy a weapon. It is removed from the world and returned.
    pub fn destroy_weapon(&mut self, id: WeaponId) -> Result<Weapon> {
        self.detach(id)?;
        let mut weapon = self.weapons.remove(&id).ok_or(EngineError::WeaponNotFound(id))?;
        weapon.state = WeaponState::Destroyed;
        Ok(weapon)
    }

    /// Take a weapon off the map without destroying it.
    pub fn despawn_weapon(&mut self, id: WeaponId) -> Result<()> {
        self.detach(id)?;
        self.weapon_entry(id)?.state = WeaponState::Despawned;
        Ok(())
    }

    /// Put a weapon into a container.
    pub fn store_weapon(&mut self, id: WeaponId, container: u64) -> Result<()> {
        self.detach(id)?;
        self.weapon_entry(id)?.state = WeaponState::Stored { container };
        Ok(())
    }

    /// Put a weapon into a pawn's inventory.
    pub fn carry_weapon(&mut self, id: WeaponId, pawn: PawnId) -> Result<()> {
        if !self.pawns.contains_key(&pawn) {
            return Err(EngineError::PawnNotFound(pawn));
        }
        self.detach(id)?;
        self.weapon_entry(id)?.state = WeaponState::Carried { pawn };
        Ok(())
    }

    /// Move a ground weapon to another tile on the same map.
    pub fn move_weapon(&mut self, id: WeaponId, position: Vec2Fixed) -> Result<()> {
        let weapon = self.weapon_entry(id)?;
        match weapon.state {
            WeaponState::OnGround { map, .. } => {
                weapon.state = WeaponState::OnGround { map, position };
                Ok(())
            }
            _ => Err(EngineError::InvalidState(format!("{id} is not on the ground"))),
        }
    }

    /// Place any existing weapon on the ground.
    pub fn place_weapon(&mut self, id: WeaponId, map: MapId, position: Vec2Fixed) -> Result<()> {
        self.require_map(map)?;
        self.detach(id)?;
        self.weapon_entry(id)?.state = WeaponState::OnGround { map, position };
        Ok(())
    }

    /// Reduce a weapon's durability. Returns the remaining hit points.
    pub fn damage_weapon(&mut self, id: WeaponId, amount: u32) -> Result<u32> {
        let weapon = self.weapon_entry(id)?;
        weapon.hit_points = weapon.hit_points.saturating_sub(amount);
        Ok(weapon.hit_points)
    }

    /// Forbid or allow a weapon.
    pub fn set_forbidden(&mut self, id: WeaponId, forbidden: bool) -> Result<()> {
        self.weapon_entry(id)?.forbidden = forbidden;
        Ok(())
    }

    /// Bond a weapon to a pawn, or clear the bond.
    pub fn set_bonded(&mut self, id: WeaponId, pawn: Option<PawnId>) -> Result<()> {
        self.weapon_entry(id)?.bonded_to = pawn;
        Ok(())
    }

    /// Equip `weapon` on `pawn`, dropping whatever the pawn held at its
    /// feet. Returns the dropped weapon.
    pub fn equip(&mut self, pawn: PawnId, weapon: WeaponId) -> Result<Option<WeaponId>> {
        let holder = self.pawns.get(&pawn).ok_or(EngineError::PawnNotFound(pawn))?;
        let previous = holder.equipped;
        let feet = holder.map.map(|map| (map, holder.position));
        if !self.weapons.contains_key(&weapon) {
            return Err(EngineError::WeaponNotFound(weapon));
        }
        if previous == Some(weapon) {
            return Ok(None);
        }

        let dropped = match (previous, feet) {
            (Some(old), Some((map, position))) => {
                self.weapon_entry(old)?.state = WeaponState::OnGround { map, position };
                Some(old)
            }
            (Some(old), None) => {
                self.weapon_entry(old)?.state = WeaponState::Carried { pawn };
                None
            }
            (None, _) => None,
        };

        self.detach(weapon)?;
        self.weapon_entry(weapon)?.state = WeaponState::Equipped { pawn };
        if let Some(holder) = self.pawns.get_mut(&pawn) {
            holder.equipped = Some(weapon);
        }
        Ok(dropped)
    }

    /// Drop a pawn's equipped weapon at its feet. Returns the dropped weapon.
    pub fn drop_equipped(&mut self, pawn: PawnId) -> Result<Option<WeaponId>> {
        let holder = self.pawns.get(&pawn).ok_or(EngineError::PawnNotFound(pawn))?;
        let (Some(weapon), Some(map)) = (holder.equipped, holder.map) else {
            return Ok(None);
        };
        let position = holder.position;
        self.place_weapon(weapon, map, position)?;
        Ok(Some(weapon))
    }

    // ------------------------------------------------------------------
    // Raids
    // ------------------------------------------------------------------

    /// Mark a large hostile incursion as active on `map`.
    pub fn start_raid(&mut self, map: MapId) {
        self.raids.insert(map);
    }

    /// End the incursion on `map`.
    pub fn end_raid(&mut self, map: MapId) {
        self.raids.remove(&map);
    }

    /// Feed the whole world state into `hasher` in a deterministic order.
    pub fn hash_state<H: Hasher>(&self, hasher: &mut H) {
        self.tick.hash(hasher);
        for id in self.pawn_ids() {
            if let Some(pawn) = self.pawns.get(&id) {
                pawn.hash(hasher);
            }
        }
        for id in self.weapon_ids() {
            if let Some(weapon) = self.weapons.get(&id) {
                weapon.hash(hasher);
            }
        }
        self.raids.hash(hasher);
    }
}

impl WorldView for Colony {
    fn current_tick(&self) -> u64 {
        self.tick
    }

    fn pawn(&self, id: PawnId) -> Option<&Pawn> {
        self.pawns.get(&id)
    }

    fn weapon(&self, id: WeaponId) -> Option<&Weapon> {
        self.weapons.get(&id)
    }

    fn weapon_def(&self, id: &WeaponDefId) -> Option<&WeaponDef> {
        self.defs.get(id)
    }

    fn outfit(&self, pawn: PawnId) -> Option<&OutfitFilter> {
        self.outfits.get(&pawn)
    }

    fn spawned_weapons(&self, map: MapId) -> Vec<WeaponId> {
        let mut ids: Vec<WeaponId> = self
            .weapons
            .values()
            .filter(|w| w.ground_position().is_some_and(|(m, _)| m == map))
            .map(|w| w.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn maps(&self) -> Vec<MapId> {
        self.maps.iter().copied().collect()
    }
}

impl RaidGate for Colony {
    fn is_large_hostile_incursion_active(&self, map: MapId) -> bool {
        self.raids.contains(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pistol() -> WeaponDefId {
        WeaponDefId::new("pistol")
    }

    #[test]
    fn test_spawn_and_query() {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        let a = colony
            .spawn_weapon(&pistol(), Quality::Good, map, Vec2Fixed::from_tiles(1, 2))
            .unwrap();
        let b = colony
            .spawn_weapon(&pistol(), Quality::Poor, map, Vec2Fixed::from_tiles(5, 5))
            .unwrap();

        assert_eq!(colony.spawned_weapons(map), vec![a, b]);
        assert_eq!(colony.weapon(a).unwrap().quality, Quality::Good);
        assert_eq!(colony.weapon(a).unwrap().hit_points, 100);
    }

    #[test]
    fn test_unknown_def_and_map_rejected() {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        assert!(matches!(
            colony.spawn_weapon(&WeaponDefId::new("railgun"), Quality::Normal, map, Vec2Fixed::ZERO),
            Err(EngineError::UnknownWeaponDef(_))
        ));
        assert!(matches!(
            colony.spawn_weapon(&pistol(), Quality::Normal, MapId(42), Vec2Fixed::ZERO),
            Err(EngineError::MapNotFound(MapId(42)))
        ));
    }

    #[test]
    fn test_equip_drops_old_weapon_at_feet() {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        let pawn = colony.spawn_colonist("Ada", map, Vec2Fixed::from_tiles(3, 3));
        let old = colony.give_weapon(pawn, &pistol(), Quality::Normal).unwrap();
        let new = colony
            .spawn_weapon(&WeaponDefId::new("assault_rifle"), Quality::Good, map, Vec2Fixed::from_tiles(4, 3))
            .unwrap();

        let dropped = colony.equip(pawn, new).unwrap();
        assert_eq!(dropped, Some(old));
        assert_eq!(colony.pawn(pawn).unwrap().equipped, Some(new));
        assert_eq!(
            colony.weapon(old).unwrap().ground_position(),
            Some((map, Vec2Fixed::from_tiles(3, 3)))
        );
        assert_eq!(colony.spawned_weapons(map), vec![old]);
    }

    #[test]
    fn test_destroying_equipped_weapon_unequips() {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        let pawn = colony.spawn_colonist("Ada", map, Vec2Fixed::ZERO);
        let held = colony.give_weapon(pawn, &pistol(), Quality::Normal).unwrap();

        let destroyed = colony.destroy_weapon(held).unwrap();
        assert!(destroyed.is_destroyed());
        assert!(colony.weapon(held).is_none());
        assert_eq!(colony.pawn(pawn).unwrap().equipped, None);
    }

    #[test]
    fn test_store_and_carry_leave_ground() {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        let pawn = colony.spawn_colonist("Ada", map, Vec2Fixed::ZERO);
        let a = colony.spawn_weapon(&pistol(), Quality::Normal, map, Vec2Fixed::ZERO).unwrap();
        let b = colony.spawn_weapon(&pistol(), Quality::Normal, map, Vec2Fixed::ZERO).unwrap();

        colony.store_weapon(a, 7).unwrap();
        colony.carry_weapon(b, pawn).unwrap();
        assert!(colony.spawned_weapons(map).is_empty());
        assert!(colony.move_weapon(a, Vec2Fixed::ZERO).is_err());
    }

    #[test]
    fn test_remove_pawn_takes_gear() {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        let pawn = colony.spawn_colonist("Ada", map, Vec2Fixed::ZERO);
        let held = colony.give_weapon(pawn, &pistol(), Quality::Normal).unwrap();

        colony.remove_pawn(pawn).unwrap();
        assert!(colony.pawn(pawn).is_none());
        assert_eq!(colony.weapon(held).unwrap().state, WeaponState::Despawned);
        assert!(matches!(colony.remove_pawn(pawn), Err(EngineError::PawnNotFound(_))));
    }

    #[test]
    fn test_raid_gate() {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        assert!(!colony.is_large_hostile_incursion_active(map));
        colony.start_raid(map);
        assert!(colony.is_large_hostile_incursion_active(map));
        colony.end_raid(map);
        assert!(!colony.is_large_hostile_incursion_active(map));
    }
}
