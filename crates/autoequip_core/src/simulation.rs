//! Deterministic tick driver.
//!
//! [`Simulation`] plays the host scheduler around a [`Colony`]: it asks the
//! [`JobArbiter`] for decisions on a fixed cadence, carries out the jobs it
//! emits and routes world mutations through the engine's lifecycle hooks
//! so caches never drift.
//!
//! # Determinism
//!
//! - No floating-point math in decisions (fixed-point via [`crate::math::Fixed`])
//! - No randomness
//! - Pawns are evaluated and jobs completed in ascending id order
//!
//! # Example
//!
//! ```
//! use autoequip_core::colony::Colony;
//! use autoequip_core::components::{Quality, WeaponDefId};
//! use autoequip_core::config::EngineConfig;
//! use autoequip_core::math::Vec2Fixed;
//! use autoequip_core::simulation::Simulation;
//!
//! let mut colony = Colony::with_standard_defs();
//! let map = colony.add_map();
//! let pawn = colony.spawn_colonist("Ada", map, Vec2Fixed::ZERO);
//! colony
//!     .spawn_weapon(&WeaponDefId::new("pistol"), Quality::Normal, map, Vec2Fixed::from_tiles(2, 0))
//!     .unwrap();
//!
//! let mut sim = Simulation::new(colony, EngineConfig::default());
//! sim.run(120);
//! assert!(sim.colony().pawn_equipped(pawn).is_some());
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::arbiter::{JobArbiter, MaintenanceReport};
use crate::colony::Colony;
use crate::components::{Activity, MapId, Pawn, PawnId, Quality, WeaponDefId, WeaponId};
use crate::config::EngineConfig;
use crate::dropped::DroppedItemTracker;
use crate::error::{EngineError, Result};
use crate::forced::ForcedSnapshot;
use crate::host::{OutfitFilter, ReservationManager, ReservationTable, WorldView};
use crate::job::{Decision, EquipJob};
use crate::math::Vec2Fixed;

/// Save format version written by this build.
pub const SAVE_VERSION: u32 = 1;

/// Everything needed to resume a simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveGame {
    /// Format version.
    pub version: u32,
    /// World state.
    pub colony: Colony,
    /// Engine settings.
    pub config: EngineConfig,
    /// Forced weapon types per pawn.
    pub forced: ForcedSnapshot,
    /// Live dropped-item cooldowns.
    pub dropped: DroppedItemTracker,
    /// Outstanding reservations.
    pub reservations: ReservationTable,
    /// Jobs not yet carried out.
    pub pending: Vec<EquipJob>,
}

/// Events produced by a single tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Jobs emitted this tick.
    pub issued: Vec<EquipJob>,
    /// Jobs carried out this tick.
    pub completed: Vec<EquipJob>,
    /// Jobs abandoned this tick (target gone, expired).
    pub failed: Vec<EquipJob>,
    /// Maintenance results, on maintenance ticks.
    pub maintenance: Option<MaintenanceReport>,
}

/// Tick driver around a [`Colony`] and a [`JobArbiter`].
#[derive(Debug, Clone)]
pub struct Simulation {
    colony: Colony,
    reservations: ReservationTable,
    arbiter: JobArbiter,
    pending: BTreeMap<PawnId, EquipJob>,
}

impl Simulation {
    /// Wrap a colony. The weapon index is built from its current state.
    #[must_use]
    pub fn new(colony: Colony, config: EngineConfig) -> Self {
        let mut arbiter = JobArbiter::new(config);
        arbiter.invalidate_all(&colony);
        Self {
            colony,
            reservations: ReservationTable::new(),
            arbiter,
            pending: BTreeMap::new(),
        }
    }

    /// Current tick.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.colony.current_tick()
    }

    /// The world.
    #[must_use]
    pub const fn colony(&self) -> &Colony {
        &self.colony
    }

    /// Mutable world access. Call [`Self::resync`] after structural
    /// changes made this way.
    pub fn colony_mut(&mut self) -> &mut Colony {
        &mut self.colony
    }

    /// The engine.
    #[must_use]
    pub const fn arbiter(&self) -> &JobArbiter {
        &self.arbiter
    }

    /// Mutable engine access.
    pub fn arbiter_mut(&mut self) -> &mut JobArbiter {
        &mut self.arbiter
    }

    /// Reservation table.
    #[must_use]
    pub const fn reservations(&self) -> &ReservationTable {
        &self.reservations
    }

    /// Outstanding job for a pawn.
    #[must_use]
    pub fn pending_job(&self, pawn: PawnId) -> Option<&EquipJob> {
        self.pending.get(&pawn)
    }

    /// Number of outstanding jobs.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Advance the simulation by one tick.
    ///
    /// # System Order
    ///
    /// 1. Advance the clock
    /// 2. Complete jobs issued on earlier ticks
    /// 3. Maintenance, every `maintenance_interval_ticks`
    /// 4. Evaluate idle pawns, every `think_interval_ticks`
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents::default();

        // 1. Clock
        let now = self.colony.advance_tick();

        // 2. Job completion
        self.complete_jobs(now, &mut events);

        // 3. Maintenance
        let config = self.arbiter.config();
        let maintenance_due = now % config.maintenance_interval_ticks.max(1) == 0;
        let think_due = now % config.think_interval_ticks.max(1) == 0;
        if maintenance_due {
            events.maintenance = Some(self.arbiter.maintenance(&self.colony));
        }

        // 4. Think
        if think_due {
            for pawn in self.colony.pawn_ids() {
                if self.pending.contains_key(&pawn) {
                    continue;
                }
                if let Some(job) = self.think(pawn).into_job() {
                    events.issued.push(job);
                }
            }
        }

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::trace!(tick = now, state_hash = hash, "Simulation state hash");
        }

        events
    }

    /// Run `ticks` ticks and return the events of each.
    pub fn run(&mut self, ticks: u64) -> Vec<TickEvents> {
        (0..ticks).map(|_| self.tick()).collect()
    }

    /// Evaluate one pawn now and queue the job if one is emitted.
    pub fn think(&mut self, pawn: PawnId) -> Decision {
        let decision = self
            .arbiter
            .evaluate(&self.colony, &mut self.reservations, pawn);
        if let Decision::Emit(job) = &decision {
            if let Some(p) = self.colony.pawn_mut(pawn) {
                p.activity = Activity::EquippingWeapon;
            }
            self.pending.insert(pawn, job.clone());
        }
        decision
    }

    fn complete_jobs(&mut self, now: u64, events: &mut TickEvents) {
        let due: Vec<PawnId> = self
            .pending
            .iter()
            .filter(|(_, job)| job.issued_tick < now)
            .map(|(pawn, _)| *pawn)
            .collect();

        for pawn in due {
            let Some(job) = self.pending.remove(&pawn) else {
                continue;
            };
            let target = job.target;
            match self.carry_out(&job, now) {
                Ok(()) => events.completed.push(job),
                Err(reason) => {
                    tracing::debug!(pawn = %pawn, target = %job.target, %reason, "Equip job failed");
                    events.failed.push(job);
                }
            }
            self.reservations.release(target);
            if let Some(p) = self.colony.pawn_mut(pawn) {
                p.activity = Activity::Idle;
            }
        }
    }

    fn carry_out(&mut self, job: &EquipJob, now: u64) -> Result<()> {
        if job.is_expired(now) {
            return Err(EngineError::InvalidState(format!("job expired at {now}")));
        }
        let pawn = self
            .colony
            .pawn(job.pawn)
            .ok_or(EngineError::PawnNotFound(job.pawn))?;
        let weapon = self
            .colony
            .weapon(job.target)
            .ok_or(EngineError::WeaponNotFound(job.target))?;
        let on_pawn_map = weapon
            .ground_position()
            .is_some_and(|(map, _)| Some(map) == pawn.map);
        if !on_pawn_map || weapon.forbidden {
            return Err(EngineError::InvalidState(format!(
                "{} no longer available",
                job.target
            )));
        }

        let dropped = self.colony.equip(job.pawn, job.target)?;
        self.arbiter.on_weapon_removed(job.target);
        if let Some(old) = dropped {
            if let Some(weapon) = self.colony.weapon(old) {
                self.arbiter.on_weapon_dropped(job.pawn, weapon, now);
            }
            if let Some(new) = self.colony.weapon(job.target) {
                self.arbiter.forced_mut().transfer(job.pawn, old, new);
            }
        }
        tracing::debug!(pawn = %job.pawn, weapon = %job.target, dropped = ?dropped, "Weapon equipped");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Host mutations that keep the engine in sync
    // ------------------------------------------------------------------

    /// Add an adult colonist.
    pub fn spawn_colonist(&mut self, name: &str, map: MapId, position: Vec2Fixed) -> PawnId {
        self.colony.spawn_colonist(name, map, position)
    }

    /// Add a pawn.
    pub fn add_pawn(&mut self, pawn: Pawn) -> Result<PawnId> {
        self.colony.add_pawn(pawn)
    }

    /// Change a pawn. Cached scores for it are dropped.
    pub fn modify_pawn<F: FnOnce(&mut Pawn)>(&mut self, pawn: PawnId, change: F) -> Result<()> {
        let p = self
            .colony
            .pawn_mut(pawn)
            .ok_or(EngineError::PawnNotFound(pawn))?;
        change(p);
        self.arbiter.on_pawn_changed(pawn);
        Ok(())
    }

    /// Remove a pawn, cancelling its job and releasing its claims.
    pub fn remove_pawn(&mut self, pawn: PawnId) -> Result<Pawn> {
        let removed = self.colony.remove_pawn(pawn)?;
        self.pending.remove(&pawn);
        self.reservations.release_all_for(pawn);
        self.arbiter.on_pawn_removed(pawn);
        if let Some(held) = removed.equipped {
            self.arbiter.on_weapon_removed(held);
        }
        Ok(removed)
    }

    /// Spawn a weapon on the ground.
    pub fn spawn_weapon(
        &mut self,
        def: &WeaponDefId,
        quality: Quality,
        map: MapId,
        position: Vec2Fixed,
    ) -> Result<WeaponId> {
        let id = self.colony.spawn_weapon(def, quality, map, position)?;
        if let Some(weapon) = self.colony.weapon(id) {
            self.arbiter.on_weapon_spawned(weapon);
        }
        Ok(id)
    }

    /// Put a new weapon straight into a pawn's hands.
    pub fn give_weapon(&mut self, pawn: PawnId, def: &WeaponDefId, quality: Quality) -> Result<WeaponId> {
        self.colony.give_weapon(pawn, def, quality)
    }

    /// Destroy a weapon.
    pub fn destroy_weapon(&mut self, weapon: WeaponId) -> Result<()> {
        self.colony.destroy_weapon(weapon)?;
        self.weapon_left_ground(weapon);
        Ok(())
    }

    /// Remove a weapon from the map without destroying it.
    pub fn despawn_weapon(&mut self, weapon: WeaponId) -> Result<()> {
        self.colony.despawn_weapon(weapon)?;
        self.weapon_left_ground(weapon);
        Ok(())
    }

    /// Move a weapon into a container.
    pub fn store_weapon(&mut self, weapon: WeaponId, container: u64) -> Result<()> {
        self.colony.store_weapon(weapon, container)?;
        self.weapon_left_ground(weapon);
        Ok(())
    }

    fn weapon_left_ground(&mut self, weapon: WeaponId) {
        self.arbiter.on_weapon_removed(weapon);
        self.reservations.release(weapon);
    }

    /// Move a ground weapon.
    pub fn move_weapon(&mut self, weapon: WeaponId, position: Vec2Fixed) -> Result<()> {
        self.colony.move_weapon(weapon, position)?;
        if let Some(w) = self.colony.weapon(weapon) {
            self.arbiter.on_weapon_moved(w);
        }
        Ok(())
    }

    /// Forbid or allow a weapon.
    pub fn set_forbidden(&mut self, weapon: WeaponId, forbidden: bool) -> Result<()> {
        self.colony.set_forbidden(weapon, forbidden)
    }

    /// Assign an outfit policy.
    pub fn set_outfit(&mut self, pawn: PawnId, outfit: OutfitFilter) -> Result<()> {
        self.colony.set_outfit(pawn, outfit)
    }

    /// Force a weapon (and its type) for a pawn.
    pub fn set_forced(&mut self, pawn: PawnId, weapon: WeaponId) -> Result<()> {
        if self.colony.pawn(pawn).is_none() {
            return Err(EngineError::PawnNotFound(pawn));
        }
        let w = self
            .colony
            .weapon(weapon)
            .ok_or(EngineError::WeaponNotFound(weapon))?;
        self.arbiter.forced_mut().set_forced(pawn, w);
        Ok(())
    }

    /// Start a large hostile incursion on a map.
    pub fn start_raid(&mut self, map: MapId) {
        tracing::info!(map = %map, "Raid started");
        self.colony.start_raid(map);
    }

    /// End the incursion on a map.
    pub fn end_raid(&mut self, map: MapId) {
        tracing::info!(map = %map, "Raid ended");
        self.colony.end_raid(map);
    }

    /// Rebuild engine caches from the colony.
    pub fn resync(&mut self) {
        self.arbiter.invalidate_all(&self.colony);
    }

    // ------------------------------------------------------------------
    // Determinism and persistence
    // ------------------------------------------------------------------

    /// Hash of the world and outstanding jobs, for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.colony.hash_state(&mut hasher);
        self.pending.len().hash(&mut hasher);
        for job in self.pending.values() {
            job.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Serialize the simulation.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn save(&self) -> Result<Vec<u8>> {
        let save = SaveGame {
            version: SAVE_VERSION,
            colony: self.colony.clone(),
            config: self.arbiter.config().clone(),
            forced: self.arbiter.forced().export(),
            dropped: self.arbiter.dropped().clone(),
            reservations: self.reservations.clone(),
            pending: self.pending.values().cloned().collect(),
        };
        let bytes = bincode::serialize(&save)
            .map_err(|e| EngineError::SaveData(format!("Failed to serialize save: {e}")))?;
        tracing::info!(tick = self.tick_count(), bytes = bytes.len(), "Simulation saved");
        Ok(bytes)
    }

    /// Restore a simulation written by [`Self::save`]. Caches are rebuilt
    /// and forced weapon types restored.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is corrupt or from another version.
    pub fn load(data: &[u8]) -> Result<Self> {
        let save: SaveGame = bincode::deserialize(data)
            .map_err(|e| EngineError::SaveData(format!("Failed to deserialize save: {e}")))?;
        if save.version != SAVE_VERSION {
            return Err(EngineError::SaveVersionMismatch {
                expected: SAVE_VERSION,
                found: save.version,
            });
        }
        save.config.validate()?;

        let mut sim = Self::new(save.colony, save.config);
        sim.arbiter.forced_mut().import(&save.forced);
        sim.arbiter.restore_dropped(save.dropped);
        sim.reservations = save.reservations;
        sim.pending = save.pending.into_iter().map(|job| (job.pawn, job)).collect();
        tracing::info!(
            tick = sim.tick_count(),
            forced_pawns = sim.arbiter.forced().len(),
            "Simulation loaded"
        );
        Ok(sim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Skills;

    fn def(id: &str) -> WeaponDefId {
        WeaponDefId::new(id)
    }

    fn setup() -> (Simulation, MapId, PawnId) {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        let pawn = colony.spawn_colonist("Ada", map, Vec2Fixed::ZERO);
        let config = EngineConfig {
            think_interval_ticks: 1,
            ..EngineConfig::default()
        };
        (Simulation::new(colony, config), map, pawn)
    }

    #[test]
    fn test_tick_increments() {
        let (mut sim, _, _) = setup();
        assert_eq!(sim.tick_count(), 0);
        sim.tick();
        sim.tick();
        assert_eq!(sim.tick_count(), 2);
    }

    #[test]
    fn test_job_issued_then_completed_next_tick() {
        let (mut sim, map, pawn) = setup();
        let pistol = sim
            .spawn_weapon(&def("pistol"), Quality::Normal, map, Vec2Fixed::from_tiles(3, 0))
            .unwrap();

        let first = sim.tick();
        assert_eq!(first.issued.len(), 1);
        assert_eq!(first.issued[0].target, pistol);
        assert_eq!(sim.colony().pawn(pawn).unwrap().activity, Activity::EquippingWeapon);
        assert_eq!(sim.reservations().reserved_by(pistol), Some(pawn));

        let second = sim.tick();
        assert_eq!(second.completed.len(), 1);
        assert_eq!(sim.colony().pawn_equipped(pawn), Some(pistol));
        assert_eq!(sim.colony().pawn(pawn).unwrap().activity, Activity::Idle);
        assert!(sim.reservations().is_empty());
        assert_eq!(sim.pending_count(), 0);
    }

    #[test]
    fn test_destroyed_target_fails_job() {
        let (mut sim, map, pawn) = setup();
        let pistol = sim
            .spawn_weapon(&def("pistol"), Quality::Normal, map, Vec2Fixed::from_tiles(3, 0))
            .unwrap();
        sim.tick();
        sim.destroy_weapon(pistol).unwrap();

        let events = sim.tick();
        assert_eq!(events.failed.len(), 1);
        assert_eq!(sim.colony().pawn_equipped(pawn), None);
        assert!(sim.reservations().is_empty());
    }

    #[test]
    fn test_swap_marks_old_weapon_dropped() {
        let (mut sim, map, pawn) = setup();
        let old = sim.give_weapon(pawn, &def("pistol"), Quality::Poor).unwrap();
        let rifle = sim
            .spawn_weapon(&def("assault_rifle"), Quality::Good, map, Vec2Fixed::from_tiles(2, 0))
            .unwrap();

        sim.run(2);
        assert_eq!(sim.colony().pawn_equipped(pawn), Some(rifle));
        assert!(sim.arbiter().dropped().is_dropped_by(old, pawn, sim.tick_count()));
        assert!(sim.arbiter().weapon_cache().contains(old));
    }

    #[test]
    fn test_modify_pawn_recomputes_scores() {
        let (mut sim, _, pawn) = setup();
        sim.modify_pawn(pawn, |p| p.skills = Skills::new(18, 2)).unwrap();
        assert_eq!(sim.colony().pawn(pawn).unwrap().skills.shooting, 18);
        assert!(sim.modify_pawn(PawnId(99), |_| {}).is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let (mut sim, map, pawn) = setup();
        sim.spawn_weapon(&def("knife"), Quality::Good, map, Vec2Fixed::from_tiles(4, 4))
            .unwrap();
        sim.tick();

        let bytes = sim.save().unwrap();
        let mut loaded = Simulation::load(&bytes).unwrap();
        assert_eq!(loaded.state_hash(), sim.state_hash());
        assert!(loaded.pending_job(pawn).is_some());

        sim.run(5);
        loaded.run(5);
        assert_eq!(loaded.state_hash(), sim.state_hash());
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(matches!(
            Simulation::load(&[1, 2, 3]),
            Err(EngineError::SaveData(_))
        ));
    }
}
