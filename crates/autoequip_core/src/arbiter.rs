//! Job arbitration: decides whether a pawn should go equip a weapon.
//!
//! One call to [`JobArbiter::evaluate`] walks a single decision through
//! these stages, stopping at the first that rejects:
//!
//! 1. **Eligibility** - [`check_eligibility`]
//! 2. **Raid suppression** - armed pawns wait out large incursions
//! 3. **Forced weapon** - a held forced weapon blocks upgrades unless allowed
//! 4. **Candidates** - nearby ground weapons passing every filter
//! 5. **Threshold** - the best candidate must beat the held weapon by a margin
//! 6. **Liveness** - the target is re-checked right before emission
//! 7. **Reservation** - the target is claimed, never retried
//! 8. **Emit** - an [`EquipJob`] is returned to the host scheduler
//!
//! The arbiter owns the per-world caches and keeps them in sync through
//! its lifecycle hooks.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::components::{Activity, MapId, Membership, Pawn, PawnId, Weapon, WeaponId};
use crate::config::EngineConfig;
use crate::dropped::DroppedItemTracker;
use crate::forced::ForcedWeaponRegistry;
use crate::host::{RaidGate, ReservationManager, WorldView};
use crate::job::{Decision, EquipJob, IneligibleReason, JobAction, SuppressReason};
use crate::math::{Fixed, Vec2Fixed};
use crate::score_cache::ScoreCache;
use crate::weapon_cache::WeaponCache;

/// Decide whether `pawn` may be automated at all.
///
/// Hosts can call this directly to skip scheduling evaluations for pawns
/// that would be rejected anyway.
///
/// # Errors
///
/// Returns the first reason the pawn is excluded.
pub fn check_eligibility(pawn: Option<&Pawn>, config: &EngineConfig) -> Result<(), IneligibleReason> {
    if !config.mod_enabled {
        return Err(IneligibleReason::ModDisabled);
    }
    let Some(pawn) = pawn else {
        return Err(IneligibleReason::PawnNotFound);
    };
    match pawn.membership {
        Membership::Colonist => {}
        Membership::Temporary if config.allow_temporary_colonists => {}
        Membership::Temporary => return Err(IneligibleReason::TemporaryColonist),
        Membership::Visitor => return Err(IneligibleReason::NotColonist),
    }
    if pawn.is_child()
        && (!config.allow_children_to_equip_weapons || pawn.age_years < config.children_min_age)
    {
        return Err(IneligibleReason::Child);
    }

    let caps = pawn.capabilities;
    if !caps.violence_capable {
        return Err(IneligibleReason::NotViolenceCapable);
    }
    if caps.drafted {
        return Err(IneligibleReason::Drafted);
    }
    if caps.downed {
        return Err(IneligibleReason::Downed);
    }
    if caps.mental_break {
        return Err(IneligibleReason::MentalState);
    }
    if pawn.activity == Activity::EquippingWeapon {
        return Err(IneligibleReason::AlreadyEquipping);
    }
    if pawn.map.is_none() {
        return Err(IneligibleReason::NotOnMap);
    }
    Ok(())
}

/// Counts of entries removed by [`JobArbiter::maintenance`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Expired or orphaned dropped-item records.
    pub dropped_removed: usize,
    /// Score entries for vanished pawns or weapons.
    pub scores_pruned: usize,
    /// Weapon cache entries no longer on the ground.
    pub weapons_pruned: usize,
}

impl MaintenanceReport {
    /// Total entries removed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.dropped_removed + self.scores_pruned + self.weapons_pruned
    }
}

/// Sizes of the engine's caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDiagnostics {
    /// Indexed ground weapons.
    pub weapon_cache_size: usize,
    /// Cached scores.
    pub score_cache_size: usize,
    /// Dropped-item records.
    pub dropped_records: usize,
    /// Pawns with forced weapons or types.
    pub forced_pawns: usize,
    /// Whether any cache references a vanished or destroyed object.
    pub has_orphans: bool,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    id: WeaponId,
    score: Fixed,
    distance_squared: Fixed,
}

impl Candidate {
    /// Best first: higher score, then closer, then lower id.
    fn rank(a: &Self, b: &Self) -> Ordering {
        b.score
            .cmp(&a.score)
            .then(a.distance_squared.cmp(&b.distance_squared))
            .then(a.id.cmp(&b.id))
    }
}

/// The decision engine for one world.
#[derive(Debug, Clone, Default)]
pub struct JobArbiter {
    config: EngineConfig,
    weapons: WeaponCache,
    scores: ScoreCache,
    dropped: DroppedItemTracker,
    forced: ForcedWeaponRegistry,
}

impl JobArbiter {
    /// Create an arbiter with empty caches.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the configuration. Caches are kept.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    /// Forced-weapon registry.
    #[must_use]
    pub const fn forced(&self) -> &ForcedWeaponRegistry {
        &self.forced
    }

    /// Mutable forced-weapon registry.
    pub fn forced_mut(&mut self) -> &mut ForcedWeaponRegistry {
        &mut self.forced
    }

    /// Dropped-item tracker.
    #[must_use]
    pub const fn dropped(&self) -> &DroppedItemTracker {
        &self.dropped
    }

    /// Replace the dropped-item records, e.g. after loading a save.
    pub fn restore_dropped(&mut self, dropped: DroppedItemTracker) {
        self.dropped = dropped;
    }

    /// Spatial weapon cache.
    #[must_use]
    pub const fn weapon_cache(&self) -> &WeaponCache {
        &self.weapons
    }

    /// Score cache.
    #[must_use]
    pub const fn score_cache(&self) -> &ScoreCache {
        &self.scores
    }

    /// Cached score of `weapon` for `pawn`.
    pub fn score<W: WorldView + ?Sized>(&mut self, world: &W, pawn: PawnId, weapon: WeaponId) -> Fixed {
        self.scores.score(world, pawn, weapon)
    }

    /// Evaluate and return the emitted job, if any.
    pub fn try_give_job<W, R>(&mut self, world: &W, reservations: &mut R, pawn: PawnId) -> Option<EquipJob>
    where
        W: WorldView + RaidGate + ?Sized,
        R: ReservationManager + ?Sized,
    {
        self.evaluate(world, reservations, pawn).into_job()
    }

    /// Run one decision for `pawn`.
    ///
    /// Never fails: every problem ends in a non-emitting [`Decision`].
    /// On [`Decision::Emit`] the target has been reserved for `pawn`.
    pub fn evaluate<W, R>(&mut self, world: &W, reservations: &mut R, pawn: PawnId) -> Decision
    where
        W: WorldView + RaidGate + ?Sized,
        R: ReservationManager + ?Sized,
    {
        let decision = self.decide(world, reservations, pawn);
        match &decision {
            Decision::Emit(job) => tracing::debug!(
                pawn = %pawn,
                target = %job.target,
                tick = job.issued_tick,
                "Equip job emitted"
            ),
            Decision::Ineligible(_) => {
                tracing::trace!(pawn = %pawn, outcome = %decision, "No equip job");
            }
            _ => tracing::debug!(pawn = %pawn, outcome = %decision, "No equip job"),
        }
        decision
    }

    fn decide<W, R>(&mut self, world: &W, reservations: &mut R, pawn_id: PawnId) -> Decision
    where
        W: WorldView + RaidGate + ?Sized,
        R: ReservationManager + ?Sized,
    {
        let pawn = world.pawn(pawn_id);
        if let Err(reason) = check_eligibility(pawn, &self.config) {
            return Decision::Ineligible(reason);
        }
        let Some(pawn) = pawn else {
            return Decision::Ineligible(IneligibleReason::PawnNotFound);
        };
        let Some(map) = pawn.map else {
            return Decision::Ineligible(IneligibleReason::NotOnMap);
        };
        let now = world.current_tick();

        // A dangling equipped id counts as unarmed.
        let current = pawn.equipped.and_then(|id| world.weapon(id));

        if self.config.disable_during_raids && world.is_large_hostile_incursion_active(map) {
            let emergency = current.is_none() && self.config.allow_unarmed_pickup_during_raids;
            if !emergency {
                return Decision::Suppressed(SuppressReason::Raid);
            }
        }

        let current_forced = current.is_some_and(|w| self.forced.is_forced(pawn_id, w));
        if current_forced && !self.config.allow_forced_weapon_upgrades {
            return Decision::Suppressed(SuppressReason::ForcedWeaponHeld);
        }

        let current_score = current.map(|w| self.scores.score(world, pawn_id, w.id));

        let nearby = self
            .weapons
            .weapons_near(map, pawn.position, self.config.search_radius, world);

        let mut candidates = Vec::with_capacity(nearby.len());
        for id in nearby {
            let Some(weapon) = world.weapon(id) else {
                continue;
            };
            if let Some(reason) = self.reject_reason(world, &*reservations, pawn, weapon, now) {
                tracing::trace!(pawn = %pawn_id, weapon = %id, reason, "Candidate rejected");
                continue;
            }
            let score = self.scores.score(world, pawn_id, id);
            if score <= Fixed::ZERO {
                tracing::trace!(pawn = %pawn_id, weapon = %id, reason = "zero score", "Candidate rejected");
                continue;
            }
            if let (Some(held), Some(held_score)) = (current, current_score) {
                if current_forced && weapon.def != held.def {
                    let allowed = self.config.allow_forced_cross_type_upgrades
                        && score > held_score.saturating_mul(self.config.effective_cross_type_margin());
                    if !allowed {
                        tracing::trace!(
                            pawn = %pawn_id,
                            weapon = %id,
                            reason = "cross-type while forced",
                            "Candidate rejected"
                        );
                        continue;
                    }
                }
            }
            candidates.push(Candidate {
                id,
                score,
                distance_squared: pawn
                    .position
                    .distance_squared(weapon.ground_position().map_or(pawn.position, |(_, p)| p)),
            });
        }

        if current.is_none() {
            self.prefer_forced_types(world, pawn_id, &mut candidates);
        }

        candidates.sort_by(Candidate::rank);
        let Some(best) = candidates.first().copied() else {
            return Decision::NoCandidate;
        };

        if let Some(held_score) = current_score {
            let required = held_score.saturating_mul(self.config.weapon_upgrade_threshold);
            if best.score <= required {
                return Decision::BelowThreshold {
                    candidate: best.id,
                    candidate_score: best.score,
                    current_score: held_score,
                };
            }
        }

        if !Self::still_available(world, best.id, map, pawn.position, self.config.search_radius) {
            tracing::warn!(pawn = %pawn_id, weapon = %best.id, "Chosen weapon went stale before emission");
            self.weapons.remove_weapon(best.id);
            return Decision::Stale(best.id);
        }

        if !reservations.reserve(pawn_id, best.id) {
            return Decision::ReservationFailed(best.id);
        }

        Decision::Emit(EquipJob {
            pawn: pawn_id,
            action: JobAction::Equip,
            target: best.id,
            issued_tick: now,
            expiry_tick: Some(now.saturating_add(self.config.job_expiry_ticks)),
        })
    }

    /// Why `weapon` can never be a candidate for `pawn`, if it cannot.
    fn reject_reason<W, R>(
        &self,
        world: &W,
        reservations: &R,
        pawn: &Pawn,
        weapon: &Weapon,
        now: u64,
    ) -> Option<&'static str>
    where
        W: WorldView + ?Sized,
        R: ReservationManager + ?Sized,
    {
        if weapon.forbidden {
            return Some("forbidden");
        }
        if !weapon.usable_by(pawn.id) {
            return Some("bonded to another pawn");
        }
        let Some(def) = world.weapon_def(&weapon.def) else {
            return Some("unknown definition");
        };
        if let Some(outfit) = world.outfit(pawn.id) {
            if !outfit.allows(weapon, def) {
                return Some("outfit");
            }
        }
        if self.dropped.is_dropped_by(weapon.id, pawn.id, now) {
            return Some("recently dropped");
        }
        if !reservations.can_reserve(pawn.id, weapon.id) {
            return Some("reserved");
        }
        None
    }

    /// Narrow an unarmed pawn's candidates to its forced types when any
    /// of those are available.
    fn prefer_forced_types<W: WorldView + ?Sized>(
        &self,
        world: &W,
        pawn: PawnId,
        candidates: &mut Vec<Candidate>,
    ) {
        let is_forced_type = |c: &Candidate| {
            world
                .weapon(c.id)
                .is_some_and(|w| self.forced.is_type_forced(pawn, &w.def))
        };
        if candidates.iter().any(is_forced_type) {
            candidates.retain(is_forced_type);
        }
    }

    fn still_available<W: WorldView + ?Sized>(
        world: &W,
        id: WeaponId,
        map: MapId,
        origin: Vec2Fixed,
        radius: Fixed,
    ) -> bool {
        world.weapon(id).is_some_and(|w| {
            !w.forbidden
                && w.ground_position()
                    .is_some_and(|(m, position)| m == map && origin.within_radius(position, radius))
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle hooks
    // ------------------------------------------------------------------

    /// A weapon appeared on the ground.
    pub fn on_weapon_spawned(&mut self, weapon: &Weapon) {
        self.weapons.add_weapon(weapon);
    }

    /// A ground weapon changed position.
    pub fn on_weapon_moved(&mut self, weapon: &Weapon) {
        self.weapons.add_weapon(weapon);
    }

    /// A weapon left the ground for good or for now: destroyed, despawned,
    /// picked up or stored.
    pub fn on_weapon_removed(&mut self, weapon: WeaponId) {
        self.weapons.remove_weapon(weapon);
        self.scores.on_weapon_removed(weapon);
        self.dropped.clear(weapon);
        self.forced.on_weapon_removed(weapon);
    }

    /// `pawn` put `weapon` on the ground at tick `now`. It is indexed and
    /// ignored by that pawn until the cooldown runs out.
    pub fn on_weapon_dropped(&mut self, pawn: PawnId, weapon: &Weapon, now: u64) {
        self.weapons.add_weapon(weapon);
        self.dropped
            .mark_dropped(weapon.id, pawn, now, self.config.dropped_item_cooldown_ticks);
    }

    /// A pawn left the world.
    pub fn on_pawn_removed(&mut self, pawn: PawnId) {
        self.scores.on_pawn_removed(pawn);
        self.forced.on_pawn_removed(pawn);
    }

    /// A pawn's skills or traits changed.
    pub fn on_pawn_changed(&mut self, pawn: PawnId) {
        self.scores.on_pawn_removed(pawn);
    }

    /// Rebuild the weapon index for one map.
    pub fn invalidate<W: WorldView + ?Sized>(&mut self, map: MapId, world: &W) {
        self.weapons.invalidate(map, world);
    }

    /// Rebuild the weapon index for every map and drop all cached scores.
    pub fn invalidate_all<W: WorldView + ?Sized>(&mut self, world: &W) {
        self.weapons.invalidate_all(world);
        self.scores.clear();
    }

    /// Periodic cleanup. Afterwards no cache references a vanished or
    /// destroyed object.
    pub fn maintenance<W: WorldView + ?Sized>(&mut self, world: &W) -> MaintenanceReport {
        let report = MaintenanceReport {
            dropped_removed: self.dropped.cleanup_expired(world.current_tick(), world),
            scores_pruned: self.scores.prune(world),
            weapons_pruned: self.weapons.prune(world),
        };
        if report.total() > 0 {
            tracing::info!(
                dropped = report.dropped_removed,
                scores = report.scores_pruned,
                weapons = report.weapons_pruned,
                "Engine maintenance removed stale entries"
            );
        }
        report
    }

    /// Whether any cache references a vanished or destroyed object.
    #[must_use]
    pub fn contains_destroyed_entries<W: WorldView + ?Sized>(&self, world: &W) -> bool {
        self.weapons.contains_destroyed_entries(world)
            || self.scores.contains_destroyed_entries(world)
            || self.dropped.contains_destroyed_entries(world)
    }

    /// Current cache sizes.
    #[must_use]
    pub fn diagnostics<W: WorldView + ?Sized>(&self, world: &W) -> CacheDiagnostics {
        CacheDiagnostics {
            weapon_cache_size: self.weapons.size(),
            score_cache_size: self.scores.size(),
            dropped_records: self.dropped.len(),
            forced_pawns: self.forced.len(),
            has_orphans: self.contains_destroyed_entries(world),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colony::Colony;
    use crate::components::{Quality, WeaponDefId};
    use crate::host::ReservationTable;

    fn eligible_pawn() -> Pawn {
        Pawn::new(PawnId(1), "Ada", MapId(1), Vec2Fixed::ZERO)
    }

    #[test]
    fn test_eligibility_reasons() {
        let config = EngineConfig::default();
        assert_eq!(check_eligibility(Some(&eligible_pawn()), &config), Ok(()));
        assert_eq!(
            check_eligibility(None, &config),
            Err(IneligibleReason::PawnNotFound)
        );
        assert_eq!(
            check_eligibility(Some(&eligible_pawn()), &EngineConfig::disabled()),
            Err(IneligibleReason::ModDisabled)
        );

        let cases: [(fn(&mut Pawn), IneligibleReason); 8] = [
            (|p: &mut Pawn| p.capabilities.violence_capable = false, IneligibleReason::NotViolenceCapable),
            (|p: &mut Pawn| p.capabilities.drafted = true, IneligibleReason::Drafted),
            (|p: &mut Pawn| p.capabilities.downed = true, IneligibleReason::Downed),
            (|p: &mut Pawn| p.capabilities.mental_break = true, IneligibleReason::MentalState),
            (|p: &mut Pawn| p.membership = Membership::Temporary, IneligibleReason::TemporaryColonist),
            (|p: &mut Pawn| p.membership = Membership::Visitor, IneligibleReason::NotColonist),
            (|p: &mut Pawn| p.activity = Activity::EquippingWeapon, IneligibleReason::AlreadyEquipping),
            (|p: &mut Pawn| p.map = None, IneligibleReason::NotOnMap),
        ];
        for (mutate, expected) in cases {
            let mut pawn = eligible_pawn();
            mutate(&mut pawn);
            assert_eq!(check_eligibility(Some(&pawn), &config), Err(expected));
        }
    }

    #[test]
    fn test_temporary_colonists_allowed_by_config() {
        let mut pawn = eligible_pawn();
        pawn.membership = Membership::Temporary;
        let config = EngineConfig {
            allow_temporary_colonists: true,
            ..EngineConfig::default()
        };
        assert_eq!(check_eligibility(Some(&pawn), &config), Ok(()));
    }

    #[test]
    fn test_children_gate() {
        let mut child = eligible_pawn();
        child.age_years = 14;

        let config = EngineConfig::default();
        assert_eq!(check_eligibility(Some(&child), &config), Err(IneligibleReason::Child));

        let allowed = EngineConfig {
            allow_children_to_equip_weapons: true,
            children_min_age: 13,
            ..EngineConfig::default()
        };
        assert_eq!(check_eligibility(Some(&child), &allowed), Ok(()));

        child.age_years = 10;
        assert_eq!(check_eligibility(Some(&child), &allowed), Err(IneligibleReason::Child));
    }

    #[test]
    fn test_candidate_ranking_ties() {
        let mut list = vec![
            Candidate { id: WeaponId(3), score: Fixed::ONE, distance_squared: Fixed::from_num(4) },
            Candidate { id: WeaponId(2), score: Fixed::ONE, distance_squared: Fixed::from_num(4) },
            Candidate { id: WeaponId(1), score: Fixed::ONE, distance_squared: Fixed::from_num(9) },
            Candidate { id: WeaponId(9), score: Fixed::from_num(2), distance_squared: Fixed::from_num(100) },
        ];
        list.sort_by(Candidate::rank);
        let order: Vec<u64> = list.iter().map(|c| c.id.0).collect();
        assert_eq!(order, vec![9, 2, 3, 1]);
    }

    #[test]
    fn test_unarmed_pawn_gets_job_and_reservation() {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        let pawn = colony.spawn_colonist("Ada", map, Vec2Fixed::ZERO);
        let pistol = colony
            .spawn_weapon(&WeaponDefId::new("pistol"), Quality::Excellent, map, Vec2Fixed::from_tiles(1, 0))
            .unwrap();

        let mut arbiter = JobArbiter::new(EngineConfig::default());
        let mut reservations = ReservationTable::new();
        let job = arbiter.try_give_job(&colony, &mut reservations, pawn).unwrap();

        assert_eq!(job.target, pistol);
        assert_eq!(job.action, JobAction::Equip);
        assert_eq!(job.expiry_tick, Some(2500));
        assert_eq!(reservations.reserved_by(pistol), Some(pawn));
    }

    #[test]
    fn test_maintenance_clears_orphans() {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        let pawn = colony.spawn_colonist("Ada", map, Vec2Fixed::ZERO);
        let knife = colony
            .spawn_weapon(&WeaponDefId::new("knife"), Quality::Normal, map, Vec2Fixed::from_tiles(2, 2))
            .unwrap();

        let mut arbiter = JobArbiter::new(EngineConfig::default());
        arbiter.invalidate_all(&colony);
        arbiter.score(&colony, pawn, knife);
        arbiter.on_weapon_dropped(pawn, colony.weapon(knife).unwrap(), 0);

        colony.destroy_weapon(knife).unwrap();
        assert!(arbiter.diagnostics(&colony).has_orphans);

        let report = arbiter.maintenance(&colony);
        assert_eq!(report.total(), 3);
        let diagnostics = arbiter.diagnostics(&colony);
        assert!(!diagnostics.has_orphans);
        assert_eq!(diagnostics.weapon_cache_size, 0);
        assert_eq!(diagnostics.score_cache_size, 0);
        assert_eq!(diagnostics.dropped_records, 0);
    }
}
