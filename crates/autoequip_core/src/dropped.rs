//! Cooldown records for weapons a pawn recently dropped.
//!
//! When a pawn swaps weapons, the old one lands on the ground right next to
//! it. Without a cooldown the next evaluation could see it as a candidate
//! and pick it straight back up. Each record expires after a fixed number
//! of ticks.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::components::{PawnId, WeaponId};
use crate::host::WorldView;

/// One dropped-weapon record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedRecord {
    /// Pawn that dropped the weapon.
    pub dropped_by: PawnId,
    /// Tick the weapon was dropped.
    pub dropped_at: u64,
    /// First tick at which the record no longer applies.
    pub expires_at: u64,
}

impl DroppedRecord {
    /// Whether the record still applies at `now`.
    #[must_use]
    pub const fn is_active(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// Tracks recently dropped weapons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedItemTracker {
    records: HashMap<WeaponId, DroppedRecord>,
}

impl DroppedItemTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `pawn` dropped `item` at tick `now`. Replaces any
    /// earlier record for the same item.
    pub fn mark_dropped(&mut self, item: WeaponId, pawn: PawnId, now: u64, cooldown_ticks: u64) {
        tracing::trace!(item = %item, pawn = %pawn, now, cooldown_ticks, "Weapon marked dropped");
        self.records.insert(
            item,
            DroppedRecord {
                dropped_by: pawn,
                dropped_at: now,
                expires_at: now.saturating_add(cooldown_ticks),
            },
        );
    }

    /// Whether `item` is under an active cooldown at `now`.
    #[must_use]
    pub fn is_dropped(&self, item: WeaponId, now: u64) -> bool {
        self.records.get(&item).is_some_and(|r| r.is_active(now))
    }

    /// Whether `pawn` itself dropped `item` and the cooldown is active.
    #[must_use]
    pub fn is_dropped_by(&self, item: WeaponId, pawn: PawnId, now: u64) -> bool {
        self.records
            .get(&item)
            .is_some_and(|r| r.dropped_by == pawn && r.is_active(now))
    }

    /// Record for an item, active or not.
    #[must_use]
    pub fn record(&self, item: WeaponId) -> Option<&DroppedRecord> {
        self.records.get(&item)
    }

    /// Forget a single item.
    pub fn clear(&mut self, item: WeaponId) {
        self.records.remove(&item);
    }

    /// Remove expired records and records for weapons that no longer exist
    /// or are destroyed. Returns the number removed.
    pub fn cleanup_expired<W: WorldView + ?Sized>(&mut self, now: u64, world: &W) -> usize {
        let before = self.records.len();
        self.records.retain(|item, record| {
            record.is_active(now) && world.weapon(*item).is_some_and(|w| !w.is_destroyed())
        });
        before - self.records.len()
    }

    /// Every item under an active cooldown at `now`, in ascending id order.
    #[must_use]
    pub fn all_dropped(&self, now: u64) -> Vec<WeaponId> {
        let mut items: Vec<WeaponId> = self
            .records
            .iter()
            .filter(|(_, r)| r.is_active(now))
            .map(|(id, _)| *id)
            .collect();
        items.sort_unstable();
        items
    }

    /// Number of records, including expired ones not yet cleaned up.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether any record points at a vanished or destroyed weapon.
    #[must_use]
    pub fn contains_destroyed_entries<W: WorldView + ?Sized>(&self, world: &W) -> bool {
        self.records
            .keys()
            .any(|item| world.weapon(*item).map_or(true, |w| w.is_destroyed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colony::Colony;
    use crate::components::{Quality, WeaponDefId};
    use crate::math::Vec2Fixed;

    #[test]
    fn test_cooldown_window() {
        let mut tracker = DroppedItemTracker::new();
        tracker.mark_dropped(WeaponId(1), PawnId(1), 100, 600);

        assert!(tracker.is_dropped(WeaponId(1), 100));
        assert!(tracker.is_dropped(WeaponId(1), 699));
        assert!(!tracker.is_dropped(WeaponId(1), 700));
        assert!(!tracker.is_dropped(WeaponId(2), 100));
    }

    #[test]
    fn test_dropped_by_is_per_pawn() {
        let mut tracker = DroppedItemTracker::new();
        tracker.mark_dropped(WeaponId(1), PawnId(1), 0, 600);

        assert!(tracker.is_dropped_by(WeaponId(1), PawnId(1), 10));
        assert!(!tracker.is_dropped_by(WeaponId(1), PawnId(2), 10));
    }

    #[test]
    fn test_remark_refreshes_record() {
        let mut tracker = DroppedItemTracker::new();
        tracker.mark_dropped(WeaponId(1), PawnId(1), 0, 100);
        tracker.mark_dropped(WeaponId(1), PawnId(2), 90, 100);

        let record = tracker.record(WeaponId(1)).unwrap();
        assert_eq!(record.dropped_by, PawnId(2));
        assert_eq!(record.expires_at, 190);
    }

    #[test]
    fn test_cleanup_removes_expired_and_destroyed() {
        let mut colony = Colony::with_standard_defs();
        let map = colony.add_map();
        let pistol = WeaponDefId::new("pistol");
        let kept = colony
            .spawn_weapon(&pistol, Quality::Normal, map, Vec2Fixed::ZERO)
            .unwrap();
        let expired = colony
            .spawn_weapon(&pistol, Quality::Normal, map, Vec2Fixed::ZERO)
            .unwrap();
        let destroyed = colony
            .spawn_weapon(&pistol, Quality::Normal, map, Vec2Fixed::ZERO)
            .unwrap();

        let mut tracker = DroppedItemTracker::new();
        tracker.mark_dropped(kept, PawnId(1), 0, 600);
        tracker.mark_dropped(expired, PawnId(1), 0, 10);
        tracker.mark_dropped(destroyed, PawnId(1), 0, 600);
        colony.destroy_weapon(destroyed).unwrap();
        assert!(tracker.contains_destroyed_entries(&colony));

        assert_eq!(tracker.cleanup_expired(50, &colony), 2);
        assert_eq!(tracker.all_dropped(50), vec![kept]);
        assert!(!tracker.contains_destroyed_entries(&colony));
    }

    #[test]
    fn test_clear() {
        let mut tracker = DroppedItemTracker::new();
        tracker.mark_dropped(WeaponId(3), PawnId(1), 0, 600);
        tracker.clear(WeaponId(3));
        assert!(tracker.is_empty());
    }
}
