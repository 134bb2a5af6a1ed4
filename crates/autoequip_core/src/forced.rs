//! Player-forced weapons.
//!
//! Forcing is keyed by weapon *type*: the set of forced definition ids per
//! pawn is the source of truth and is what gets saved. The forced weapon
//! instance is only a transient convenience layered on top, so a save/load
//! round trip keeps a pawn attached to its forced weapon type even though
//! instance ids do not survive.
//!
//! Forcing an instance forces its type only for as long as that instance
//! exists. Types forced on their own, or restored from a save, stay until
//! removed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::components::{PawnId, Weapon, WeaponDefId, WeaponId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ForcedEntry {
    primary: Option<WeaponId>,
    /// Type forced along with `primary`.
    implicit: Option<WeaponDefId>,
    types: BTreeSet<WeaponDefId>,
}

impl ForcedEntry {
    fn is_empty(&self) -> bool {
        self.primary.is_none() && self.implicit.is_none() && self.types.is_empty()
    }

    fn covers(&self, def: &WeaponDefId) -> bool {
        self.types.contains(def) || self.implicit.as_ref() == Some(def)
    }

    fn all_types(&self) -> BTreeSet<WeaponDefId> {
        self.types.iter().chain(&self.implicit).cloned().collect()
    }
}

/// Persistable form of the registry: forced types per pawn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedSnapshot {
    /// Forced weapon types, per pawn, in ascending order.
    pub pawns: BTreeMap<PawnId, Vec<WeaponDefId>>,
}

impl ForcedSnapshot {
    /// Whether no pawn has anything forced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pawns.is_empty()
    }
}

/// Registry of forced weapons and weapon types per pawn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForcedWeaponRegistry {
    entries: BTreeMap<PawnId, ForcedEntry>,
}

impl ForcedWeaponRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force `weapon` for `pawn`. Also forces the weapon's type.
    pub fn set_forced(&mut self, pawn: PawnId, weapon: &Weapon) {
        let entry = self.entries.entry(pawn).or_default();
        entry.primary = Some(weapon.id);
        entry.implicit = Some(weapon.def.clone());
        tracing::debug!(pawn = %pawn, weapon = %weapon.id, def = %weapon.def, "Weapon forced");
    }

    /// Remove everything forced for `pawn`. Idempotent.
    pub fn clear_forced(&mut self, pawn: PawnId) {
        if self.entries.remove(&pawn).is_some() {
            tracing::debug!(pawn = %pawn, "Forced weapons cleared");
        }
    }

    /// Whether `weapon` is forced for `pawn`, either as the forced instance
    /// or by its type.
    #[must_use]
    pub fn is_forced(&self, pawn: PawnId, weapon: &Weapon) -> bool {
        self.entries.get(&pawn).is_some_and(|entry| {
            entry.primary == Some(weapon.id) || entry.covers(&weapon.def)
        })
    }

    /// Forced instance for `pawn`, if one is still known.
    #[must_use]
    pub fn forced_instance(&self, pawn: PawnId) -> Option<WeaponId> {
        self.entries.get(&pawn).and_then(|entry| entry.primary)
    }

    /// Force a weapon type for `pawn`.
    pub fn add_forced_type(&mut self, pawn: PawnId, def: WeaponDefId) {
        self.entries.entry(pawn).or_default().types.insert(def);
    }

    /// Stop forcing a weapon type for `pawn`. Idempotent.
    pub fn remove_forced_type(&mut self, pawn: PawnId, def: &WeaponDefId) {
        let Some(entry) = self.entries.get_mut(&pawn) else {
            return;
        };
        entry.types.remove(def);
        if entry.implicit.as_ref() == Some(def) {
            entry.implicit = None;
        }
        if entry.is_empty() {
            self.entries.remove(&pawn);
        }
    }

    /// Whether a weapon type is forced for `pawn`.
    #[must_use]
    pub fn is_type_forced(&self, pawn: PawnId, def: &WeaponDefId) -> bool {
        self.entries
            .get(&pawn)
            .is_some_and(|entry| entry.covers(def))
    }

    /// Forced types for `pawn`, in ascending order. Empty when nothing is
    /// forced.
    #[must_use]
    pub fn forced_types(&self, pawn: PawnId) -> Vec<WeaponDefId> {
        self.entries
            .get(&pawn)
            .map(|entry| entry.all_types().into_iter().collect())
            .unwrap_or_default()
    }

    /// Whether `pawn` has anything forced.
    #[must_use]
    pub fn has_forced(&self, pawn: PawnId) -> bool {
        self.entries.contains_key(&pawn)
    }

    /// Export the type-level state for saving.
    #[must_use]
    pub fn export(&self) -> ForcedSnapshot {
        ForcedSnapshot {
            pawns: self
                .entries
                .iter()
                .map(|(pawn, entry)| (*pawn, entry.all_types()))
                .filter(|(_, types)| !types.is_empty())
                .map(|(pawn, types)| (pawn, types.into_iter().collect()))
                .collect(),
        }
    }

    /// Replace the registry with a saved snapshot. Instance-level forcing
    /// is not restored; type-level forcing covers it.
    pub fn import(&mut self, snapshot: &ForcedSnapshot) {
        self.entries.clear();
        for (pawn, types) in &snapshot.pawns {
            if types.is_empty() {
                continue;
            }
            self.entries.insert(
                *pawn,
                ForcedEntry {
                    primary: None,
                    implicit: None,
                    types: types.iter().cloned().collect(),
                },
            );
        }
    }

    /// `pawn` swapped its forced instance `from` for `to`. Forcing follows
    /// the pawn onto a weapon of the same type.
    pub fn transfer(&mut self, pawn: PawnId, from: WeaponId, to: &Weapon) {
        let Some(entry) = self.entries.get_mut(&pawn) else {
            return;
        };
        if entry.primary == Some(from) && entry.implicit.as_ref() == Some(&to.def) {
            entry.primary = Some(to.id);
            tracing::debug!(pawn = %pawn, from = %from, to = %to.id, "Forced weapon replaced");
        }
    }

    /// A weapon left the world: drop any instance reference to it, and the
    /// type that was forced only because of it.
    pub fn on_weapon_removed(&mut self, weapon: WeaponId) {
        for entry in self.entries.values_mut() {
            if entry.primary == Some(weapon) {
                entry.primary = None;
                entry.implicit = None;
            }
        }
        self.entries.retain(|_, entry| !entry.is_empty());
    }

    /// A pawn left the world.
    pub fn on_pawn_removed(&mut self, pawn: PawnId) {
        self.entries.remove(&pawn);
    }

    /// Number of pawns with forced state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no pawn has forced state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Quality, WeaponState};

    fn weapon(id: u64, def: &str) -> Weapon {
        Weapon {
            id: WeaponId(id),
            def: WeaponDefId::new(def),
            quality: Quality::Normal,
            hit_points: 100,
            max_hit_points: 100,
            state: WeaponState::Equipped { pawn: PawnId(1) },
            forbidden: false,
            bonded_to: None,
        }
    }

    #[test]
    fn test_set_forced_covers_instance_and_type() {
        let mut registry = ForcedWeaponRegistry::new();
        let pawn = PawnId(1);
        let rifle = weapon(1, "assault_rifle");
        registry.set_forced(pawn, &rifle);

        assert!(registry.is_forced(pawn, &rifle));
        assert!(registry.is_forced(pawn, &weapon(2, "assault_rifle")));
        assert!(!registry.is_forced(pawn, &weapon(3, "pistol")));
        assert!(registry.is_type_forced(pawn, &WeaponDefId::new("assault_rifle")));
        assert_eq!(registry.forced_instance(pawn), Some(WeaponId(1)));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut registry = ForcedWeaponRegistry::new();
        let pawn = PawnId(1);
        registry.clear_forced(pawn);
        registry.set_forced(pawn, &weapon(1, "knife"));
        registry.clear_forced(pawn);
        registry.clear_forced(pawn);

        assert!(!registry.has_forced(pawn));
        assert!(!registry.is_forced(pawn, &weapon(1, "knife")));
        assert!(registry.forced_types(pawn).is_empty());
    }

    #[test]
    fn test_type_add_remove() {
        let mut registry = ForcedWeaponRegistry::new();
        let pawn = PawnId(4);
        let mace = WeaponDefId::new("mace");

        registry.add_forced_type(pawn, mace.clone());
        assert!(registry.is_type_forced(pawn, &mace));

        registry.remove_forced_type(pawn, &mace);
        registry.remove_forced_type(pawn, &mace);
        assert!(!registry.is_type_forced(pawn, &mace));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_export_import_preserves_types() {
        let mut registry = ForcedWeaponRegistry::new();
        registry.set_forced(PawnId(1), &weapon(10, "sniper_rifle"));
        registry.add_forced_type(PawnId(2), WeaponDefId::new("longsword"));
        registry.add_forced_type(PawnId(2), WeaponDefId::new("knife"));

        let snapshot = registry.export();
        assert_eq!(
            snapshot.pawns[&PawnId(2)],
            vec![WeaponDefId::new("knife"), WeaponDefId::new("longsword")]
        );

        let mut restored = ForcedWeaponRegistry::new();
        restored.import(&snapshot);

        // A fresh instance of the same type counts as forced after load.
        assert!(restored.is_forced(PawnId(1), &weapon(77, "sniper_rifle")));
        assert_eq!(restored.forced_instance(PawnId(1)), None);
        assert!(restored.is_type_forced(PawnId(2), &WeaponDefId::new("knife")));
        assert_eq!(restored.export(), snapshot);
    }

    #[test]
    fn test_weapon_removed_clears_instance_and_its_type() {
        let mut registry = ForcedWeaponRegistry::new();
        let pawn = PawnId(1);
        registry.set_forced(pawn, &weapon(5, "revolver"));
        registry.on_weapon_removed(WeaponId(5));

        assert_eq!(registry.forced_instance(pawn), None);
        assert!(!registry.is_type_forced(pawn, &WeaponDefId::new("revolver")));
        assert!(!registry.is_forced(pawn, &weapon(6, "revolver")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_weapon_removed_keeps_explicit_types() {
        let mut registry = ForcedWeaponRegistry::new();
        let pawn = PawnId(1);
        registry.add_forced_type(pawn, WeaponDefId::new("revolver"));
        registry.add_forced_type(pawn, WeaponDefId::new("knife"));
        registry.set_forced(pawn, &weapon(5, "revolver"));
        registry.on_weapon_removed(WeaponId(5));

        assert!(registry.is_type_forced(pawn, &WeaponDefId::new("revolver")));
        assert!(registry.is_type_forced(pawn, &WeaponDefId::new("knife")));

        registry.on_pawn_removed(pawn);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_transfer_follows_same_type_swap() {
        let mut registry = ForcedWeaponRegistry::new();
        let pawn = PawnId(1);
        registry.set_forced(pawn, &weapon(5, "pistol"));

        registry.transfer(pawn, WeaponId(5), &weapon(9, "assault_rifle"));
        assert_eq!(registry.forced_instance(pawn), Some(WeaponId(5)));

        registry.transfer(pawn, WeaponId(5), &weapon(8, "pistol"));
        assert_eq!(registry.forced_instance(pawn), Some(WeaponId(8)));

        // The swapped-out pistol going away no longer matters.
        registry.on_weapon_removed(WeaponId(5));
        assert!(registry.is_type_forced(pawn, &WeaponDefId::new("pistol")));
    }
}
