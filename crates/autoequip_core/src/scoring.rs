//! Weapon suitability scoring.
//!
//! A score is the product of five factors:
//!
//! - **Base power** of the weapon definition
//! - **Quality** multiplier (strictly increasing with tier)
//! - **Condition**: `0.5 + 0.5 * hit_points / max_hit_points`
//! - **Skill**: `0.6 + 0.04 * level` for the skill matching the weapon class
//! - **Trait bias**: e.g. brawlers value ranged weapons at a quarter
//!
//! Scoring is pure and deterministic. Missing inputs and persona weapons
//! bonded to someone else score zero.

use serde::{Deserialize, Serialize};

use crate::components::{Pawn, Trait, Weapon, WeaponClass};
use crate::data::WeaponDef;
use crate::math::{percent, ratio, Fixed};

/// Individual factors behind a score, for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Definition base power.
    pub base: Fixed,
    /// Quality multiplier.
    pub quality: Fixed,
    /// Condition multiplier.
    pub condition: Fixed,
    /// Skill multiplier.
    pub skill: Fixed,
    /// Trait multiplier.
    pub traits: Fixed,
}

impl ScoreBreakdown {
    /// Product of all factors.
    #[must_use]
    pub fn total(&self) -> Fixed {
        self.base
            .saturating_mul(self.quality)
            .saturating_mul(self.condition)
            .saturating_mul(self.skill)
            .saturating_mul(self.traits)
    }
}

/// Condition multiplier for a weapon.
#[must_use]
pub fn condition_factor(weapon: &Weapon) -> Fixed {
    percent(50) + percent(50) * weapon.condition()
}

/// Skill multiplier for a pawn using a weapon class.
#[must_use]
pub fn skill_factor(pawn: &Pawn, class: WeaponClass) -> Fixed {
    let level = i64::from(pawn.skills.level_for(class));
    percent(60) + ratio(level * 4, 100)
}

/// Trait multiplier for a pawn using a weapon class.
#[must_use]
pub fn trait_factor(pawn: &Pawn, class: WeaponClass) -> Fixed {
    let mut factor = Fixed::ONE;
    match class {
        WeaponClass::Ranged => {
            if pawn.has_trait(Trait::Brawler) {
                factor *= percent(25);
            }
            if pawn.has_trait(Trait::TriggerHappy) {
                factor *= percent(110);
            }
            if pawn.has_trait(Trait::CarefulShooter) {
                factor *= percent(110);
            }
        }
        WeaponClass::Melee => {
            if pawn.has_trait(Trait::Brawler) {
                factor *= percent(125);
            }
        }
    }
    factor
}

/// Break a score into its factors. `None` when any input is missing or
/// the weapon is bonded to another pawn.
#[must_use]
pub fn score_breakdown(
    pawn: Option<&Pawn>,
    weapon: Option<&Weapon>,
    def: Option<&WeaponDef>,
) -> Option<ScoreBreakdown> {
    let (pawn, weapon, def) = (pawn?, weapon?, def?);
    if !weapon.usable_by(pawn.id) {
        return None;
    }
    Some(ScoreBreakdown {
        base: def.base_power,
        quality: weapon.quality.multiplier(),
        condition: condition_factor(weapon),
        skill: skill_factor(pawn, def.class),
        traits: trait_factor(pawn, def.class),
    })
}

/// Suitability of `weapon` for `pawn`. Zero for missing inputs.
#[must_use]
pub fn score(pawn: Option<&Pawn>, weapon: Option<&Weapon>, def: Option<&WeaponDef>) -> Fixed {
    score_breakdown(pawn, weapon, def).map_or(Fixed::ZERO, |b| b.total())
}
