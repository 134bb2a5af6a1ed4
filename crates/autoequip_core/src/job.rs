//! Job values handed to the host scheduler, and the outcome of a single
//! evaluation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::components::{PawnId, WeaponId};
use crate::math::Fixed;

/// What a job asks the pawn to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobAction {
    /// Walk to the target and equip it as primary weapon.
    Equip,
}

/// A queued instruction for the host scheduler.
///
/// Emitting a job does not mutate the world. The host performs the swap
/// when the pawn reaches the target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquipJob {
    /// Pawn that should act.
    pub pawn: PawnId,
    /// Action to perform.
    pub action: JobAction,
    /// Weapon to equip.
    pub target: WeaponId,
    /// Tick the job was issued.
    pub issued_tick: u64,
    /// Tick after which the host should drop the job.
    pub expiry_tick: Option<u64>,
}

impl EquipJob {
    /// Whether the job has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry_tick.is_some_and(|expiry| now > expiry)
    }
}

/// Why a pawn cannot be automated right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IneligibleReason {
    /// The host has no such pawn.
    PawnNotFound,
    /// Automatic equipping is switched off.
    ModDisabled,
    /// Guests, traders and prisoners.
    NotColonist,
    /// Temporary colonist while those are excluded.
    TemporaryColonist,
    /// Too young.
    Child,
    /// Incapable of violence.
    NotViolenceCapable,
    /// Under direct player control.
    Drafted,
    /// Incapacitated.
    Downed,
    /// In a mental break.
    MentalState,
    /// Already on the way to equip something.
    AlreadyEquipping,
    /// Not on any map.
    NotOnMap,
}

/// Why an otherwise eligible pawn was held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuppressReason {
    /// A large hostile incursion is active on the pawn's map.
    Raid,
    /// The held weapon is forced and upgrades while forced are disabled.
    ForcedWeaponHeld,
}

/// Outcome of one evaluation of one pawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The pawn may not be automated.
    Ineligible(IneligibleReason),
    /// Evaluation was suppressed before looking at candidates.
    Suppressed(SuppressReason),
    /// No acceptable weapon in range.
    NoCandidate,
    /// The best candidate does not beat the held weapon by enough.
    BelowThreshold {
        /// Best candidate found.
        candidate: WeaponId,
        /// Its score.
        candidate_score: Fixed,
        /// Score of the held weapon.
        current_score: Fixed,
    },
    /// The chosen weapon stopped being available before emission.
    Stale(WeaponId),
    /// Another pawn holds the reservation.
    ReservationFailed(WeaponId),
    /// A job was emitted and the target reserved.
    Emit(EquipJob),
}

impl Decision {
    /// The emitted job, if any.
    #[must_use]
    pub fn into_job(self) -> Option<EquipJob> {
        match self {
            Self::Emit(job) => Some(job),
            _ => None,
        }
    }

    /// Borrow the emitted job, if any.
    #[must_use]
    pub const fn job(&self) -> Option<&EquipJob> {
        match self {
            Self::Emit(job) => Some(job),
            _ => None,
        }
    }

    /// Whether a job was emitted.
    #[must_use]
    pub const fn is_emit(&self) -> bool {
        matches!(self, Self::Emit(_))
    }

    /// Short machine-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Ineligible(_) => "ineligible",
            Self::Suppressed(_) => "suppressed",
            Self::NoCandidate => "no_candidate",
            Self::BelowThreshold { .. } => "below_threshold",
            Self::Stale(_) => "stale",
            Self::ReservationFailed(_) => "reservation_failed",
            Self::Emit(_) => "emit",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ineligible(reason) => write!(f, "ineligible ({reason:?})"),
            Self::Suppressed(reason) => write!(f, "suppressed ({reason:?})"),
            Self::NoCandidate => f.write_str("no candidate"),
            Self::BelowThreshold {
                candidate,
                candidate_score,
                current_score,
            } => write!(
                f,
                "{candidate} scores {candidate_score}, not enough over {current_score}"
            ),
            Self::Stale(target) => write!(f, "{target} went stale"),
            Self::ReservationFailed(target) => write!(f, "{target} already reserved"),
            Self::Emit(job) => write!(f, "equip {} for {}", job.target, job.pawn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> EquipJob {
        EquipJob {
            pawn: PawnId(1),
            action: JobAction::Equip,
            target: WeaponId(2),
            issued_tick: 10,
            expiry_tick: Some(20),
        }
    }

    #[test]
    fn test_into_job() {
        assert_eq!(Decision::Emit(job()).into_job(), Some(job()));
        assert_eq!(Decision::NoCandidate.into_job(), None);
        assert_eq!(
            Decision::Ineligible(IneligibleReason::Drafted).into_job(),
            None
        );
    }

    #[test]
    fn test_expiry() {
        let j = job();
        assert!(!j.is_expired(20));
        assert!(j.is_expired(21));

        let forever = EquipJob {
            expiry_tick: None,
            ..job()
        };
        assert!(!forever.is_expired(u64::MAX));
    }

    #[test]
    fn test_labels_and_display() {
        assert_eq!(Decision::Stale(WeaponId(3)).label(), "stale");
        assert_eq!(
            Decision::Emit(job()).to_string(),
            "equip weapon#2 for pawn#1"
        );
    }
}
