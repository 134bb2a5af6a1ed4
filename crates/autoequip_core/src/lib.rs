//! # Autoequip Core
//!
//! Deterministic weapon-selection and equip-job arbitration for colony
//! simulations.
//!
//! Each decision tick the engine answers one question per pawn: should it
//! stop what it is doing and go equip a better weapon? The answer is an
//! [`job::EquipJob`] for the host scheduler, or a [`job::Decision`]
//! explaining why not.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering, no pathing
//! - No IO except explicit config and save helpers
//! - No system randomness
//! - No floating-point math in decisions (uses fixed-point)
//!
//! ## Crate Structure
//!
//! - [`arbiter`] - The decision state machine and its lifecycle hooks
//! - [`scoring`] / [`score_cache`] - Weapon suitability and its memoization
//! - [`weapon_cache`] - Spatial grid index of ground weapons
//! - [`forced`] / [`dropped`] - Player-forced weapons and drop cooldowns
//! - [`host`] - Traits the host world implements
//! - [`colony`] / [`simulation`] - Reference host and tick driver

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod arbiter;
pub mod colony;
pub mod components;
pub mod config;
pub mod data;
pub mod dropped;
pub mod error;
pub mod forced;
pub mod host;
pub mod job;
pub mod math;
pub mod score_cache;
pub mod scoring;
pub mod simulation;
pub mod weapon_cache;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::arbiter::{check_eligibility, CacheDiagnostics, JobArbiter, MaintenanceReport};
    pub use crate::colony::Colony;
    pub use crate::components::*;
    pub use crate::config::EngineConfig;
    pub use crate::data::{WeaponDef, WeaponDefRegistry};
    pub use crate::error::{ConfigError, EngineError, Result};
    pub use crate::forced::{ForcedSnapshot, ForcedWeaponRegistry};
    pub use crate::host::{OutfitFilter, RaidGate, ReservationManager, ReservationTable, WorldView};
    pub use crate::job::{Decision, EquipJob, IneligibleReason, JobAction, SuppressReason};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::simulation::{Simulation, TickEvents};
}
