//! Headless scenario runner for CI verification.
//!
//! Loads a [`Scenario`] (built-in or RON file), drives the equip engine's
//! reference [`Simulation`](autoequip_core::simulation::Simulation) for a
//! number of ticks, then checks the scenario's expectations.
//!
//! # Output
//!
//! - **stdout**: the [`ScenarioReport`] as JSON
//! - **stderr**: logs (human-readable)
//!
//! # Example
//!
//! ```bash
//! # Run a built-in scenario
//! cargo run -p autoequip_headless -- run --scenario contention
//!
//! # Run a scenario file for longer, with debug logs
//! cargo run -p autoequip_headless -- run --scenario scenarios/armory.ron --ticks 5000 --verbose
//! ```

pub mod runner;
pub mod scenario;

pub use runner::{ExpectationResult, Loadout, ScenarioReport, ScenarioRunner};
pub use scenario::{Expectation, Scenario, ScenarioError};
