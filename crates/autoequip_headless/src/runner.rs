//! Scenario runner: drives a [`Simulation`] and checks expectations.

use std::collections::BTreeMap;

use autoequip_core::arbiter::CacheDiagnostics;
use autoequip_core::components::{PawnId, Quality};
use autoequip_core::host::WorldView;
use autoequip_core::simulation::Simulation;
use serde::{Deserialize, Serialize};

use crate::scenario::{Expectation, Scenario, ScenarioError};

/// Outcome of one expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationResult {
    /// The expectation as written.
    pub expectation: Expectation,
    /// Whether it held.
    pub passed: bool,
    /// What was actually observed.
    pub observed: String,
}

/// What a pawn ended the run holding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    /// Weapon definition id, if armed.
    pub weapon: Option<String>,
    /// Weapon quality, if armed.
    pub quality: Option<Quality>,
}

/// Machine-readable result of a scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub scenario: String,
    /// Ticks simulated.
    pub ticks: u64,
    /// Whether every expectation held.
    pub passed: bool,
    /// Per-expectation outcomes.
    pub expectations: Vec<ExpectationResult>,
    /// Jobs issued.
    pub jobs_issued: usize,
    /// Jobs carried out.
    pub jobs_completed: usize,
    /// Jobs abandoned.
    pub jobs_failed: usize,
    /// Jobs issued per pawn name.
    pub jobs_by_pawn: BTreeMap<String, usize>,
    /// Final loadout per pawn name.
    pub loadouts: BTreeMap<String, Loadout>,
    /// Engine cache sizes at the end of the run.
    pub diagnostics: CacheDiagnostics,
    /// Final state hash, for determinism comparisons.
    pub state_hash: u64,
}

impl ScenarioReport {
    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Expectations that did not hold.
    pub fn failures(&self) -> impl Iterator<Item = &ExpectationResult> {
        self.expectations.iter().filter(|e| !e.passed)
    }
}

/// Runs one scenario to completion.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    scenario: Scenario,
    ticks: u64,
}

impl ScenarioRunner {
    /// Run for the scenario's own tick count.
    #[must_use]
    pub fn new(scenario: Scenario) -> Self {
        let ticks = scenario.ticks;
        Self { scenario, ticks }
    }

    /// Override the tick count.
    #[must_use]
    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.ticks = ticks;
        self
    }

    /// The scenario being run.
    #[must_use]
    pub const fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Build, simulate and evaluate.
    pub fn run(&self) -> Result<ScenarioReport, ScenarioError> {
        let built = self.scenario.build()?;
        let mut sim = built.simulation;
        let names: BTreeMap<PawnId, &str> = built
            .pawns
            .iter()
            .map(|(name, id)| (*id, name.as_str()))
            .collect();

        tracing::info!(scenario = %self.scenario.name, ticks = self.ticks, "Running scenario");

        let mut jobs_by_pawn: BTreeMap<String, usize> =
            built.pawns.keys().map(|name| (name.clone(), 0)).collect();
        let (mut issued, mut completed, mut failed) = (0, 0, 0);
        for _ in 0..self.ticks {
            let events = sim.tick();
            issued += events.issued.len();
            completed += events.completed.len();
            failed += events.failed.len();
            for job in &events.issued {
                if let Some(name) = names.get(&job.pawn) {
                    *jobs_by_pawn.entry((*name).to_string()).or_default() += 1;
                }
            }
        }

        let loadouts: BTreeMap<String, Loadout> = built
            .pawns
            .iter()
            .map(|(name, &id)| (name.clone(), loadout(&sim, id)))
            .collect();

        let expectations: Vec<ExpectationResult> = self
            .scenario
            .expectations
            .iter()
            .map(|e| check(e, &loadouts, &jobs_by_pawn))
            .collect();
        let passed = expectations.iter().all(|e| e.passed);

        for failure in expectations.iter().filter(|e| !e.passed) {
            tracing::warn!(
                expectation = ?failure.expectation,
                observed = %failure.observed,
                "Expectation failed"
            );
        }

        Ok(ScenarioReport {
            scenario: self.scenario.name.clone(),
            ticks: self.ticks,
            passed,
            expectations,
            jobs_issued: issued,
            jobs_completed: completed,
            jobs_failed: failed,
            jobs_by_pawn,
            loadouts,
            diagnostics: sim.arbiter().diagnostics(sim.colony()),
            state_hash: sim.state_hash(),
        })
    }
}

fn loadout(sim: &Simulation, pawn: PawnId) -> Loadout {
    let weapon = sim
        .colony()
        .pawn_equipped(pawn)
        .and_then(|id| sim.colony().weapon(id));
    Loadout {
        weapon: weapon.map(|w| w.def.to_string()),
        quality: weapon.map(|w| w.quality),
    }
}

fn describe(loadout: Option<&Loadout>) -> String {
    match loadout {
        Some(Loadout {
            weapon: Some(def),
            quality: Some(quality),
        }) => format!("{quality:?} {def}"),
        Some(_) => "unarmed".to_string(),
        None => "no such pawn".to_string(),
    }
}

fn check(
    expectation: &Expectation,
    loadouts: &BTreeMap<String, Loadout>,
    jobs: &BTreeMap<String, usize>,
) -> ExpectationResult {
    let held = loadouts.get(expectation.pawn());
    let (passed, observed) = match expectation {
        Expectation::Equipped { def, .. } => (
            held.and_then(|l| l.weapon.as_deref()) == Some(def.as_str()),
            describe(held),
        ),
        Expectation::EquippedQuality { quality, .. } => {
            (held.and_then(|l| l.quality) == Some(*quality), describe(held))
        }
        Expectation::Unarmed { .. } => (
            held.is_some_and(|l| l.weapon.is_none()),
            describe(held),
        ),
        Expectation::MaxJobsFor { pawn, max } => {
            let count = jobs.get(pawn).copied().unwrap_or(0);
            (count <= *max, format!("{count} jobs"))
        }
    };
    ExpectationResult {
        expectation: expectation.clone(),
        passed,
        observed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{PawnPlacement, WeaponPlacement};

    #[test]
    fn test_builtin_scenarios_pass() {
        for name in Scenario::BUILTIN {
            let report = ScenarioRunner::new(Scenario::builtin(name).unwrap())
                .run()
                .unwrap();
            let failures: Vec<_> = report.failures().collect();
            assert!(report.passed, "{name} failed: {failures:?}");
            assert!(!report.diagnostics.has_orphans);
        }
    }

    #[test]
    fn test_report_counts_jobs() {
        let report = ScenarioRunner::new(Scenario::unarmed_pickup()).run().unwrap();
        assert_eq!(report.jobs_issued, 1);
        assert_eq!(report.jobs_completed, 1);
        assert_eq!(report.jobs_failed, 0);
        assert_eq!(report.jobs_by_pawn["ada"], 1);
        assert_eq!(report.loadouts["ada"].weapon.as_deref(), Some("pistol"));
        assert_eq!(report.loadouts["ada"].quality, Some(Quality::Excellent));
    }

    #[test]
    fn test_too_few_ticks_fails_expectation() {
        // The first evaluation happens on tick 60.
        let report = ScenarioRunner::new(Scenario::unarmed_pickup())
            .with_ticks(30)
            .run()
            .unwrap();
        assert!(!report.passed);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.observed, "unarmed");
    }

    #[test]
    fn test_runs_are_deterministic() {
        let a = ScenarioRunner::new(Scenario::contention()).run().unwrap();
        let b = ScenarioRunner::new(Scenario::contention()).run().unwrap();
        assert_eq!(a.state_hash, b.state_hash);
        assert_eq!(a, b);
    }

    #[test]
    fn test_report_json_round_trip() {
        let report = ScenarioRunner::new(Scenario::raid()).run().unwrap();
        let json = report.to_json().unwrap();
        assert!(json.contains("\"scenario\": \"raid\""));
        let parsed: ScenarioReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.loadouts, report.loadouts);
        assert_eq!(parsed.passed, report.passed);
    }

    #[test]
    fn test_ineligible_pawn_stays_unarmed() {
        let mut drafted = PawnPlacement::new("gil", 0, 0, 15, 15);
        drafted.drafted = true;
        let scenario = Scenario {
            pawns: vec![drafted],
            weapons: vec![WeaponPlacement::new("longsword", Quality::Masterwork, 1, 1)],
            expectations: vec![
                Expectation::Unarmed { pawn: "gil".into() },
                Expectation::MaxJobsFor {
                    pawn: "gil".into(),
                    max: 0,
                },
            ],
            ..Scenario::unarmed_pickup()
        };
        let report = ScenarioRunner::new(scenario).run().unwrap();
        assert!(report.passed);
    }
}
