//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the equip engine produces
//! identical decisions given identical worlds.
//!
//! # Testing Strategy
//!
//! Two hosts replaying the same colony must emit the same jobs in the same
//! order. Sources of non-determinism include:
//!
//! - **Floating-point math**: Scores use fixed-point arithmetic via
//!   [`autoequip_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Pawns, weapons and candidates are always visited in sorted id order.
//!
//! - **Cache state**: A warm score cache or weapon index must never change
//!   a decision, only its cost. Save/load rebuilds both from scratch.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual component determinism (scoring, ranking)
//! 2. **Property tests**: Random layouts must still produce deterministic outcomes
//! 3. **Integration tests**: Full colony scenarios are reproducible
//! 4. **Parallel tests**: Running N simulations in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use autoequip_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run ended in the same state.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic,
            "Engine is non-deterministic!\n\
             Runs: {}\n\
             Ticks: {}\n\
             Unique hashes: {} (expected 1)\n\
             All hashes: {:?}",
            self.hashes.len(),
            self.ticks,
            self.unique_hashes().len(),
            self.hashes
        );
    }
}

/// Result of parallel simulation runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each simulation.
    pub hashes: Vec<u64>,
    /// Number of ticks each simulation ran.
    pub ticks: u64,
    /// Number of simulations run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all simulations produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all simulations matched.
    ///
    /// # Panics
    ///
    /// Panics if simulations produced different hashes.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic(),
            "Parallel simulations diverged!\n\
             Simulations: {}\n\
             Ticks: {}\n\
             All hashes: {:?}",
            self.num_sims,
            self.ticks,
            self.hashes
        );
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of steps per run
/// * `setup` - Creates the initial state
/// * `step` - Advances the state by one tick
/// * `hash` - Computes the state hash
///
/// # Example
///
/// ```
/// use autoequip_test_utils::determinism::verify_determinism;
/// use autoequip_test_utils::fixtures::{fast_config, skirmish_colony};
/// use autoequip_core::simulation::Simulation;
///
/// let result = verify_determinism(
///     3,
///     50,
///     || Simulation::new(skirmish_colony().0, fast_config()),
///     |sim| {
///         sim.tick();
///     },
///     Simulation::state_hash,
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let hashes: Vec<u64> = (0..runs)
        .map(|_| {
            let mut state = setup();
            for _ in 0..ticks {
                step(&mut state);
            }
            hash(&state)
        })
        .collect();

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks,
    }
}

/// Run a [`Simulation`] twice from identical setups and compare final hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        Simulation::state_hash,
    )
    .is_deterministic
}

/// Run N simulations on scoped threads and collect final hashes.
///
/// Catches anything that depends on thread identity or allocation order.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations_scoped<F>(
    setup_fn: F,
    num_sims: usize,
    num_ticks: u64,
) -> ParallelSimResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    sim.run(num_ticks);
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two runs tick-by-tick, returning the first tick where they differ.
///
/// `Some(0)` means the setups themselves differ.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        tracing::warn!("Simulations diverged before the first tick");
        return Some(0);
    }

    for tick in 1..=num_ticks {
        let events1 = sim1.tick();
        let events2 = sim2.tick();
        if events1 != events2 || sim1.state_hash() != sim2.state_hash() {
            tracing::warn!(tick, ?events1, ?events2, "Simulations diverged");
            return Some(tick);
        }
    }

    None
}

/// Verify that saving mid-run and loading produces a simulation that
/// continues exactly like the original.
///
/// Runs `before` ticks, saves, then runs `after` more ticks on both the
/// original and the restored copy.
pub fn verify_save_load_determinism<F>(setup_fn: F, before: u64, after: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut original = setup_fn();
    original.run(before);

    let bytes = match original.save() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Save failed");
            return false;
        }
    };
    let mut restored = match Simulation::load(&bytes) {
        Ok(sim) => sim,
        Err(e) => {
            tracing::warn!(error = %e, "Load failed");
            return false;
        }
    };
    if restored.state_hash() != original.state_hash() {
        return false;
    }

    // Maintenance counts depend on how warm the score cache was, so only
    // the job streams are compared.
    for _ in 0..after {
        let a = original.tick();
        let b = restored.tick();
        if a.issued != b.issued || a.completed != b.completed || a.failed != b.failed {
            return false;
        }
    }
    original.state_hash() == restored.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for engine testing.
///
/// These generate random but reproducible colonies for property-based
/// testing of decisions and determinism.
pub mod strategies {
    use autoequip_core::colony::Colony;
    use autoequip_core::components::{MapId, PawnId, Quality, Skills, WeaponId};
    use autoequip_core::math::Vec2Fixed;
    use proptest::prelude::*;

    use crate::fixtures::{colonist, def, ground_weapon, standard_colony};

    /// Ids of the standard weapon definitions.
    pub const STANDARD_DEFS: [&str; 7] = [
        "pistol",
        "revolver",
        "assault_rifle",
        "sniper_rifle",
        "knife",
        "longsword",
        "mace",
    ];

    /// Generate a tile coordinate pair inside a 120x120 area around the origin.
    pub fn arb_tile() -> impl Strategy<Value = (i32, i32)> {
        (-60i32..60i32, -60i32..60i32)
    }

    /// Generate a position on whole tiles.
    pub fn arb_position() -> impl Strategy<Value = Vec2Fixed> {
        arb_tile().prop_map(|(x, y)| Vec2Fixed::from_tiles(x, y))
    }

    /// Generate any quality tier.
    pub fn arb_quality() -> impl Strategy<Value = Quality> {
        prop_oneof![
            Just(Quality::Awful),
            Just(Quality::Poor),
            Just(Quality::Normal),
            Just(Quality::Good),
            Just(Quality::Excellent),
            Just(Quality::Masterwork),
            Just(Quality::Legendary),
        ]
    }

    /// Generate skill levels (0-20).
    pub fn arb_skills() -> impl Strategy<Value = Skills> {
        (0u8..=20u8, 0u8..=20u8).prop_map(|(shooting, melee)| Skills::new(shooting, melee))
    }

    /// Generate one of the standard definition ids.
    pub fn arb_weapon_def() -> impl Strategy<Value = &'static str> {
        proptest::sample::select(STANDARD_DEFS.to_vec())
    }

    /// A weapon to place on the ground.
    #[derive(Debug, Clone)]
    pub struct WeaponSpec {
        /// Definition id.
        pub def: &'static str,
        /// Quality tier.
        pub quality: Quality,
        /// Tile position.
        pub at: (i32, i32),
        /// Whether it starts forbidden.
        pub forbidden: bool,
    }

    /// Generate a ground weapon.
    pub fn arb_weapon() -> impl Strategy<Value = WeaponSpec> {
        (arb_weapon_def(), arb_quality(), arb_tile(), proptest::bool::weighted(0.2)).prop_map(
            |(def, quality, at, forbidden)| WeaponSpec {
                def,
                quality,
                at,
                forbidden,
            },
        )
    }

    /// A colonist to spawn.
    #[derive(Debug, Clone)]
    pub struct PawnSpec {
        /// Tile position.
        pub at: (i32, i32),
        /// Skill levels.
        pub skills: Skills,
        /// Weapon already in hand, if any.
        pub armed_with: Option<(&'static str, Quality)>,
    }

    /// Generate a colonist.
    pub fn arb_pawn() -> impl Strategy<Value = PawnSpec> {
        (
            arb_tile(),
            arb_skills(),
            proptest::option::of((arb_weapon_def(), arb_quality())),
        )
            .prop_map(|(at, skills, armed_with)| PawnSpec {
                at,
                skills,
                armed_with,
            })
    }

    /// A full colony layout.
    #[derive(Debug, Clone)]
    pub struct ColonyLayout {
        /// Colonists.
        pub pawns: Vec<PawnSpec>,
        /// Ground weapons.
        pub weapons: Vec<WeaponSpec>,
    }

    impl ColonyLayout {
        /// Build the colony this layout describes.
        ///
        /// # Panics
        ///
        /// Panics if a standard definition is missing.
        #[must_use]
        pub fn build(&self) -> (Colony, MapId, Vec<PawnId>, Vec<WeaponId>) {
            let (mut colony, map) = standard_colony();
            let pawns = self
                .pawns
                .iter()
                .map(|spec| {
                    let pawn = colonist(&mut colony, map, spec.at, spec.skills);
                    if let Some((id, quality)) = spec.armed_with {
                        colony
                            .give_weapon(pawn, &def(id), quality)
                            .expect("standard definition");
                    }
                    pawn
                })
                .collect();
            let weapons = self
                .weapons
                .iter()
                .map(|spec| {
                    let weapon = ground_weapon(&mut colony, map, spec.def, spec.quality, spec.at);
                    if spec.forbidden {
                        colony
                            .set_forbidden(weapon, true)
                            .expect("weapon just spawned");
                    }
                    weapon
                })
                .collect();
            (colony, map, pawns, weapons)
        }
    }

    /// Generate a colony layout with up to the given numbers of pawns and weapons.
    pub fn arb_layout(max_pawns: usize, max_weapons: usize) -> impl Strategy<Value = ColonyLayout> {
        (
            proptest::collection::vec(arb_pawn(), 1..=max_pawns),
            proptest::collection::vec(arb_weapon(), 0..=max_weapons),
        )
            .prop_map(|(pawns, weapons)| ColonyLayout { pawns, weapons })
    }
}

#[cfg(test)]
mod tests {
    use super::strategies::arb_layout;
    use super::*;
    use crate::fixtures::{
        fast_config, ground_weapon, shooter, skirmish_colony, standard_colony,
    };
    use autoequip_core::components::Quality;
    use autoequip_core::config::EngineConfig;
    use proptest::prelude::*;

    fn skirmish() -> Simulation {
        Simulation::new(skirmish_colony().0, fast_config())
    }

    // =========================================================================
    // Basic determinism tests
    // =========================================================================

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
        assert_eq!(result.unique_hashes(), vec![100]);
    }

    #[test]
    fn test_empty_colony_determinism() {
        assert!(verify_simulation_determinism(
            || Simulation::new(standard_colony().0, EngineConfig::default()),
            100
        ));
    }

    #[test]
    fn test_skirmish_determinism() {
        let result = verify_determinism(
            5,
            200,
            skirmish,
            |sim| {
                sim.tick();
            },
            Simulation::state_hash,
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_find_divergence_on_deterministic_sim() {
        assert_eq!(find_first_divergence(skirmish, 100), None);
    }

    #[test]
    fn test_skirmish_issues_same_jobs() {
        let mut sim1 = skirmish();
        let mut sim2 = skirmish();
        let mut issued = 0;

        for tick in 0..100 {
            let events1 = sim1.tick();
            let events2 = sim2.tick();
            assert_eq!(events1.issued, events2.issued, "Issued jobs differ at tick {tick}");
            issued += events1.issued.len();
        }
        assert!(issued > 0, "the skirmish colony should produce equip jobs");
    }

    // =========================================================================
    // Save/load
    // =========================================================================

    #[test]
    fn test_save_load_preserves_empty_sim() {
        assert!(verify_save_load_determinism(
            || Simulation::new(standard_colony().0, EngineConfig::default()),
            0,
            10
        ));
    }

    #[test]
    fn test_save_load_mid_run() {
        // Save while jobs are still pending.
        assert!(verify_save_load_determinism(skirmish, 1, 100));
        assert!(verify_save_load_determinism(skirmish, 37, 100));
    }

    #[test]
    fn test_save_load_keeps_forced_weapon() {
        let setup = || {
            let (mut colony, map) = standard_colony();
            let pawn = shooter(&mut colony, map, (0, 0));
            let pistol = colony
                .give_weapon(pawn, &crate::fixtures::def("pistol"), Quality::Normal)
                .expect("pistol");
            ground_weapon(&mut colony, map, "sniper_rifle", Quality::Legendary, (2, 2));
            let mut sim = Simulation::new(colony, fast_config());
            sim.set_forced(pawn, pistol).expect("forced");
            sim
        };
        assert!(verify_save_load_determinism(setup, 5, 50));
    }

    // =========================================================================
    // Parallel
    // =========================================================================

    #[test]
    fn test_parallel_skirmish_simulations() {
        let result = run_parallel_simulations_scoped(skirmish, 4, 150);
        result.assert_deterministic();
        assert_eq!(result.hashes.len(), 4);
    }

    #[test]
    fn test_compute_hash_stable() {
        assert_eq!(compute_hash(&(1u64, "pistol")), compute_hash(&(1u64, "pistol")));
        assert_ne!(compute_hash(&1u64), compute_hash(&2u64));
    }

    // =========================================================================
    // Property tests
    // =========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_random_layouts_are_deterministic(layout in arb_layout(6, 12)) {
            let setup = || Simulation::new(layout.build().0, fast_config());
            prop_assert_eq!(find_first_divergence(setup, 60), None);
        }

        #[test]
        fn prop_save_load_roundtrip_is_exact(layout in arb_layout(4, 8), before in 0u64..20) {
            let setup = || Simulation::new(layout.build().0, fast_config());
            prop_assert!(verify_save_load_determinism(setup, before, 40));
        }
    }

    // =========================================================================
    // Stress
    // =========================================================================

    #[test]
    fn stress_test_many_pawns_and_weapons() {
        let setup = || {
            let (mut colony, map) = standard_colony();
            for i in 0..40 {
                shooter(&mut colony, map, (i % 20 * 3, i / 20 * 7));
            }
            for i in 0..120 {
                let def = strategies::STANDARD_DEFS[i % strategies::STANDARD_DEFS.len()];
                let x = i32::try_from(i).expect("small") * 7 % 90 - 45;
                let y = i32::try_from(i).expect("small") * 13 % 90 - 45;
                ground_weapon(&mut colony, map, def, Quality::Normal, (x, y));
            }
            Simulation::new(colony, fast_config())
        };
        let result = run_parallel_simulations_scoped(setup, 2, 120);
        result.assert_deterministic();
    }
}
