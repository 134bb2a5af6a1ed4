//! Headless auto-equip scenario runner.
//!
//! Runs the equip engine against a scenario without a host game and reports
//! the outcome as JSON. Designed for CI and for tuning settings.
//!
//! # Usage
//!
//! ```bash
//! # Run a built-in scenario
//! cargo run -p autoequip_headless -- run --scenario upgrade
//!
//! # List built-in scenarios
//! cargo run -p autoequip_headless -- list
//!
//! # Check that repeated runs agree
//! cargo run -p autoequip_headless -- verify --scenario contention --runs 5
//!
//! # Time the engine on a scenario
//! cargo run -p autoequip_headless -- benchmark --scenario scenarios/armory.ron --ticks 36000
//! ```
//!
//! Reports go to stdout, logs to stderr.

use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autoequip_headless::{Scenario, ScenarioRunner};

#[derive(Parser)]
#[command(name = "autoequip_headless")]
#[command(about = "Headless auto-equip scenario runner for CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print its report
    Run {
        /// Built-in scenario name or RON file path
        #[arg(short, long)]
        scenario: String,

        /// Override the scenario's tick count
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// List built-in scenarios
    List,

    /// Verify determinism by running a scenario several times
    Verify {
        /// Built-in scenario name or RON file path
        #[arg(short, long, default_value = "contention")]
        scenario: String,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },

    /// Run N ticks for benchmarking
    Benchmark {
        /// Built-in scenario name or RON file path
        #[arg(short, long, default_value = "contention")]
        scenario: String,

        /// Number of ticks to run
        #[arg(short, long, default_value = "36000")]
        ticks: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match cli.command {
        Commands::Run { scenario, ticks } => cmd_run(&scenario, ticks),
        Commands::List => cmd_list(),
        Commands::Verify { scenario, runs } => cmd_verify(&scenario, runs),
        Commands::Benchmark { scenario, ticks } => cmd_benchmark(&scenario, ticks),
    }
}

fn load(name_or_path: &str) -> Option<Scenario> {
    match Scenario::resolve(name_or_path) {
        Ok(scenario) => Some(scenario),
        Err(e) => {
            tracing::error!(error = %e, scenario = name_or_path, "Failed to load scenario");
            eprintln!("Failed to load scenario: {e}");
            None
        }
    }
}

/// Run a scenario and print the JSON report.
fn cmd_run(name_or_path: &str, ticks: Option<u64>) -> ExitCode {
    let Some(scenario) = load(name_or_path) else {
        return ExitCode::FAILURE;
    };

    let mut runner = ScenarioRunner::new(scenario);
    if let Some(ticks) = ticks {
        runner = runner.with_ticks(ticks);
    }

    let report = match runner.run() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Scenario failed to run: {e}");
            return ExitCode::FAILURE;
        }
    };

    match report.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to serialize report: {e}");
            return ExitCode::FAILURE;
        }
    }

    if report.passed {
        tracing::info!(scenario = %report.scenario, "Scenario passed");
        ExitCode::SUCCESS
    } else {
        tracing::error!(
            scenario = %report.scenario,
            failures = report.failures().count(),
            "Scenario failed"
        );
        ExitCode::FAILURE
    }
}

/// Print the built-in scenario names with their descriptions.
fn cmd_list() -> ExitCode {
    for name in Scenario::BUILTIN {
        if let Some(scenario) = Scenario::builtin(name) {
            println!("{name:<16} {}", scenario.description);
        }
    }
    ExitCode::SUCCESS
}

/// Run the same scenario several times and compare final hashes.
fn cmd_verify(name_or_path: &str, runs: u32) -> ExitCode {
    let Some(scenario) = load(name_or_path) else {
        return ExitCode::FAILURE;
    };

    tracing::info!(scenario = %scenario.name, runs, "Verifying determinism");

    let runner = ScenarioRunner::new(scenario);
    let mut hashes = Vec::with_capacity(runs as usize);
    for _ in 0..runs.max(1) {
        match runner.run() {
            Ok(report) => hashes.push(report.state_hash),
            Err(e) => {
                eprintln!("Scenario failed to run: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if hashes.windows(2).all(|pair| pair[0] == pair[1]) {
        eprintln!("PASS: All {} runs produced identical results", hashes.len());
        eprintln!("  State hash: {:016x}", hashes[0]);
        ExitCode::SUCCESS
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        for (i, hash) in hashes.iter().enumerate() {
            eprintln!("  Run {i}: {hash:016x}");
        }
        ExitCode::FAILURE
    }
}

/// Time a scenario's simulation.
fn cmd_benchmark(name_or_path: &str, ticks: u64) -> ExitCode {
    let Some(scenario) = load(name_or_path) else {
        return ExitCode::FAILURE;
    };

    let built = match scenario.build() {
        Ok(built) => built,
        Err(e) => {
            eprintln!("Scenario failed to build: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut sim = built.simulation;

    eprintln!("Starting benchmark with {} pawns", built.pawns.len());
    eprintln!("Running {ticks} ticks...");

    let start = Instant::now();
    let mut jobs = 0usize;
    for _ in 0..ticks {
        jobs += sim.tick().issued.len();
    }
    let elapsed = start.elapsed();
    let tps = ticks as f64 / elapsed.as_secs_f64().max(f64::EPSILON);

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BENCHMARK RESULTS");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Ticks: {ticks}");
    eprintln!("Duration: {:.3}s", elapsed.as_secs_f64());
    eprintln!("Ticks/second: {tps:.1}");
    eprintln!("Jobs issued: {jobs}");
    eprintln!("State hash: {:016x}", sim.state_hash());
    ExitCode::SUCCESS
}
