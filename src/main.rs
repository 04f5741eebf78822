use anyhow::Result;
use clap::Parser;
use lockcut::{BANNER, Simulation, SimulationConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Lockcut - Resource contention simulator with snapshot-based deadlock detection"
)]
struct Cli {
    /// JSON file with simulation parameters; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of client processes
    #[arg(short, long)]
    processes: Option<usize>,

    /// Number of lockable resources
    #[arg(short, long)]
    resources: Option<usize>,

    /// Seed for the random workload
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many snapshots even without a deadlock
    #[arg(long)]
    max_snapshots: Option<u64>,

    /// Write the JSON-lines event log here ("{timestamp}" is substituted)
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Print events to stderr as they happen
    #[arg(long, conflicts_with = "log")]
    console: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_file(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(processes) = cli.processes {
        config.num_processes = processes;
    }
    if let Some(resources) = cli.resources {
        config.num_resources = resources;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if cli.max_snapshots.is_some() {
        config.max_snapshots = cli.max_snapshots;
    }

    println!("{BANNER}");
    println!(
        "Simulating {} processes over {} resources, snapshot every {} ms",
        config.num_processes, config.num_resources, config.snapshot_period_ms
    );

    let mut simulation = Simulation::new(config);
    if let Some(path) = &cli.log {
        simulation = simulation.with_log(path);
    } else if cli.console {
        simulation = simulation.with_console_log();
    }

    let report = simulation.run()?;

    match &report.deadlock {
        Some(info) => {
            println!("Deadlock found by snapshot {}", info.snapshot_id);
            println!("  cycle: {:?}", info.process_cycle);
            for (process, resource) in &info.process_waiting_for_resources {
                println!("  Process-{process} waits for resource {resource}");
            }
        }
        None => println!("No deadlock after {} snapshot(s)", report.snapshots),
    }
    if let Some(path) = &report.log_path {
        println!("Event log written to {}", path.display());
    }
    Ok(())
}
