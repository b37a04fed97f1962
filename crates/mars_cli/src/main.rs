use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mars_control::{ColonyDirector, CommandSource};
use mars_core::{Event, EventEnvelope, EventLevel, GameContent, GameState, MasterClock};
use mars_world::{
    create_run_dir, generate_run_id, load_content, load_world, new_colony, validate_world,
    write_run_info, RunInfo,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "mars_cli", about = "Mars colony simulation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the colony for a fixed number of pulses.
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    #[arg(long)]
    pulses: u64,
    /// Generate the colony with this seed. Mutually exclusive with --state.
    #[arg(long, conflicts_with = "state_file")]
    seed: Option<u64>,
    /// Resume from a saved GameState JSON file. Mutually exclusive with --seed.
    #[arg(long = "state", conflicts_with = "seed")]
    state_file: Option<String>,
    #[arg(long, default_value = "./content")]
    content_dir: String,
    #[arg(long, default_value_t = 100)]
    print_every: u64,
    #[arg(long, default_value = "normal", value_parser = ["normal", "debug"])]
    event_level: String,
    /// Sample metrics every N pulses.
    #[arg(long, default_value_t = 60)]
    metrics_every: u64,
    /// Disable metrics collection to the runs/ directory.
    #[arg(long)]
    no_metrics: bool,
    /// Disable the colony director. Nothing will start missions or assign jobs.
    #[arg(long)]
    no_director: bool,
    /// Write the final GameState to this file.
    #[arg(long)]
    save_state: Option<PathBuf>,
}

impl RunArgs {
    fn event_level(&self) -> EventLevel {
        if self.event_level == "debug" {
            EventLevel::Debug
        } else {
            EventLevel::Normal
        }
    }
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

fn load_or_generate(args: &RunArgs, content: &GameContent) -> Result<(GameState, ChaCha8Rng)> {
    if let Some(path) = &args.state_file {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading state file: {path}"))?;
        let loaded: GameState =
            serde_json::from_str(&json).with_context(|| format!("parsing state file: {path}"))?;
        // Offset by the pulse so a resumed run does not replay the original draws.
        let rng = ChaCha8Rng::seed_from_u64(loaded.meta.seed ^ loaded.meta.pulse);
        return Ok((loaded, rng));
    }
    let world = load_world(&args.content_dir)?;
    validate_world(&world, content);
    let seed = args.seed.unwrap_or_else(rand::random);
    Ok(new_colony(content, &world, seed))
}

fn open_metrics(
    args: &RunArgs,
    state: &GameState,
    content: &GameContent,
) -> Result<Option<mars_core::MetricsFileWriter>> {
    if args.no_metrics {
        return Ok(None);
    }
    let run_id = generate_run_id(state.meta.seed);
    let run_dir = create_run_dir(Path::new("runs"), &run_id)?;
    let info = RunInfo {
        run_id,
        seed: state.meta.seed,
        content_version: content.content_version.clone(),
        runner: "mars_cli".to_string(),
        metrics_every: args.metrics_every,
        args: serde_json::json!({
            "pulses": args.pulses,
            "print_every": args.print_every,
            "director": !args.no_director,
        }),
    };
    write_run_info(&run_dir, &info)?;
    let writer = mars_core::MetricsFileWriter::new(run_dir.clone())
        .with_context(|| format!("opening metrics CSV in {}", run_dir.display()))?;
    println!("Run directory: {}", run_dir.display());
    Ok(Some(writer))
}

fn run(args: &RunArgs) -> Result<()> {
    let content = load_content(&args.content_dir)?;
    let (mut state, mut rng) = load_or_generate(args, &content)?;
    let mut metrics_writer = open_metrics(args, &state, &content)?;
    let mut clock = MasterClock::new(
        state.meta.time,
        content.constants.time_ratio,
        content.constants.max_pulse_millisols,
    )?;
    let mut director = ColonyDirector::new();
    let mut next_command_id = state.counters.next_command_id;
    let event_level = args.event_level();
    let print_every = args.print_every.max(1);
    let metrics_every = args.metrics_every.max(1);

    println!(
        "Starting colony: pulses={} seed={} settlements={} colonists={} content_version={}",
        args.pulses,
        state.meta.seed,
        state.settlements.len(),
        state.agents.values().filter(|a| a.is_person()).count(),
        content.content_version,
    );
    println!("{}", "-".repeat(80));

    for _ in 0..args.pulses {
        let commands = if args.no_director {
            Vec::new()
        } else {
            director.generate_commands(&state, &content, &mut next_command_id)
        };
        let Some(pulse) = clock.pulse_fixed(content.constants.pulse_millisols) else {
            tracing::warn!(time = %clock.time(), "clock produced no pulse; stopping");
            break;
        };
        let events = mars_core::tick(
            &mut state,
            &commands,
            &content,
            &mut rng,
            event_level,
            &pulse,
        );
        print_notable(&state, &events);

        if state.meta.pulse % print_every == 0 {
            print_status(&state);
        }
        if let Some(writer) = metrics_writer.as_mut() {
            if state.meta.pulse % metrics_every == 0 {
                let snapshot = mars_core::compute_metrics(&state, &content);
                writer.write_row(&snapshot).context("writing metrics row")?;
            }
        }
    }
    state.counters.next_command_id = next_command_id;

    println!("{}", "-".repeat(80));
    println!("Done. Final state at pulse {}:", state.meta.pulse);
    print_status(&state);

    if let Some(writer) = metrics_writer.as_mut() {
        writer.flush().context("final metrics flush")?;
        println!("Metrics written to runs/ directory.");
    }
    if let Some(path) = &args.save_state {
        let json = serde_json::to_string_pretty(&state).context("serializing state")?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("State saved to {}", path.display());
    }
    Ok(())
}

fn print_notable(state: &GameState, events: &[EventEnvelope]) {
    let now = state.meta.time;
    for envelope in events {
        match &envelope.event {
            Event::MissionStarted {
                mission_id,
                kind,
                members,
                vehicle,
            } => println!(
                "*** {now} MISSION {mission_id} STARTED: {kind:?} with {} crew in {vehicle} ***",
                members.len()
            ),
            Event::MissionEnded {
                mission_id,
                completed,
                ..
            } => {
                let outcome = if *completed { "COMPLETED" } else { "FAILED" };
                println!("*** {now} MISSION {mission_id} {outcome} ***");
            }
            Event::AgentDied { agent_id, cause } => {
                println!("*** {now} {agent_id} DIED: {cause} ***");
            }
            Event::MalfunctionOccurred {
                entity,
                malfunction,
                ..
            } => println!("*** {now} MALFUNCTION on {entity}: {malfunction} ***"),
            Event::CommandRejected { command_id, reason } => {
                tracing::warn!(%command_id, reason, "command rejected");
            }
            _ => {}
        }
    }
}

fn print_status(state: &GameState) {
    let alive = state
        .agents
        .values()
        .filter(|a| a.is_person() && a.alive)
        .count();
    let active = state.missions.values().filter(|m| !m.is_done()).count();
    let explored = state
        .exploration_sites
        .iter()
        .filter(|s| s.explored)
        .count();
    println!(
        "[pulse={pulse:05}  sol={sol}  millisol={millisol:07.3}]  \
         alive={alive:3}  missions_active={active}  explored={explored}/{sites}",
        pulse = state.meta.pulse,
        sol = state.meta.time.sol(),
        millisol = state.meta.time.millisol(),
        sites = state.exploration_sites.len(),
    );
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(&args),
    }
}
