mod routes;
mod state;
mod tick_loop;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::Parser;
use mars_control::ColonyDirector;
use mars_core::{GameContent, GameState, MasterClock, MetricsFileWriter};
use mars_world::{
    create_run_dir, generate_run_id, load_content, load_world, new_colony, validate_world,
    write_run_info, RunInfo,
};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;

use crate::state::{AppState, SimState};

#[derive(Parser, Debug)]
#[command(name = "mars_daemon", about = "Mars colony simulation daemon")]
struct Args {
    #[arg(long, default_value_t = 3001)]
    port: u16,
    /// Pulses per real second. 0 runs fixed-size pulses as fast as possible.
    #[arg(long, default_value_t = 10.0)]
    pulses_per_sec: f64,
    #[arg(long)]
    max_pulses: Option<u64>,
    /// Generate the colony with this seed. Mutually exclusive with --state.
    #[arg(long, conflicts_with = "state_file")]
    seed: Option<u64>,
    /// Resume from a saved GameState JSON file.
    #[arg(long = "state", conflicts_with = "seed")]
    state_file: Option<String>,
    #[arg(long, default_value = "./content")]
    content_dir: String,
    /// Overrides the time ratio from constants.json.
    #[arg(long)]
    time_ratio: Option<f64>,
    #[arg(long, default_value = "http://localhost:5173")]
    cors_origin: String,
    #[arg(long, default_value_t = 60)]
    metrics_every: u64,
    /// Disable the runs/ directory (metrics CSV and saves).
    #[arg(long)]
    no_metrics: bool,
    #[arg(long)]
    no_director: bool,
}

fn load_state(args: &Args, content: &GameContent) -> Result<(GameState, ChaCha8Rng)> {
    if let Some(path) = &args.state_file {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading state file: {path}"))?;
        let loaded: GameState =
            serde_json::from_str(&json).with_context(|| format!("parsing state file: {path}"))?;
        let rng = ChaCha8Rng::seed_from_u64(loaded.meta.seed ^ loaded.meta.pulse);
        return Ok((loaded, rng));
    }
    let world = load_world(&args.content_dir)?;
    validate_world(&world, content);
    let seed = args.seed.unwrap_or_else(rand::random);
    Ok(new_colony(content, &world, seed))
}

fn open_run_dir(args: &Args, state: &GameState, content: &GameContent) -> Result<Option<PathBuf>> {
    if args.no_metrics {
        return Ok(None);
    }
    let run_id = generate_run_id(state.meta.seed);
    let run_dir = create_run_dir(Path::new("runs"), &run_id)?;
    let info = RunInfo {
        run_id,
        seed: state.meta.seed,
        content_version: content.content_version.clone(),
        runner: "mars_daemon".to_string(),
        metrics_every: args.metrics_every,
        args: serde_json::json!({
            "pulses_per_sec": args.pulses_per_sec,
            "max_pulses": args.max_pulses,
            "director": !args.no_director,
        }),
    };
    write_run_info(&run_dir, &info)?;
    Ok(Some(run_dir))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cors_origin: HeaderValue = args
        .cors_origin
        .parse()
        .with_context(|| format!("invalid --cors-origin: {}", args.cors_origin))?;

    let content = load_content(&args.content_dir)?;
    let (game_state, rng) = load_state(&args, &content)?;
    let run_dir = open_run_dir(&args, &game_state, &content)?;
    let metrics_writer = match &run_dir {
        Some(dir) => Some(
            MetricsFileWriter::new(dir.clone())
                .with_context(|| format!("opening metrics CSV in {}", dir.display()))?,
        ),
        None => None,
    };
    let clock = MasterClock::new(
        game_state.meta.time,
        args.time_ratio.unwrap_or(content.constants.time_ratio),
        content.constants.max_pulse_millisols,
    )?;

    tracing::info!(
        seed = game_state.meta.seed,
        settlements = game_state.settlements.len(),
        agents = game_state.agents.len(),
        "colony ready"
    );

    let next_command_id = game_state.counters.next_command_id;
    let sim = Arc::new(Mutex::new(SimState {
        game_state,
        content,
        rng,
        clock,
        director: (!args.no_director).then(ColonyDirector::new),
        next_command_id,
        pending_commands: VecDeque::new(),
        metrics_every: args.metrics_every,
        metrics_history: VecDeque::new(),
        metrics_writer,
    }));
    let (event_tx, _) = tokio::sync::broadcast::channel(256);
    let app_state = AppState {
        sim: sim.clone(),
        event_tx: event_tx.clone(),
        paused: Arc::new(AtomicBool::new(false)),
        pulses_per_sec: args.pulses_per_sec,
        run_dir,
    };

    tokio::spawn(tick_loop::run_pulse_loop(
        sim,
        event_tx,
        app_state.paused.clone(),
        args.pulses_per_sec,
        args.max_pulses,
    ));

    let app = routes::make_router_with_cors(app_state, cors_origin);
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("listening on http://{addr}");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
