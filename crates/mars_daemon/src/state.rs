use mars_control::ColonyDirector;
use mars_core::{
    CommandEnvelope, EventEnvelope, GameContent, GameState, MasterClock, MetricsFileWriter,
    MetricsSnapshot,
};
use parking_lot::Mutex;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Snapshots kept in memory for `/api/v1/metrics`.
pub const METRICS_HISTORY_LEN: usize = 1000;

pub struct SimState {
    pub game_state: GameState,
    pub content: GameContent,
    pub rng: ChaCha8Rng,
    pub clock: MasterClock,
    pub director: Option<ColonyDirector>,
    pub next_command_id: u64,
    /// Operator commands waiting for the next pulse.
    pub pending_commands: VecDeque<CommandEnvelope>,
    pub metrics_every: u64,
    pub metrics_history: VecDeque<MetricsSnapshot>,
    pub metrics_writer: Option<MetricsFileWriter>,
}

impl SimState {
    pub fn push_metrics(&mut self, snapshot: MetricsSnapshot) {
        if let Some(writer) = self.metrics_writer.as_mut() {
            if let Err(err) = writer.write_row(&snapshot) {
                tracing::error!("metrics write failed, disabling CSV output: {err}");
                self.metrics_writer = None;
            }
        }
        if self.metrics_history.len() == METRICS_HISTORY_LEN {
            self.metrics_history.pop_front();
        }
        self.metrics_history.push_back(snapshot);
    }
}

pub type SharedSim = Arc<Mutex<SimState>>;
pub type EventTx = broadcast::Sender<Vec<EventEnvelope>>;

#[derive(Clone)]
pub struct AppState {
    pub sim: SharedSim,
    pub event_tx: EventTx,
    pub paused: Arc<AtomicBool>,
    pub pulses_per_sec: f64,
    pub run_dir: Option<PathBuf>,
}

#[cfg(test)]
pub fn make_test_sim() -> SimState {
    use mars_core::test_fixtures::{base_content, base_state, make_rng};

    let content = base_content();
    let game_state = base_state(&content);
    let clock = MasterClock::new(
        game_state.meta.time,
        content.constants.time_ratio,
        content.constants.max_pulse_millisols,
    )
    .unwrap();
    SimState {
        game_state,
        content,
        rng: make_rng(),
        clock,
        director: None,
        next_command_id: 0,
        pending_commands: VecDeque::new(),
        metrics_every: 0,
        metrics_history: VecDeque::new(),
        metrics_writer: None,
    }
}
