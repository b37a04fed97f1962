use super::*;
use crate::test_fixtures::{base_content, base_state, command, make_rng, next_pulse, run_pulses};

mod agent;
mod commands;
mod engine;
mod malfunction;
mod scheduler;

// --- Shared test helpers ------------------------------------------------

fn test_content() -> GameContent {
    base_content()
}

fn test_state(content: &GameContent) -> GameState {
    base_state(content)
}

fn agent(n: u32) -> AgentId {
    AgentId(format!("agent_{n:04}"))
}

fn home() -> SettlementId {
    SettlementId(test_fixtures::HOME.to_string())
}

fn home_stores() -> ContainerId {
    ContainerId::from(&home())
}

fn rover() -> VehicleId {
    VehicleId(test_fixtures::ROVER.to_string())
}

fn resource(id: &str) -> ResourceId {
    ResourceId(id.to_string())
}

fn debug_sink(state: &GameState) -> EventSink {
    EventSink::new(state.meta.pulse, EventLevel::Debug)
}

/// Creates a task and runs it in `step`-sized slices until it is done,
/// then ends it. Gives up after `max_steps`.
fn run_task(
    state: &mut GameState,
    content: &GameContent,
    agent_id: &AgentId,
    kind: TaskKind,
    step: f64,
    max_steps: usize,
) -> (Task, Vec<EventEnvelope>) {
    let mut rng = make_rng();
    let mut events = debug_sink(state);
    let mut task = task::create_task(state, content, agent_id, kind);
    for _ in 0..max_steps {
        if task.is_done() {
            break;
        }
        task::perform_task(state, content, agent_id, &mut task, step, &mut rng, &mut events)
            .unwrap();
    }
    task::end_task(state, agent_id, &mut task, &mut events);
    (task, events.into_events())
}

fn tick_once(
    state: &mut GameState,
    commands: &[CommandEnvelope],
    content: &GameContent,
    millisols: f64,
) -> Vec<EventEnvelope> {
    let mut rng = make_rng();
    let pulse = next_pulse(state, millisols);
    tick(state, commands, content, &mut rng, EventLevel::Normal, &pulse)
}

fn count_events(events: &[EventEnvelope], predicate: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|e| predicate(&e.event)).count()
}

/// Starts a mission directly, bypassing the command queue and the agents.
fn start(
    state: &mut GameState,
    content: &GameContent,
    kind: MissionKind,
    initiator: &AgentId,
) -> (Result<MissionId, MissionStatus>, Vec<EventEnvelope>) {
    let mut rng = make_rng();
    let mut events = debug_sink(state);
    let result = mission::start_mission(state, content, kind, initiator, &mut rng, &mut events);
    (result, events.into_events())
}
