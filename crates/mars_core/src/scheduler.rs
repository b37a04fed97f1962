//! Per-pulse agent loop: body, then tasks until the time budget is spent.

use rand::RngCore;

use crate::agent::Placement;
use crate::ledger::LEDGER_EPSILON;
use crate::mission;
use crate::task::{self, Task, TaskError};
use crate::{meta, AgentId, ContainerId, Event, EventSink, GameContent, GameState, TaskKind};

/// Budget left over below this is not worth another task.
const TIME_EPSILON: f64 = 1e-9;

/// Runs every living agent for `elapsed` millisols, in id order.
pub(crate) fn run_agents(
    state: &mut GameState,
    content: &GameContent,
    elapsed: f64,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) {
    let mut ids: Vec<AgentId> = state
        .agents
        .values()
        .filter(|a| a.alive)
        .map(|a| a.id.clone())
        .collect();
    ids.sort();
    for id in &ids {
        if accrue_condition(state, content, id, elapsed, events) {
            run_agent(state, content, id, elapsed, rng, events);
        }
    }
}

/// Advances the body. Returns false if the agent died.
fn accrue_condition(
    state: &mut GameState,
    content: &GameContent,
    agent_id: &AgentId,
    elapsed: f64,
    events: &mut EventSink,
) -> bool {
    let c = &content.constants;
    let Some(agent) = state.agents.get_mut(agent_id) else {
        return false;
    };
    let Some(condition) = agent.condition.as_mut() else {
        return true;
    };
    condition.accrue(elapsed, c);
    if !condition.is_starving(c) {
        return true;
    }
    kill(state, agent_id, "starvation", events);
    false
}

/// Ends the agent's task, drops what they carried where they are, and marks
/// them dead. Mission rosters drop them on the next mission update.
fn kill(state: &mut GameState, agent_id: &AgentId, cause: &str, events: &mut EventSink) {
    let task = state
        .agents
        .get_mut(agent_id)
        .and_then(|a| a.mind.task.take());
    if let Some(mut task) = task {
        task::end_task(state, agent_id, &mut task, events);
    }
    let Some(agent) = state.agents.get_mut(agent_id) else {
        return;
    };
    agent.alive = false;
    let drop_at = match &agent.placement {
        Placement::Outside => ContainerId::from(&agent.home),
        inside => inside
            .container()
            .unwrap_or_else(|| ContainerId::from(&agent.home)),
    };
    for (resource, kg) in state.ledger.remove_container(&ContainerId::from(agent_id)) {
        let stored = state.ledger.store(&drop_at, &resource, kg);
        if stored + LEDGER_EPSILON < kg {
            events.push(
                &mut state.counters,
                Event::ResourceOverflow {
                    container: drop_at.clone(),
                    resource,
                    lost_kg: kg - stored,
                },
            );
        }
    }
    tracing::warn!(agent = %agent_id, cause, "agent died");
    events.push(
        &mut state.counters,
        Event::AgentDied {
            agent_id: agent_id.clone(),
            cause: cause.to_string(),
        },
    );
}

fn run_agent(
    state: &mut GameState,
    content: &GameContent,
    agent_id: &AgentId,
    elapsed: f64,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) {
    let c = &content.constants;
    let mut remaining = elapsed;
    let mut selections = 0;
    while remaining > TIME_EPSILON {
        let current = state
            .agents
            .get_mut(agent_id)
            .and_then(|a| a.mind.task.take());
        let mut task = match current {
            Some(task) => task,
            None => {
                if selections >= c.max_task_selections_per_pulse {
                    break;
                }
                selections += 1;
                match start_next_task(state, content, agent_id, rng, events) {
                    Some(task) => task,
                    None => continue,
                }
            }
        };

        let phase_before = task.phase();
        let budget = remaining;
        match task::perform_task(state, content, agent_id, &mut task, budget, rng, events) {
            Ok(left) => remaining = left,
            Err(err) => fail_task(state, agent_id, &mut task, &err, events),
        }

        let idle = remaining + TIME_EPSILON >= budget && task.phase() == phase_before;
        if task.is_done() {
            task::end_task(state, agent_id, &mut task, events);
            reset_stall(state, agent_id);
            continue;
        }
        if !idle {
            reset_stall(state, agent_id);
            park(state, agent_id, task);
            continue;
        }
        if bump_stall(state, agent_id) >= c.stall_limit {
            tracing::debug!(agent = %agent_id, task = task.label(), "task stalled");
            task::end_task(state, agent_id, &mut task, events);
            reset_stall(state, agent_id);
            continue;
        }
        park(state, agent_id, task);
        break;
    }
}

/// Picks and creates the next task. Mission duties come before free choice.
fn start_next_task(
    state: &mut GameState,
    content: &GameContent,
    agent_id: &AgentId,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) -> Option<Task> {
    let kind = choose_task(state, content, agent_id, rng)?;
    let target = kind.target_label();
    let task = task::create_task(state, content, agent_id, kind);
    if task.is_done() {
        return None;
    }
    events.push(
        &mut state.counters,
        Event::TaskStarted {
            agent_id: agent_id.clone(),
            task_kind: task.label().to_string(),
            target,
        },
    );
    Some(task)
}

fn choose_task(
    state: &mut GameState,
    content: &GameContent,
    agent_id: &AgentId,
    rng: &mut dyn RngCore,
) -> Option<TaskKind> {
    let mission_id = state.agents.get(agent_id)?.mind.mission.clone();
    if let Some(mission_id) = mission_id {
        let duty = mission::perform_mission_phase(state, content, &mission_id, agent_id);
        if let Some(kind) = duty.filter(|k| task::is_eligible(state, content, agent_id, k)) {
            return Some(kind);
        }
    }
    let agent = state.agents.get(agent_id)?;
    meta::select_task(state, content, agent, rng)
}

/// A broken phase table takes down only this task.
fn fail_task(
    state: &mut GameState,
    agent_id: &AgentId,
    task: &mut Task,
    err: &TaskError,
    events: &mut EventSink,
) {
    tracing::warn!(agent = %agent_id, task = task.label(), %err, "task failed");
    events.push(
        &mut state.counters,
        Event::TaskFailed {
            agent_id: agent_id.clone(),
            task_kind: task.label().to_string(),
            reason: err.to_string(),
        },
    );
    task.done = true;
}

fn park(state: &mut GameState, agent_id: &AgentId, task: Task) {
    if let Some(agent) = state.agents.get_mut(agent_id) {
        agent.mind.task = Some(task);
    }
}

fn bump_stall(state: &mut GameState, agent_id: &AgentId) -> u32 {
    state.agents.get_mut(agent_id).map_or(0, |a| {
        a.mind.stalled_calls += 1;
        a.mind.stalled_calls
    })
}

fn reset_stall(state: &mut GameState, agent_id: &AgentId) {
    if let Some(agent) = state.agents.get_mut(agent_id) {
        agent.mind.stalled_calls = 0;
    }
}
