use rand::RngCore;

use crate::mission::{self, MissionKind};
use crate::{
    AgentId, BuildingId, Command, CommandEnvelope, Event, EventSink, GameContent, GameState,
    MissionId,
};

/// Applies every command due by the current pulse, in the order given.
///
/// A command that cannot be applied is dropped with a `CommandRejected`
/// event; it never aborts the pulse.
pub(crate) fn apply_commands(
    state: &mut GameState,
    commands: &[CommandEnvelope],
    content: &GameContent,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) {
    let current_pulse = state.meta.pulse;
    for envelope in commands {
        if envelope.execute_at_pulse > current_pulse {
            continue;
        }
        let outcome = match &envelope.command {
            Command::SetJob { agent_id, job } => set_job(state, agent_id, *job, events),
            Command::ReassignRole { agent_id, role } => {
                reassign_role(state, agent_id, *role, events)
            }
            Command::RenameBuilding { building_id, name } => {
                rename_building(state, building_id, name, events)
            }
            Command::StartMission { kind, initiator } => {
                start_mission(state, content, *kind, initiator, rng, events)
            }
            Command::AbortMission { mission_id } => abort_mission(state, mission_id),
        };
        if let Err(reason) = outcome {
            tracing::info!(command = %envelope.id, %reason, "command rejected");
            events.push(
                &mut state.counters,
                Event::CommandRejected {
                    command_id: envelope.id.clone(),
                    reason,
                },
            );
        }
    }
}

fn set_job(
    state: &mut GameState,
    agent_id: &AgentId,
    job: crate::Job,
    events: &mut EventSink,
) -> Result<(), String> {
    let agent = state
        .agents
        .get_mut(agent_id)
        .filter(|a| a.alive)
        .ok_or_else(|| format!("unknown agent {agent_id}"))?;
    if !agent.is_person() {
        return Err(format!("{agent_id} is a robot"));
    }
    agent.job = job;
    events.push(
        &mut state.counters,
        Event::JobChanged {
            agent_id: agent_id.clone(),
            job,
        },
    );
    Ok(())
}

fn reassign_role(
    state: &mut GameState,
    agent_id: &AgentId,
    role: crate::Role,
    events: &mut EventSink,
) -> Result<(), String> {
    let agent = state
        .agents
        .get_mut(agent_id)
        .filter(|a| a.alive)
        .ok_or_else(|| format!("unknown agent {agent_id}"))?;
    agent.role = role;
    events.push(
        &mut state.counters,
        Event::RoleChanged {
            agent_id: agent_id.clone(),
            role,
        },
    );
    Ok(())
}

fn rename_building(
    state: &mut GameState,
    building_id: &BuildingId,
    name: &str,
    events: &mut EventSink,
) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("building name is empty".to_string());
    }
    let building = state
        .buildings
        .get_mut(building_id)
        .ok_or_else(|| format!("unknown building {building_id}"))?;
    building.name = name.to_string();
    events.push(
        &mut state.counters,
        Event::BuildingRenamed {
            building_id: building_id.clone(),
            name: name.to_string(),
        },
    );
    Ok(())
}

fn start_mission(
    state: &mut GameState,
    content: &GameContent,
    kind: MissionKind,
    initiator: &AgentId,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) -> Result<(), String> {
    if !state.agents.contains_key(initiator) {
        return Err(format!("unknown agent {initiator}"));
    }
    // A refused mission still exists, ended, with its status recorded.
    mission::start_mission(state, content, kind, initiator, rng, events)
        .map(|_| ())
        .map_err(|status| format!("mission not started: {status:?}"))
}

fn abort_mission(state: &mut GameState, mission_id: &MissionId) -> Result<(), String> {
    mission::abort_mission(state, mission_id)
}
