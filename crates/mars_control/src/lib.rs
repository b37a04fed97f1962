//! Command sources that run the colony without an operator.

use std::collections::BTreeMap;

use mars_core::{
    AgentId, AgentState, Command, CommandEnvelope, CommandId, ContainerId, GameContent, GameState,
    Job, MarsTime, MissionKind, Placement, PrincipalId, Role, SettlementId, VehicleState,
};
use serde::{Deserialize, Serialize};

pub trait CommandSource {
    fn generate_commands(
        &mut self,
        state: &GameState,
        content: &GameContent,
        next_command_id: &mut u64,
    ) -> Vec<CommandEnvelope>;
}

/// Standing orders for every settlement:
/// 1. Give unassigned colonists the job the colony has fewest of.
/// 2. Start an emergency-supply run when a neighbour is short and this
///    settlement can spare the cargo.
/// 3. Otherwise start an exploration mission while unexplored sites remain.
///
/// A settlement with a mission out starts nothing. Mission starts are
/// attempted at most once per `mission_start_interval_millisols`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColonyDirector {
    last_attempt: BTreeMap<SettlementId, MarsTime>,
}

const DIRECTOR_OWNER: &str = "principal_director";

/// Preference order when job counts tie.
const JOB_ROTATION: [Job; 4] = [Job::Engineer, Job::Technician, Job::Areologist, Job::Pilot];

/// Allocates a command ID and builds a `CommandEnvelope` due this pulse.
pub fn make_cmd(
    owner: &PrincipalId,
    pulse: u64,
    next_id: &mut u64,
    command: Command,
) -> CommandEnvelope {
    let cmd_id = CommandId(format!("cmd_{:06}", *next_id));
    *next_id += 1;
    CommandEnvelope {
        id: cmd_id,
        issued_by: owner.clone(),
        issued_pulse: pulse,
        execute_at_pulse: pulse,
        command,
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn is_active_person(agent: &AgentState) -> bool {
    agent.alive && agent.is_person()
}

/// Jobs for unassigned colonists, balancing the current head count.
fn job_commands(
    state: &GameState,
    owner: &PrincipalId,
    next_id: &mut u64,
) -> Vec<CommandEnvelope> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for agent in state.agents.values().filter(|a| is_active_person(a)) {
        if let Some(slot) = JOB_ROTATION.iter().position(|j| *j == agent.job) {
            *counts.entry(slot).or_default() += 1;
        }
    }

    let mut unassigned: Vec<&AgentId> = state
        .agents
        .values()
        .filter(|a| is_active_person(a) && a.job == Job::Unassigned)
        .map(|a| &a.id)
        .collect();
    unassigned.sort();

    let mut commands = Vec::new();
    for agent_id in unassigned {
        let slot = (0..JOB_ROTATION.len())
            .min_by_key(|slot| (counts.get(slot).copied().unwrap_or(0), *slot))
            .unwrap_or(0);
        *counts.entry(slot).or_default() += 1;
        commands.push(make_cmd(
            owner,
            state.meta.pulse,
            next_id,
            Command::SetJob {
                agent_id: agent_id.clone(),
                job: JOB_ROTATION[slot],
            },
        ));
    }
    commands
}

/// Colonists at home, off duty and fit to leave, sorted commanders first.
fn free_crew<'a>(
    state: &'a GameState,
    content: &GameContent,
    settlement: &SettlementId,
) -> Vec<&'a AgentState> {
    let here = Placement::Settlement(settlement.clone());
    let mut crew: Vec<&AgentState> = state
        .agents
        .values()
        .filter(|a| {
            is_active_person(a)
                && &a.home == settlement
                && a.placement == here
                && a.mind.mission.is_none()
                && a.fit_for_eva(&content.constants)
        })
        .collect();
    crew.sort_by(|a, b| {
        (a.role != Role::Commander, &a.id).cmp(&(b.role != Role::Commander, &b.id))
    });
    crew
}

/// Best rover a mission from `settlement` could reserve right now.
fn ready_vehicle<'a>(state: &'a GameState, settlement: &SettlementId) -> Option<&'a VehicleState> {
    state
        .vehicles
        .values()
        .filter(|v| {
            v.parked_at.as_ref() == Some(settlement)
                && v.is_reservable()
                && !v.malfunctions.has_malfunction()
        })
        .max_by(|a, b| a.range_km.total_cmp(&b.range_km).then_with(|| b.id.cmp(&a.id)))
}

/// True when some settlement in range is short of an emergency resource
/// that `origin` holds enough of to send.
fn neighbour_in_need(
    state: &GameState,
    content: &GameContent,
    origin: &SettlementId,
    range_km: f64,
) -> bool {
    let Some(home) = state.settlements.get(origin) else {
        return false;
    };
    let max_km = range_km * content.constants.emergency_range_fraction;
    let home_stores = ContainerId::from(origin);
    state
        .settlements
        .values()
        .filter(|s| &s.id != origin && home.location.distance_km(&s.location) <= max_km)
        .any(|s| {
            let stores = ContainerId::from(&s.id);
            content.emergency_resources.iter().any(|def| {
                state.ledger.stored(&stores, &def.resource) < def.threshold_kg
                    && state.ledger.stored(&home_stores, &def.resource)
                        > def.reserve_at_origin_kg + def.required_kg
            })
        })
}

fn has_unexplored_sites(state: &GameState) -> bool {
    state
        .exploration_sites
        .iter()
        .any(|s| !s.explored && s.claimed_by.is_none())
}

fn mission_out(state: &GameState, settlement: &SettlementId) -> bool {
    state
        .missions
        .values()
        .any(|m| !m.is_done() && &m.origin == settlement)
}

// ---------------------------------------------------------------------------
// ColonyDirector
// ---------------------------------------------------------------------------

impl ColonyDirector {
    pub fn new() -> Self {
        Self::default()
    }

    fn due(&self, settlement: &SettlementId, now: MarsTime, interval: f64) -> bool {
        self.last_attempt
            .get(settlement)
            .is_none_or(|last| now.millisols_since(*last) >= interval)
    }

    fn mission_command(
        &mut self,
        state: &GameState,
        content: &GameContent,
        settlement: &SettlementId,
    ) -> Option<Command> {
        let now = state.meta.time;
        if mission_out(state, settlement)
            || !self.due(
                settlement,
                now,
                content.constants.mission_start_interval_millisols,
            )
        {
            return None;
        }
        let crew = free_crew(state, content, settlement);
        if crew.len() < content.constants.mission_min_members as usize {
            return None;
        }
        let vehicle = ready_vehicle(state, settlement)?;
        let kind = if neighbour_in_need(state, content, settlement, vehicle.range_km) {
            MissionKind::EmergencySupply
        } else if has_unexplored_sites(state) {
            MissionKind::Exploration
        } else {
            return None;
        };
        let initiator = crew.first()?.id.clone();

        self.last_attempt.insert(settlement.clone(), now);
        tracing::info!(settlement = %settlement, ?kind, initiator = %initiator, "director requests mission");
        Some(Command::StartMission { kind, initiator })
    }
}

impl CommandSource for ColonyDirector {
    fn generate_commands(
        &mut self,
        state: &GameState,
        content: &GameContent,
        next_command_id: &mut u64,
    ) -> Vec<CommandEnvelope> {
        let owner = PrincipalId(DIRECTOR_OWNER.to_string());
        let mut commands = job_commands(state, &owner, next_command_id);

        let mut settlements: Vec<&SettlementId> = state.settlements.keys().collect();
        settlements.sort();
        for settlement in settlements {
            if let Some(command) = self.mission_command(state, content, settlement) {
                commands.push(make_cmd(
                    &owner,
                    state.meta.pulse,
                    next_command_id,
                    command,
                ));
            }
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mars_core::test_fixtures::{
        add_settlement, base_content, base_state, person, robot, HOME, ROVER,
    };
    use mars_core::{Coordinates, Holder, MissionId, VehicleId};

    fn home() -> SettlementId {
        SettlementId(HOME.to_string())
    }

    fn starts(commands: &[CommandEnvelope]) -> Vec<(MissionKind, AgentId)> {
        commands
            .iter()
            .filter_map(|cmd| match &cmd.command {
                Command::StartMission { kind, initiator } => Some((*kind, initiator.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_director_starts_exploration_led_by_commander() {
        let content = base_content();
        let state = base_state(&content);
        let mut director = ColonyDirector::new();
        let mut next_id = 0u64;
        let commands = director.generate_commands(&state, &content, &mut next_id);

        assert_eq!(
            starts(&commands),
            vec![(
                MissionKind::Exploration,
                AgentId("agent_0001".to_string())
            )]
        );
        assert_eq!(next_id, commands.len() as u64);
    }

    #[test]
    fn test_director_waits_out_the_start_interval() {
        let content = base_content();
        let mut state = base_state(&content);
        let mut director = ColonyDirector::new();
        let mut next_id = 0u64;
        assert_eq!(
            starts(&director.generate_commands(&state, &content, &mut next_id)).len(),
            1
        );

        // Refused or not, the next attempt waits.
        assert!(starts(&director.generate_commands(&state, &content, &mut next_id)).is_empty());
        state.meta.time = state
            .meta
            .time
            .plus(content.constants.mission_start_interval_millisols);
        assert_eq!(
            starts(&director.generate_commands(&state, &content, &mut next_id)).len(),
            1
        );
    }

    #[test]
    fn test_director_prefers_emergency_supply() {
        let content = base_content();
        let mut state = base_state(&content);
        add_settlement(
            &mut state,
            "settlement_0002",
            Coordinates::new(0.0, 1.0),
            &[("food", 10.0)],
        );
        let mut director = ColonyDirector::new();
        let mut next_id = 0u64;
        let commands = director.generate_commands(&state, &content, &mut next_id);
        assert_eq!(starts(&commands)[0].0, MissionKind::EmergencySupply);
    }

    #[test]
    fn test_director_idles_without_sites_or_rover() {
        let content = base_content();
        let mut state = base_state(&content);
        for site in &mut state.exploration_sites {
            site.explored = true;
        }
        let mut director = ColonyDirector::new();
        let mut next_id = 0u64;
        assert!(starts(&director.generate_commands(&state, &content, &mut next_id)).is_empty());

        let mut state = base_state(&content);
        state
            .vehicles
            .get_mut(&VehicleId(ROVER.to_string()))
            .unwrap()
            .maintenance = Some(Holder::Agent(AgentId("agent_0003".to_string())));
        let mut director = ColonyDirector::new();
        assert!(starts(&director.generate_commands(&state, &content, &mut next_id)).is_empty());
    }

    #[test]
    fn test_director_does_not_stack_missions() {
        let content = base_content();
        let mut state = base_state(&content);
        let mission = MissionId("mission_0000".to_string());
        state.missions.insert(
            mission.clone(),
            mars_core::MissionState::new(
                mission,
                MissionKind::Exploration,
                home(),
                AgentId("agent_0001".to_string()),
                state.meta.time,
                2,
            ),
        );
        let mut director = ColonyDirector::new();
        let mut next_id = 0u64;
        assert!(starts(&director.generate_commands(&state, &content, &mut next_id)).is_empty());
    }

    #[test]
    fn test_director_needs_enough_fit_crew() {
        let content = base_content();
        let mut state = base_state(&content);
        for id in ["agent_0002", "agent_0003"] {
            state
                .agents
                .get_mut(&AgentId(id.to_string()))
                .unwrap()
                .condition
                .as_mut()
                .unwrap()
                .fatigue = content.constants.max_eva_fatigue;
        }
        let mut director = ColonyDirector::new();
        let mut next_id = 0u64;
        assert!(starts(&director.generate_commands(&state, &content, &mut next_id)).is_empty());
    }

    #[test]
    fn test_director_fills_the_scarcest_job() {
        let content = base_content();
        let mut state = base_state(&content);
        let newcomer = person(
            &mut state,
            &content,
            &home(),
            "agent_0004",
            Job::Unassigned,
            Role::Crew,
        );
        robot(&mut state, "agent_9000");
        let mut director = ColonyDirector::new();
        let mut next_id = 0u64;
        let commands = director.generate_commands(&state, &content, &mut next_id);

        let jobs: Vec<(&AgentId, Job)> = commands
            .iter()
            .filter_map(|cmd| match &cmd.command {
                Command::SetJob { agent_id, job } => Some((agent_id, *job)),
                _ => None,
            })
            .collect();
        assert_eq!(jobs, vec![(&newcomer, Job::Technician)]);
    }

    #[test]
    fn test_command_ids_are_unique() {
        let content = base_content();
        let mut state = base_state(&content);
        for n in 4..=6 {
            person(
                &mut state,
                &content,
                &home(),
                &format!("agent_{n:04}"),
                Job::Unassigned,
                Role::Crew,
            );
        }
        let mut director = ColonyDirector::new();
        let mut next_id = 7u64;
        let commands = director.generate_commands(&state, &content, &mut next_id);
        assert_eq!(commands.len(), 4);
        let ids: Vec<&str> = commands.iter().map(|c| c.id.0.as_str()).collect();
        assert_eq!(ids, ["cmd_000007", "cmd_000008", "cmd_000009", "cmd_000010"]);
        assert!(commands
            .iter()
            .all(|c| c.issued_by.0 == DIRECTOR_OWNER && c.execute_at_pulse == 0));
    }
}
