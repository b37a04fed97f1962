//! Per-pulse mission coordination and teardown.

use rand::{Rng, RngCore};

use super::{
    cargo_remaining, determine_new_phase, evaluate_predicates, site_work_complete,
    vehicle_loaded, MissionKind, MissionPhase, MissionState, MissionStatus, NavPointKind,
};
use crate::agent::Placement;
use crate::ledger::{release, EquipmentKind, Holder, LEDGER_EPSILON};
use crate::task::TaskKind;
use crate::{
    AgentId, ContainerId, Event, EventSink, GameContent, GameState, MissionId, SettlementId,
    VehicleId,
};

/// Advances every active mission by at most one phase, in id order.
///
/// Runs after all agents have acted this pulse. Missions carrying a terminal
/// status are ended instead of advanced.
pub(crate) fn update_missions(
    state: &mut GameState,
    content: &GameContent,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) {
    let mut ids: Vec<MissionId> = state
        .missions
        .values()
        .filter(|m| !m.is_done())
        .map(|m| m.id.clone())
        .collect();
    ids.sort();
    for id in &ids {
        update_mission(state, content, id, rng, events);
    }
}

fn update_mission(
    state: &mut GameState,
    content: &GameContent,
    id: &MissionId,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) {
    prune_roster(state, id, events);
    check_supply_shortfall(state, id);

    let Some(mission) = state.missions.get(id) else {
        return;
    };
    if mission.has_terminal_status() {
        end_mission(state, id, events);
        return;
    }
    let predicates = evaluate_predicates(state, content, mission);
    let from = mission.phase;
    let to = determine_new_phase(mission.kind, from, &predicates);
    if to == from {
        return;
    }

    leave_phase(state, content, id, from, rng, events);
    let now = state.meta.time;
    if let Some(mission) = state.missions.get_mut(id) {
        mission.phase = to;
        mission.phase_started = now;
        if to == MissionPhase::Travelling {
            mission.arrived = false;
        }
    }
    tracing::debug!(mission = %id, ?from, ?to, "mission phase changed");
    events.push(
        &mut state.counters,
        Event::MissionPhaseChanged {
            mission_id: id.clone(),
            from,
            to,
        },
    );
    if to == MissionPhase::Completed {
        end_mission(state, id, events);
    }
}

/// Drops members who died or left, and flags a crew that fell below minimum.
fn prune_roster(state: &mut GameState, id: &MissionId, events: &mut EventSink) {
    let Some(mission) = state.missions.get(id) else {
        return;
    };
    let gone: Vec<AgentId> = mission
        .members
        .iter()
        .filter(|member| {
            state
                .agents
                .get(*member)
                .is_none_or(|a| !a.alive || a.mind.mission.as_ref() != Some(id))
        })
        .cloned()
        .collect();
    if gone.is_empty() {
        return;
    }

    if let Some(mission) = state.missions.get_mut(id) {
        mission.members.retain(|m| !gone.contains(m));
        mission.add_status(MissionStatus::MemberLost);
        if mission.members.len() < mission.min_members {
            mission.add_status(MissionStatus::NotEnoughMembers);
        }
    }
    for agent_id in gone {
        tracing::info!(mission = %id, agent = %agent_id, "member left mission");
        events.push(
            &mut state.counters,
            Event::MemberLeftMission {
                mission_id: id.clone(),
                agent_id,
            },
        );
    }
}

/// Before departure, the origin must still be able to cover what is not aboard.
fn check_supply_shortfall(state: &mut GameState, id: &MissionId) {
    let Some(mission) = state.missions.get(id) else {
        return;
    };
    if mission.phase != MissionPhase::Embarking {
        return;
    }
    let Some(vehicle) = &mission.vehicle else {
        return;
    };
    let hold = ContainerId::from(vehicle);
    let stores = ContainerId::from(&mission.origin);
    let short = mission.supplies.iter().any(|item| {
        let missing = item.kg - state.ledger.stored(&hold, &item.resource);
        missing > state.ledger.stored(&stores, &item.resource) + LEDGER_EPSILON
    });
    if short {
        if let Some(mission) = state.missions.get_mut(id) {
            mission.add_status(MissionStatus::CannotLoadResources);
        }
    }
}

/// Work done as a mission leaves a phase.
fn leave_phase(
    state: &mut GameState,
    content: &GameContent,
    id: &MissionId,
    from: MissionPhase,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) {
    match from {
        MissionPhase::ExploringSite => finish_site(state, content, id, rng, events),
        MissionPhase::UnloadingSupplies => finish_delivery(state, id, events),
        _ => {}
    }
}

fn finish_site(
    state: &mut GameState,
    content: &GameContent,
    id: &MissionId,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) {
    let Some(mission) = state.missions.get_mut(id) else {
        return;
    };
    mission.site_work_done = 0.0;
    let Some(NavPointKind::Site(site_id)) = mission.route.last_reached().map(|p| p.kind.clone())
    else {
        return;
    };
    let Some(site) = state.exploration_sites.iter_mut().find(|s| s.id == site_id) else {
        return;
    };
    let variance = content.constants.mineral_estimation_variance;
    let noise = if variance > 0.0 {
        rng.gen_range(-variance..=variance)
    } else {
        0.0
    };
    site.explored = true;
    site.claimed_by = None;
    site.estimated_value = (site.estimated_value * (1.0 + noise)).max(0.0);
    let estimated_value = site.estimated_value;
    tracing::info!(mission = %id, site = %site_id, estimated_value, "site explored");
    events.push(
        &mut state.counters,
        Event::SiteExplored {
            mission_id: id.clone(),
            site_id,
            estimated_value,
        },
    );
}

/// Records the delivery and hands any towed vehicle over to the target.
fn finish_delivery(state: &mut GameState, id: &MissionId, events: &mut EventSink) {
    let Some(mission) = state.missions.get_mut(id) else {
        return;
    };
    let Some(target) = mission.target.clone() else {
        return;
    };
    let delivered = mission.delivered.clone();
    let towed = mission.towed_vehicle.take();

    if let Some(towed) = towed {
        let location = state.settlements.get(&target).map(|s| s.location);
        if let Some(vehicle) = state.vehicles.get_mut(&towed) {
            if let Err(err) = release(
                &mut vehicle.reserved_by,
                &towed.0,
                &Holder::Mission(id.clone()),
            ) {
                tracing::warn!(mission = %id, %err, "towed vehicle was not reserved");
            }
            vehicle.home = target.clone();
            vehicle.parked_at = Some(target.clone());
            if let Some(location) = location {
                vehicle.location = location;
            }
            tracing::info!(mission = %id, vehicle = %towed, settlement = %target, "vehicle handed over");
        }
    }
    events.push(
        &mut state.counters,
        Event::SuppliesDelivered {
            mission_id: id.clone(),
            settlement_id: target,
            delivered,
        },
    );
}

/// Adds `AbortedByCommand`. The mission is torn down on the next update.
pub(crate) fn abort_mission(state: &mut GameState, id: &MissionId) -> Result<(), String> {
    let mission = state
        .missions
        .get_mut(id)
        .ok_or_else(|| format!("unknown mission {id}"))?;
    if mission.is_done() {
        return Err(format!("mission {id} already ended"));
    }
    mission.add_status(MissionStatus::AbortedByCommand);
    Ok(())
}

/// Terminal transition for a mission. Idempotent.
///
/// Releases the vehicles, returns everything aboard to the origin store,
/// brings the crew home and frees claimed sites.
pub(crate) fn end_mission(state: &mut GameState, id: &MissionId, events: &mut EventSink) {
    let Some(mission) = state.missions.get_mut(id) else {
        return;
    };
    if mission.is_done() {
        return;
    }
    mission.mark_done();
    let mission = mission.clone();
    let origin = mission.origin.clone();
    let home = state.settlements.get(&origin).map(|s| s.location);

    let vehicles: Vec<VehicleId> = mission
        .vehicle
        .iter()
        .chain(mission.towed_vehicle.iter())
        .cloned()
        .collect();
    for vehicle_id in &vehicles {
        recall_vehicle(state, id, vehicle_id, &origin);
    }
    for member in &mission.members {
        recall_member(state, id, member, &origin);
    }
    for site in &mut state.exploration_sites {
        if site.claimed_by.as_ref() == Some(id) {
            site.claimed_by = None;
        }
    }
    if let Some(home) = home {
        for vehicle_id in &vehicles {
            if let Some(vehicle) = state.vehicles.get_mut(vehicle_id) {
                vehicle.location = home;
            }
        }
    }

    let completed = mission.phase == MissionPhase::Completed && !mission.has_terminal_status();
    let statuses = mission.statuses.to_vec();
    tracing::info!(mission = %id, completed, ?statuses, "mission ended");
    events.push(
        &mut state.counters,
        Event::MissionEnded {
            mission_id: id.clone(),
            statuses,
            completed,
        },
    );
}

fn recall_vehicle(
    state: &mut GameState,
    id: &MissionId,
    vehicle_id: &VehicleId,
    origin: &SettlementId,
) {
    let holder = Holder::Mission(id.clone());
    if let Some(vehicle) = state.vehicles.get_mut(vehicle_id) {
        if vehicle.reserved_by.as_ref() == Some(&holder) {
            if let Err(err) = release(&mut vehicle.reserved_by, &vehicle_id.0, &holder) {
                tracing::warn!(mission = %id, %err, "vehicle release failed");
            }
        }
        vehicle.parked_at = Some(origin.clone());
    }

    let hold = ContainerId::from(vehicle_id);
    let stores = ContainerId::from(origin);
    for (resource, kg) in state.ledger.contents(&hold) {
        let moved = state.ledger.transfer_available(&hold, &stores, &resource, kg);
        if moved + LEDGER_EPSILON < kg {
            tracing::warn!(mission = %id, %resource, left = kg - moved, "origin stores full");
        }
    }
    for suit in state.ledger.equipment_in(EquipmentKind::EvaSuit, &hold) {
        if let Err(err) = state.ledger.move_equipment(&suit, stores.clone()) {
            tracing::warn!(mission = %id, %err, "suit not returned");
        }
    }
}

fn recall_member(state: &mut GameState, id: &MissionId, member: &AgentId, origin: &SettlementId) {
    let home = state.settlements.get(origin).map(|s| s.location);
    let Some(agent) = state.agents.get_mut(member) else {
        return;
    };
    if agent.mind.mission.as_ref() == Some(id) {
        agent.mind.mission = None;
    }
    if matches!(agent.placement, Placement::Vehicle(_)) && agent.alive {
        agent.placement = Placement::Settlement(origin.clone());
        if let Some(home) = home {
            agent.location = home;
        }
    }
}

/// The task a member should do for the mission right now, if any.
///
/// `None` leaves the member to ordinary task selection. During
/// `Disembarking` a member still aboard is first moved into the origin.
pub(crate) fn perform_mission_phase(
    state: &mut GameState,
    content: &GameContent,
    id: &MissionId,
    agent_id: &AgentId,
) -> Option<TaskKind> {
    let mission = state.missions.get(id)?;
    if mission.is_done() {
        return None;
    }
    let vehicle = mission.vehicle.clone()?;
    let aboard = state.agents.get(agent_id)?.placement == Placement::Vehicle(vehicle.clone());
    let kind = member_task(state, content, mission, agent_id, aboard);
    if mission.phase == MissionPhase::Disembarking && aboard {
        let origin = mission.origin.clone();
        disembark(state, agent_id, &origin);
    }
    kind
}

fn member_task(
    state: &GameState,
    content: &GameContent,
    mission: &MissionState,
    agent_id: &AgentId,
    aboard: bool,
) -> Option<TaskKind> {
    let id = mission.id.clone();
    match mission.phase {
        MissionPhase::Reviewing | MissionPhase::Completed => None,
        MissionPhase::Embarking if aboard => None,
        MissionPhase::Embarking if !vehicle_loaded(state, mission) => {
            Some(TaskKind::LoadVehicle { mission: id })
        }
        MissionPhase::Embarking => Some(TaskKind::BoardVehicle { mission: id }),
        MissionPhase::Travelling => (aboard
            && !mission.arrived
            && mission.driver() == Some(agent_id))
        .then_some(TaskKind::DriveVehicle { mission: id }),
        MissionPhase::ExploringSite => (aboard
            && mission.kind == MissionKind::Exploration
            && !site_work_complete(state, content, mission))
        .then_some(TaskKind::ExploreSite { mission: id }),
        MissionPhase::UnloadingSupplies => (aboard && !cargo_remaining(mission).is_empty())
            .then_some(TaskKind::UnloadVehicle { mission: id }),
        MissionPhase::Disembarking => {
            let hold = mission.vehicle.as_ref().map(ContainerId::from)?;
            (state.ledger.total_stored(&hold) > LEDGER_EPSILON)
                .then_some(TaskKind::UnloadVehicle { mission: id })
        }
    }
}

fn disembark(state: &mut GameState, agent_id: &AgentId, origin: &SettlementId) {
    let home = state.settlements.get(origin).map(|s| s.location);
    if let Some(agent) = state.agents.get_mut(agent_id) {
        agent.placement = Placement::Settlement(origin.clone());
        if let Some(home) = home {
            agent.location = home;
        }
    }
}
