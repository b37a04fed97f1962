//! Mission vehicle tasks: loading, unloading, boarding, driving.

// Handlers share the `PhaseHandler` signature even when they cannot fail.
#![allow(clippy::unnecessary_wraps)]

use super::{PhaseCtx, TaskError, TaskKind, TaskPlan};
use crate::agent::Placement;
use crate::ledger::LEDGER_EPSILON;
use crate::malfunction::Malfunctionable;
use crate::mission::{self, MissionPhase, MissionStatus, NavPointKind};
use crate::{
    AgentId, ContainerId, Coordinates, GameContent, GameState, MissionId, SettlementId, VehicleId,
};

pub(super) fn prepare(
    state: &GameState,
    content: &GameContent,
    agent_id: &AgentId,
    kind: &TaskKind,
) -> Option<TaskPlan> {
    let agent = state.agents.get(agent_id)?;
    let mission = state.missions.get(kind.mission()?)?;
    let vehicle_id = mission.vehicle.as_ref()?;
    let vehicle = state.vehicles.get(vehicle_id)?;
    let aboard = agent.placement == Placement::Vehicle(vehicle_id.clone());
    let beside = vehicle.parked_at.is_some() && agent.settlement() == vehicle.parked_at.as_ref();
    let ok = match kind {
        TaskKind::LoadVehicle { .. } => {
            mission.phase == MissionPhase::Embarking
                && vehicle.parked_at.as_ref() == Some(&mission.origin)
                && beside
        }
        TaskKind::UnloadVehicle { .. } => {
            vehicle.parked_at.is_some()
                && (aboard || beside)
                && matches!(
                    mission.phase,
                    MissionPhase::UnloadingSupplies | MissionPhase::Disembarking
                )
        }
        TaskKind::BoardVehicle { .. } => beside,
        TaskKind::DriveVehicle { .. } => {
            aboard && mission.phase == MissionPhase::Travelling && !mission.route.is_finished()
        }
        _ => false,
    };
    if !ok {
        return None;
    }
    let work_required = match kind {
        TaskKind::BoardVehicle { .. } => content.constants.board_millisols,
        _ => 0.0,
    };
    Some(TaskPlan::new(work_required))
}

/// Vehicle and mission of a vehicle task, if both still exist.
fn mission_vehicle(ctx: &PhaseCtx<'_>) -> Option<(MissionId, VehicleId)> {
    let mission_id = ctx.task.kind.mission()?.clone();
    let vehicle = ctx.state.missions.get(&mission_id)?.vehicle.clone()?;
    Some((mission_id, vehicle))
}

/// kg per millisol this agent can move between containers.
fn handling_rate(ctx: &PhaseCtx<'_>) -> f64 {
    ctx.constants().load_rate_kg_per_millisol * ctx.efficiency()
}

pub(super) fn loading(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let Some((mission_id, vehicle_id)) = mission_vehicle(ctx) else {
        ctx.finish(false);
        return Ok(available);
    };
    let Some(mission) = ctx.state.missions.get(&mission_id) else {
        ctx.finish(false);
        return Ok(available);
    };
    let manifest = mission.supplies.clone();
    let stores = ContainerId::from(&mission.origin);
    let hold = ContainerId::from(&vehicle_id);
    let rate = handling_rate(ctx);
    if rate <= 0.0 {
        ctx.finish(false);
        return Ok(available);
    }

    let mut budget = rate * available;
    let mut moved = 0.0;
    for item in &manifest {
        let missing = item.kg - ctx.state.ledger.stored(&hold, &item.resource);
        if missing <= LEDGER_EPSILON {
            continue;
        }
        let step = ctx
            .state
            .ledger
            .transfer_available(&stores, &hold, &item.resource, missing.min(budget));
        moved += step;
        budget -= step;
        if budget <= LEDGER_EPSILON {
            break;
        }
    }
    let used = (moved / rate).min(available);
    let loaded = ctx
        .state
        .missions
        .get(&mission_id)
        .is_some_and(|m| mission::vehicle_loaded(ctx.state, m));
    if loaded {
        ctx.finish(true);
    } else if moved <= LEDGER_EPSILON {
        // Nothing left in stores to load; the mission notices the shortfall.
        ctx.finish(false);
    }
    Ok(available - used)
}

pub(super) fn unloading(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let Some((mission_id, vehicle_id)) = mission_vehicle(ctx) else {
        ctx.finish(false);
        return Ok(available);
    };
    let Some(dock) = ctx
        .state
        .vehicles
        .get(&vehicle_id)
        .and_then(|v| v.parked_at.clone())
    else {
        ctx.finish(false);
        return Ok(available);
    };
    let rate = handling_rate(ctx);
    if rate <= 0.0 {
        ctx.finish(false);
        return Ok(available);
    }
    let hold = ContainerId::from(&vehicle_id);
    let stores = ContainerId::from(&dock);
    let delivering = ctx
        .state
        .missions
        .get(&mission_id)
        .is_some_and(|m| m.phase == MissionPhase::UnloadingSupplies);
    let wanted: Vec<(crate::ResourceId, f64)> = if delivering {
        ctx.state
            .missions
            .get(&mission_id)
            .map(mission::cargo_remaining)
            .unwrap_or_default()
            .into_iter()
            .map(|a| (a.resource, a.kg))
            .collect()
    } else {
        ctx.state.ledger.contents(&hold)
    };

    let mut budget = rate * available;
    let mut moved = 0.0;
    for (resource, kg) in wanted {
        let step = ctx
            .state
            .ledger
            .transfer_available(&hold, &stores, &resource, kg.min(budget));
        if delivering && step > 0.0 {
            if let Some(mission) = ctx.state.missions.get_mut(&mission_id) {
                mission.record_delivery(&resource, step);
            }
        }
        moved += step;
        budget -= step;
        if budget <= LEDGER_EPSILON {
            break;
        }
    }
    let used = (moved / rate).min(available);
    let finished = if delivering {
        ctx.state
            .missions
            .get(&mission_id)
            .is_some_and(|m| mission::cargo_remaining(m).is_empty())
    } else {
        ctx.state.ledger.total_stored(&hold) <= LEDGER_EPSILON
    };
    if finished {
        ctx.finish(true);
    } else if moved <= LEDGER_EPSILON {
        ctx.finish(false);
    }
    Ok(available - used)
}

pub(super) fn boarding(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let duration = ctx.task.work_required;
    let used = ctx.spend(available, duration);
    if ctx.phase_elapsed(duration) {
        let Some((_, vehicle_id)) = mission_vehicle(ctx) else {
            ctx.finish(false);
            return Ok(available - used);
        };
        let location = ctx.state.vehicles.get(&vehicle_id).map(|v| v.location);
        if let Some(agent) = ctx.agent_mut() {
            agent.placement = Placement::Vehicle(vehicle_id);
            if let Some(location) = location {
                agent.location = location;
            }
        }
        ctx.finish(true);
    }
    Ok(available - used)
}

pub(super) fn driving(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let Some((mission_id, vehicle_id)) = mission_vehicle(ctx) else {
        ctx.finish(false);
        return Ok(available);
    };
    let Some(point) = ctx
        .state
        .missions
        .get(&mission_id)
        .and_then(|m| m.route.current().cloned())
    else {
        ctx.finish(true);
        return Ok(available);
    };
    let Some(vehicle) = ctx.state.vehicles.get(&vehicle_id) else {
        ctx.finish(false);
        return Ok(available);
    };
    let speed = vehicle.speed_km_per_millisol
        * vehicle.malfunctions.efficiency(ctx.constants())
        * ctx.efficiency();
    let fuel_per_km = vehicle.fuel_per_km;
    let start = vehicle.location;
    if speed <= 0.0 {
        ctx.finish(false);
        return Ok(available);
    }

    let hold = ContainerId::from(&vehicle_id);
    let fuel = ctx.constants().fuel_resource.clone();
    let distance = start.distance_km(&point.location);
    let fuel_range = if fuel_per_km > 0.0 {
        ctx.state.ledger.stored(&hold, &fuel) / fuel_per_km
    } else {
        f64::INFINITY
    };
    let km = distance.min(speed * available).min(fuel_range);
    if km <= LEDGER_EPSILON && distance > LEDGER_EPSILON {
        if let Some(mission) = ctx.state.missions.get_mut(&mission_id) {
            mission.add_status(MissionStatus::OutOfFuel);
        }
        ctx.finish(false);
        return Ok(available);
    }
    let burn = (km * fuel_per_km).min(ctx.state.ledger.stored(&hold, &fuel));
    ctx.state.ledger.retrieve(&hold, &fuel, burn)?;

    let arrived = distance - km <= LEDGER_EPSILON;
    let location = if arrived {
        point.location
    } else {
        start.toward(&point.location, km)
    };
    let used = (km / speed).min(available);
    let vehicles = convoy(ctx, &mission_id, &vehicle_id);
    move_convoy(ctx, &vehicles, location, None);
    if let Some(vehicle) = ctx.state.vehicles.get_mut(&vehicle_id) {
        vehicle.malfunctions.add_time(used);
    }
    for agent in ctx.state.agents.values_mut() {
        if agent.placement == Placement::Vehicle(vehicle_id.clone()) {
            agent.location = location;
        }
    }
    ctx.add_experience(used);

    if ctx.check_for_accident(used, Some(&Malfunctionable::Vehicle(vehicle_id.clone()))) {
        ctx.finish(false);
        return Ok(available - used);
    }
    if arrived {
        if let NavPointKind::Settlement(settlement) = &point.kind {
            move_convoy(ctx, &vehicles, location, Some(settlement));
        }
        if let Some(mission) = ctx.state.missions.get_mut(&mission_id) {
            mission.route.arrive();
            mission.arrived = true;
        }
        ctx.finish(true);
    }
    Ok(available - used)
}

/// The mission vehicle plus anything it tows.
fn convoy(ctx: &PhaseCtx<'_>, mission_id: &MissionId, vehicle_id: &VehicleId) -> Vec<VehicleId> {
    let towed = ctx
        .state
        .missions
        .get(mission_id)
        .and_then(|m| m.towed_vehicle.clone());
    std::iter::once(vehicle_id.clone()).chain(towed).collect()
}

fn move_convoy(
    ctx: &mut PhaseCtx<'_>,
    convoy: &[VehicleId],
    location: Coordinates,
    parked_at: Option<&SettlementId>,
) {
    for id in convoy {
        if let Some(vehicle) = ctx.state.vehicles.get_mut(id) {
            vehicle.location = location;
            vehicle.parked_at = parked_at.cloned();
        }
    }
}
