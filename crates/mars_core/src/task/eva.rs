//! EVA tasks: out through an airlock, work on site, walk back, back in.

// Handlers share the `PhaseHandler` signature even when they cannot fail.
#![allow(clippy::unnecessary_wraps)]

use super::{PhaseCtx, Reservation, TaskError, TaskKind, TaskPhase, TaskPlan};
use crate::agent::Placement;
use crate::ledger::{EquipmentKind, Holder};
use crate::{
    AgentId, BuildingKind, ContainerId, Coordinates, Event, EventSink, GameContent, GameState,
    SettlementId,
};

pub(super) fn prepare(
    state: &GameState,
    content: &GameContent,
    agent_id: &AgentId,
    kind: &TaskKind,
) -> Option<TaskPlan> {
    let agent = state.agents.get(agent_id)?;
    let c = &content.constants;
    if !agent.fit_for_eva(c) {
        return None;
    }
    let (origin, work_required) = match kind {
        TaskKind::CollectResources { .. } => {
            let settlement = agent.settlement()?;
            if !has_working_airlock(state, settlement) {
                return None;
            }
            (agent.placement.clone(), c.collect_work_millisols)
        }
        TaskKind::ExploreSite { mission } => {
            let vehicle = state.missions.get(mission)?.vehicle.as_ref()?;
            if agent.placement != Placement::Vehicle(vehicle.clone()) {
                return None;
            }
            (agent.placement.clone(), c.exploration_site_work_millisols)
        }
        _ => return None,
    };
    let suit = state
        .ledger
        .find_available_equipment(EquipmentKind::EvaSuit, &origin.container()?)?;
    let mut plan = TaskPlan::new(work_required);
    plan.reservations.push(Reservation::Equipment(suit));
    plan.eva_origin = Some(origin);
    Some(plan)
}

pub(crate) fn has_working_airlock(state: &GameState, settlement: &SettlementId) -> bool {
    state.buildings.values().any(|b| {
        b.kind == BuildingKind::Airlock
            && &b.settlement == settlement
            && !b.malfunctions.has_malfunction()
    })
}

fn placement_location(state: &GameState, placement: &Placement) -> Option<Coordinates> {
    match placement {
        Placement::Settlement(id) => state.settlements.get(id).map(|s| s.location),
        Placement::Vehicle(id) => state.vehicles.get(id).map(|v| v.location),
        Placement::Outside => None,
    }
}

fn site_location(ctx: &PhaseCtx<'_>) -> Option<Coordinates> {
    match &ctx.task.kind {
        TaskKind::CollectResources { site, .. } => Some(*site),
        _ => placement_location(ctx.state, ctx.task.eva_origin.as_ref()?),
    }
}

/// For exploration, the crew's combined site work is done.
fn site_finished(ctx: &PhaseCtx<'_>) -> bool {
    let TaskKind::ExploreSite { mission } = &ctx.task.kind else {
        return false;
    };
    ctx.state
        .missions
        .get(mission)
        .is_none_or(|m| crate::mission::site_work_complete(ctx.state, ctx.content, m))
}

pub(super) fn exit_airlock(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let duration = ctx.constants().airlock_millisols;
    let used = ctx.spend(available, duration);
    if ctx.phase_elapsed(duration) {
        let site = site_location(ctx);
        if let Some(agent) = ctx.agent_mut() {
            agent.placement = Placement::Outside;
            if let Some(site) = site {
                agent.location = site;
            }
        }
        ctx.set_phase(TaskPhase::SiteWork)?;
    }
    Ok(available - used)
}

pub(super) fn site_work(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let fit = ctx
        .agent()
        .is_some_and(|a| a.fit_for_eva(ctx.constants()));
    if !fit || site_finished(ctx) {
        ctx.set_phase(TaskPhase::WalkBack)?;
        return Ok(available);
    }

    let before = ctx.task.work_done;
    let used = ctx.work(available, 1.0);
    let progress = ctx.task.work_done - before;
    let carry = ContainerId::from(ctx.agent_id);
    let mut carry_full = false;
    match ctx.task.kind.clone() {
        TaskKind::CollectResources { resource, .. } => {
            let kg = ctx.constants().collect_rate_kg_per_millisol * progress;
            let stored = ctx.state.ledger.store(&carry, &resource, kg);
            carry_full = stored + 1e-9 < kg;
        }
        TaskKind::ExploreSite { mission } => {
            let sample = ctx.constants().sample_resource.clone();
            let kg = ctx.constants().sample_rate_kg_per_millisol * progress;
            let stored = ctx.state.ledger.store(&carry, &sample, kg);
            carry_full = stored + 1e-9 < kg;
            if let Some(mission) = ctx.state.missions.get_mut(&mission) {
                mission.site_work_done += progress;
            }
        }
        _ => {}
    }

    let suit = ctx.worn_suit();
    if ctx.check_for_accident(used, suit.as_ref()) {
        ctx.set_phase(TaskPhase::WalkBack)?;
        return Ok(available - used);
    }
    if ctx.task.work_complete() || carry_full || site_finished(ctx) {
        ctx.task.completed = true;
        ctx.set_phase(TaskPhase::WalkBack)?;
    }
    Ok(available - used)
}

pub(super) fn walk_back(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let duration = ctx.constants().walk_millisols;
    let used = ctx.spend(available, duration);
    if ctx.phase_elapsed(duration) {
        let home = ctx
            .task
            .eva_origin
            .as_ref()
            .and_then(|origin| placement_location(ctx.state, origin));
        if let (Some(home), Some(agent)) = (home, ctx.agent_mut()) {
            agent.location = home;
        }
        ctx.set_phase(TaskPhase::EnterAirlock)?;
    }
    Ok(available - used)
}

pub(super) fn enter_airlock(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let duration = ctx.constants().airlock_millisols;
    let used = ctx.spend(available, duration);
    if ctx.phase_elapsed(duration) {
        return_inside(ctx.state, ctx.agent_id, ctx.task, ctx.events);
        let completed = ctx.task.completed;
        ctx.finish(completed);
    }
    Ok(available - used)
}

/// Where an agent coming in from EVA ends up. A vehicle that no longer serves
/// an active mission sends them on to the settlement it is parked at.
fn reentry_placement(state: &GameState, origin: Placement, home: SettlementId) -> Placement {
    let Placement::Vehicle(vehicle_id) = &origin else {
        return origin;
    };
    let Some(vehicle) = state.vehicles.get(vehicle_id) else {
        return Placement::Settlement(home);
    };
    let on_mission = match &vehicle.reserved_by {
        Some(Holder::Mission(mission)) => state.missions.get(mission).is_some_and(|m| !m.is_done()),
        _ => false,
    };
    if on_mission {
        return origin;
    }
    Placement::Settlement(vehicle.parked_at.clone().unwrap_or(home))
}

/// Puts an agent who is outside back where the EVA started and unloads what
/// they carried into that container.
pub(super) fn return_inside(
    state: &mut GameState,
    agent_id: &AgentId,
    task: &super::Task,
    events: &mut EventSink,
) {
    let Some(agent) = state.agents.get(agent_id) else {
        return;
    };
    let home = agent.home.clone();
    if agent.placement == Placement::Outside {
        let origin = task
            .eva_origin
            .clone()
            .unwrap_or_else(|| Placement::Settlement(home.clone()));
        let origin = reentry_placement(state, origin, home);
        let location = placement_location(state, &origin);
        if let Some(agent) = state.agents.get_mut(agent_id) {
            agent.placement = origin;
            if let Some(location) = location {
                agent.location = location;
            }
        }
    }

    let Some(target) = state
        .agents
        .get(agent_id)
        .and_then(|a| a.placement.container())
    else {
        return;
    };
    let carry = ContainerId::from(agent_id);
    for (resource, kg) in state.ledger.contents(&carry) {
        let moved = state.ledger.transfer_available(&carry, &target, &resource, kg);
        if moved > 0.0 {
            events.push(
                &mut state.counters,
                Event::ResourcesDeposited {
                    agent_id: agent_id.clone(),
                    container: target.clone(),
                    resource,
                    kg: moved,
                },
            );
        }
    }
}
