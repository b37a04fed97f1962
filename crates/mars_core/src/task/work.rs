//! Indoor tasks: rest, meals, maintenance, repair, manufacturing.

// Handlers share the `PhaseHandler` signature even when they cannot fail.
#![allow(clippy::unnecessary_wraps)]

use super::{PhaseCtx, Reservation, TaskError, TaskKind, TaskPlan};
use crate::malfunction::{self, Malfunctionable};
use crate::{AgentId, BuildingKind, ContainerId, Event, GameContent, GameState, ResourceAmount};

pub(super) fn prepare_personal(
    state: &GameState,
    content: &GameContent,
    agent_id: &AgentId,
    kind: &TaskKind,
) -> Option<TaskPlan> {
    let agent = state.agents.get(agent_id)?;
    let c = &content.constants;
    match kind {
        TaskKind::Relax => Some(TaskPlan::new(c.relax_millisols)),
        TaskKind::Sleep => agent.is_person().then(|| TaskPlan::new(c.sleep_millisols)),
        TaskKind::EatMeal => {
            let container = agent.placement.container()?;
            let has_food =
                state.ledger.stored(&container, &c.food_resource) + 1e-9 >= c.food_per_meal_kg;
            (agent.is_person() && has_food).then(|| TaskPlan::new(c.meal_millisols))
        }
        _ => None,
    }
}

pub(super) fn prepare_work(
    state: &GameState,
    content: &GameContent,
    agent_id: &AgentId,
    kind: &TaskKind,
) -> Option<TaskPlan> {
    let agent = state.agents.get(agent_id)?;
    let settlement = agent.settlement()?;
    let stores = ContainerId::from(settlement);
    match kind {
        TaskKind::Maintenance { target } => {
            if !target_at(state, target, settlement) || !slot_free(state, target) {
                return None;
            }
            let manager = malfunction::manager(state, target)?;
            if manager.time_since_maintenance <= 0.0
                || !state.ledger.has_all(&stores, &manager.maintenance_parts)
            {
                return None;
            }
            let mut plan = TaskPlan::new(content.constants.maintenance_work_millisols);
            plan.reservations.push(Reservation::Maintenance(target.clone()));
            Some(plan)
        }
        TaskKind::RepairMalfunction { target, malfunction } => {
            if !target_at(state, target, settlement) || !slot_free(state, target) {
                return None;
            }
            let fault = malfunction::manager(state, target)?
                .active
                .iter()
                .find(|m| m.id == *malfunction)?;
            if !state.ledger.has_all(&stores, &fault.repair_parts) {
                return None;
            }
            let mut plan = TaskPlan::new(fault.repair_work_required - fault.repair_work_done);
            plan.reservations.push(Reservation::Maintenance(target.clone()));
            Some(plan)
        }
        TaskKind::Manufacture { building, process } => {
            let workshop = state.buildings.get(building)?;
            let def = content.process(process);
            let usable = workshop.kind == BuildingKind::Workshop
                && &workshop.settlement == settlement
                && workshop.active_process.is_none()
                && workshop.maintenance.is_none()
                && !workshop.malfunctions.has_malfunction()
                && state.ledger.has_all(&stores, &def.inputs);
            if !usable {
                return None;
            }
            let mut plan = TaskPlan::new(def.work_millisols);
            plan.reservations.push(Reservation::Workshop {
                building: building.clone(),
                process: process.clone(),
            });
            Some(plan)
        }
        _ => None,
    }
}

/// The target is a building of, a vehicle parked at, or a suit stored in the
/// settlement.
pub(crate) fn target_at(
    state: &GameState,
    target: &Malfunctionable,
    settlement: &crate::SettlementId,
) -> bool {
    match target {
        Malfunctionable::Building(id) => state
            .buildings
            .get(id)
            .is_some_and(|b| &b.settlement == settlement),
        Malfunctionable::Vehicle(id) => state.vehicles.get(id).is_some_and(|v| {
            v.parked_at.as_ref() == Some(settlement) && v.reserved_by.is_none()
        }),
        Malfunctionable::Suit(id) => state
            .ledger
            .equipment(id)
            .is_some_and(|e| e.container == ContainerId::from(settlement)),
    }
}

fn slot_free(state: &GameState, target: &Malfunctionable) -> bool {
    malfunction::maintenance_slot(state, target).is_some_and(Option::is_none)
}

/// Ledger container of the settlement the agent is in.
fn agent_stores(ctx: &PhaseCtx<'_>) -> Option<ContainerId> {
    ctx.agent().and_then(|a| a.placement.container())
}

// ---------------------------------------------------------------------------
// Phase handlers
// ---------------------------------------------------------------------------

pub(super) fn relaxing(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let duration = ctx.task.work_required;
    let used = ctx.spend(available, duration);
    let relief = ctx.constants().relax_stress_relief_per_millisol * used;
    if let Some(condition) = ctx.agent_mut().and_then(|a| a.condition.as_mut()) {
        condition.stress = (condition.stress - relief).max(0.0);
    }
    if ctx.phase_elapsed(duration) {
        ctx.finish(true);
    }
    Ok(available - used)
}

pub(super) fn sleeping(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let duration = ctx.task.work_required;
    let used = ctx.spend(available, duration);
    let relief = ctx.constants().sleep_fatigue_relief_per_millisol * used;
    let mut rested = false;
    if let Some(condition) = ctx.agent_mut().and_then(|a| a.condition.as_mut()) {
        condition.fatigue = (condition.fatigue - relief).max(0.0);
        rested = condition.fatigue <= 0.0;
    }
    if rested || ctx.phase_elapsed(duration) {
        ctx.finish(true);
    }
    Ok(available - used)
}

pub(super) fn eating(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    if !ctx.task.started {
        let food = ctx.constants().food_resource.clone();
        let portion = ctx.constants().food_per_meal_kg;
        let drawn = agent_stores(ctx)
            .is_some_and(|stores| ctx.state.ledger.retrieve(&stores, &food, portion).is_ok());
        if !drawn {
            // The pantry emptied since the meal was chosen.
            ctx.finish(false);
            return Ok(available);
        }
        ctx.task.started = true;
    }
    let duration = ctx.task.work_required;
    let used = ctx.spend(available, duration);
    let relief = if duration > 0.0 {
        ctx.constants().meal_hunger_relief * used / duration
    } else {
        ctx.constants().meal_hunger_relief
    };
    if let Some(condition) = ctx.agent_mut().and_then(|a| a.condition.as_mut()) {
        condition.hunger = (condition.hunger - relief).max(0.0);
    }
    if ctx.phase_elapsed(duration) {
        ctx.finish(true);
    }
    Ok(available - used)
}

/// Draws `parts` once per task. Returns false (and ends the task) if short.
fn draw_parts(ctx: &mut PhaseCtx<'_>, parts: &[ResourceAmount]) -> bool {
    if ctx.task.started {
        return true;
    }
    let drawn = agent_stores(ctx)
        .is_some_and(|stores| ctx.state.ledger.retrieve_all(&stores, parts).is_ok());
    if drawn {
        ctx.task.started = true;
    } else {
        ctx.finish(false);
    }
    drawn
}

pub(super) fn maintaining(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let TaskKind::Maintenance { target } = ctx.task.kind.clone() else {
        return Ok(available);
    };
    let parts = malfunction::manager(ctx.state, &target)
        .map(|m| m.maintenance_parts.clone())
        .unwrap_or_default();
    if !draw_parts(ctx, &parts) {
        return Ok(available);
    }
    let used = ctx.work(available, 1.0);
    if ctx.check_for_accident(used, Some(&target)) {
        ctx.finish(false);
        return Ok(available - used);
    }
    if ctx.task.work_complete() {
        if let Some(manager) = malfunction::manager_mut(ctx.state, &target) {
            manager.complete_maintenance();
        }
        let event = Event::MaintenanceCompleted {
            entity: target,
            agent_id: ctx.agent_id.clone(),
        };
        ctx.emit(event);
        ctx.finish(true);
    }
    Ok(available - used)
}

pub(super) fn repairing(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let TaskKind::RepairMalfunction {
        target,
        malfunction: fault_id,
    } = ctx.task.kind.clone()
    else {
        return Ok(available);
    };
    let Some(parts) = malfunction::manager(ctx.state, &target)
        .and_then(|m| m.active.iter().find(|f| f.id == fault_id))
        .map(|f| f.repair_parts.clone())
    else {
        // Someone else fixed it.
        ctx.finish(false);
        return Ok(available);
    };
    if !draw_parts(ctx, &parts) {
        return Ok(available);
    }
    let before = ctx.task.work_done;
    let used = ctx.work(available, 1.0);
    let progress = ctx.task.work_done - before;
    if let Some(fault) =
        malfunction::manager_mut(ctx.state, &target).and_then(|m| m.malfunction_mut(fault_id))
    {
        fault.repair_work_done += progress;
    }
    if ctx.task.work_complete() {
        let cleared = malfunction::manager_mut(ctx.state, &target)
            .and_then(|m| m.clear_malfunction(fault_id));
        if let Some(fault) = cleared {
            let event = Event::MalfunctionRepaired {
                entity: target,
                malfunction: fault.def_id,
                agent_id: ctx.agent_id.clone(),
            };
            ctx.emit(event);
        }
        ctx.finish(true);
    }
    Ok(available - used)
}

pub(super) fn manufacturing(ctx: &mut PhaseCtx<'_>, available: f64) -> Result<f64, TaskError> {
    let TaskKind::Manufacture { building, process } = ctx.task.kind.clone() else {
        return Ok(available);
    };
    let content = ctx.content;
    let def = content.process(&process);
    if !draw_parts(ctx, &def.inputs) {
        return Ok(available);
    }
    let target = Malfunctionable::Building(building.clone());
    let equipment = ctx
        .state
        .buildings
        .get(&building)
        .map_or(0.0, |b| b.malfunctions.efficiency(ctx.constants()));
    let used = ctx.work(available, equipment);
    if ctx.check_for_accident(used, Some(&target)) {
        ctx.finish(false);
        return Ok(available - used);
    }
    if ctx.task.work_complete() {
        let Some(stores) = agent_stores(ctx) else {
            ctx.finish(false);
            return Ok(available - used);
        };
        for output in &def.outputs {
            let stored = ctx.state.ledger.store(&stores, &output.resource, output.kg);
            if stored + 1e-9 < output.kg {
                ctx.emit(Event::ResourceOverflow {
                    container: stores.clone(),
                    resource: output.resource.clone(),
                    lost_kg: output.kg - stored,
                });
            }
        }
        ctx.emit(Event::ProcessCompleted {
            building_id: building,
            process_id: process,
        });
        ctx.finish(true);
    }
    Ok(available - used)
}
