//! Task selection for agents with nothing to do.
//!
//! Each entry in [`META_TASKS`] proposes candidate tasks with a weight. The
//! weights are scaled by the agent's job, filtered by what the agent can
//! actually start, and one candidate is drawn.

use rand::RngCore;

use crate::agent::{AgentState, Job, Placement};
use crate::ledger::EquipmentKind;
use crate::malfunction::{self, Malfunctionable};
use crate::selection::weighted_pick;
use crate::task::{self, TaskKind, TaskKindTag};
use crate::{BuildingKind, ContainerId, GameContent, GameState, SettlementId};

type Evaluator = fn(&GameState, &GameContent, &AgentState) -> Vec<(TaskKind, f64)>;

/// Minimum maintenance need before anyone volunteers for it.
const MAINTENANCE_NEED_FLOOR: f64 = 0.5;

const META_TASKS: &[(TaskKindTag, Evaluator)] = &[
    (TaskKindTag::Relax, relax),
    (TaskKindTag::Sleep, sleep),
    (TaskKindTag::EatMeal, eat),
    (TaskKindTag::Maintenance, maintenance),
    (TaskKindTag::RepairMalfunction, repair),
    (TaskKindTag::Manufacture, manufacture),
    (TaskKindTag::CollectResources, collect),
];

/// Draws the next task for an agent, or `None` if nothing applies.
pub(crate) fn select_task(
    state: &GameState,
    content: &GameContent,
    agent: &AgentState,
    rng: &mut dyn RngCore,
) -> Option<TaskKind> {
    let cap = content.constants.probability_cap;
    let mut candidates: Vec<(TaskKind, f64)> = Vec::new();
    for (tag, evaluate) in META_TASKS {
        if !permitted(agent, *tag) {
            continue;
        }
        let modifier = job_modifier(agent.job, *tag);
        candidates.extend(
            evaluate(state, content, agent)
                .into_iter()
                .filter(|(kind, weight)| {
                    *weight > 0.0 && task::is_eligible(state, content, &agent.id, kind)
                })
                .map(|(kind, weight)| (kind, weight * modifier)),
        );
    }
    weighted_pick(&candidates, cap, rng).cloned()
}

/// Robots skip biological and EVA work; aboard a vehicle only personal care applies.
fn permitted(agent: &AgentState, tag: TaskKindTag) -> bool {
    let caps = tag.capabilities();
    if !agent.is_person() && (caps.needs_biology || caps.needs_eva) {
        return false;
    }
    match agent.placement {
        Placement::Settlement(_) => true,
        Placement::Vehicle(_) => matches!(
            tag,
            TaskKindTag::Relax | TaskKindTag::Sleep | TaskKindTag::EatMeal
        ),
        Placement::Outside => false,
    }
}

fn job_modifier(job: Job, tag: TaskKindTag) -> f64 {
    match (job, tag) {
        (Job::Engineer, TaskKindTag::Maintenance | TaskKindTag::RepairMalfunction)
        | (Job::Technician, TaskKindTag::Manufacture)
        | (Job::Areologist, TaskKindTag::CollectResources) => 1.5,
        _ => 1.0,
    }
}

fn relax(_: &GameState, content: &GameContent, agent: &AgentState) -> Vec<(TaskKind, f64)> {
    let stress = agent.condition.as_ref().map_or(0.0, |c| c.stress);
    let weight = content.constants.relax_base_probability * (1.0 + stress / 500.0);
    vec![(TaskKind::Relax, weight)]
}

fn sleep(_: &GameState, content: &GameContent, agent: &AgentState) -> Vec<(TaskKind, f64)> {
    let Some(condition) = &agent.condition else {
        return Vec::new();
    };
    if condition.fatigue < content.constants.sleep_threshold {
        return Vec::new();
    }
    vec![(TaskKind::Sleep, condition.fatigue / 10.0)]
}

fn eat(_: &GameState, content: &GameContent, agent: &AgentState) -> Vec<(TaskKind, f64)> {
    let Some(condition) = &agent.condition else {
        return Vec::new();
    };
    if condition.hunger < content.constants.hunger_threshold {
        return Vec::new();
    }
    vec![(TaskKind::EatMeal, condition.hunger / 10.0)]
}

/// Buildings of the settlement, vehicles parked there and suits in its
/// stores, in id order.
fn local_targets(state: &GameState, settlement: &SettlementId) -> Vec<Malfunctionable> {
    let suits = state
        .ledger
        .equipment_in(EquipmentKind::EvaSuit, &ContainerId::from(settlement))
        .into_iter()
        .map(Malfunctionable::Suit);
    let mut targets: Vec<Malfunctionable> = state
        .buildings
        .values()
        .filter(|b| &b.settlement == settlement)
        .map(|b| Malfunctionable::Building(b.id.clone()))
        .chain(
            state
                .vehicles
                .values()
                .filter(|v| v.parked_at.as_ref() == Some(settlement))
                .map(|v| Malfunctionable::Vehicle(v.id.clone())),
        )
        .chain(suits)
        .collect();
    targets.sort();
    targets
}

fn maintenance(
    state: &GameState,
    content: &GameContent,
    agent: &AgentState,
) -> Vec<(TaskKind, f64)> {
    let c = &content.constants;
    let Some(settlement) = agent.settlement() else {
        return Vec::new();
    };
    local_targets(state, settlement)
        .into_iter()
        .filter_map(|target| {
            let need = malfunction::manager(state, &target)?
                .maintenance_need(c.maintenance_window_millisols);
            (need >= MAINTENANCE_NEED_FLOOR).then(|| {
                (
                    TaskKind::Maintenance { target },
                    c.maintenance_base_probability * need,
                )
            })
        })
        .collect()
}

fn repair(state: &GameState, content: &GameContent, agent: &AgentState) -> Vec<(TaskKind, f64)> {
    let c = &content.constants;
    let Some(settlement) = agent.settlement() else {
        return Vec::new();
    };
    local_targets(state, settlement)
        .into_iter()
        .filter_map(|target| {
            let worst = malfunction::manager(state, &target)?.worst_malfunction()?;
            let weight = c.repair_base_probability * (1.0 + worst.severity / 10.0);
            Some((
                TaskKind::RepairMalfunction {
                    malfunction: worst.id,
                    target,
                },
                weight,
            ))
        })
        .collect()
}

fn manufacture(
    state: &GameState,
    content: &GameContent,
    agent: &AgentState,
) -> Vec<(TaskKind, f64)> {
    let Some(settlement) = agent.settlement() else {
        return Vec::new();
    };
    let mut workshops: Vec<_> = state
        .buildings
        .values()
        .filter(|b| &b.settlement == settlement && b.kind == BuildingKind::Workshop)
        .map(|b| b.id.clone())
        .collect();
    workshops.sort();
    workshops
        .iter()
        .flat_map(|building| {
            content.processes.iter().map(move |p| {
                (
                    TaskKind::Manufacture {
                        building: building.clone(),
                        process: p.id.clone(),
                    },
                    content.constants.manufacture_base_probability,
                )
            })
        })
        .collect()
}

/// Goes out for the collectible resource furthest below its target stock.
fn collect(state: &GameState, content: &GameContent, agent: &AgentState) -> Vec<(TaskKind, f64)> {
    let c = &content.constants;
    let Some(settlement) = agent.settlement() else {
        return Vec::new();
    };
    let Some(site) = state.settlements.get(settlement).map(|s| s.location) else {
        return Vec::new();
    };
    let stores = ContainerId::from(settlement);
    let most_needed = content
        .resources
        .iter()
        .filter(|r| r.collectible)
        .map(|r| (r, c.collect_target_kg - state.ledger.stored(&stores, &r.id)))
        .filter(|(_, deficit)| *deficit > 0.0)
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.id.cmp(&a.0.id)));
    let Some((resource, deficit)) = most_needed else {
        return Vec::new();
    };
    let weight = c.collect_base_probability * (deficit / c.collect_target_kg).min(1.0);
    vec![(
        TaskKind::CollectResources {
            resource: resource.id.clone(),
            site,
        },
        weight,
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{base_content, base_state, robot};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn robots_never_pick_biological_or_eva_work() {
        let content = base_content();
        let mut state = base_state(&content);
        let bot = robot(&mut state, "agent_9000");
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..200 {
            let picked = select_task(&state, &content, &state.agents[&bot], &mut rng);
            let tag = picked.expect("relax is always available").tag();
            let caps = tag.capabilities();
            assert!(!caps.needs_biology && !caps.needs_eva, "robot picked {tag:?}");
        }
    }

    #[test]
    fn aboard_a_vehicle_only_personal_care_is_offered() {
        let content = base_content();
        let mut state = base_state(&content);
        let agent_id = state.agents.keys().min().cloned().expect("fixture has agents");
        let vehicle = state.vehicles.keys().min().cloned().expect("fixture has a rover");
        state.agents.get_mut(&agent_id).expect("agent").placement = Placement::Vehicle(vehicle);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for _ in 0..200 {
            let picked = select_task(&state, &content, &state.agents[&agent_id], &mut rng);
            assert!(matches!(
                picked,
                Some(TaskKind::Relax | TaskKind::Sleep | TaskKind::EatMeal) | None
            ));
        }
    }

    #[test]
    fn engineers_lean_toward_maintenance() {
        assert!(job_modifier(Job::Engineer, TaskKindTag::Maintenance) > 1.0);
        assert!(job_modifier(Job::Engineer, TaskKindTag::Manufacture) <= 1.0);
        assert!(job_modifier(Job::Unassigned, TaskKindTag::Maintenance) <= 1.0);
    }

    #[test]
    fn exhausted_agent_is_offered_sleep() {
        let content = base_content();
        let mut state = base_state(&content);
        let agent_id = state.agents.keys().min().cloned().expect("fixture has agents");
        let agent = state.agents.get_mut(&agent_id).expect("agent");
        agent.condition.as_mut().expect("person").fatigue = 900.0;
        let offered = sleep(&state, &content, &state.agents[&agent_id]);
        assert_eq!(offered.len(), 1);
        assert!(offered[0].1 > content.constants.relax_base_probability);
    }
}
