//! Mission creation: vehicle, route, crew and supplies, in that order.

use rand::RngCore;

use super::{
    determine_exploration_sites, end_mission, find_settlement_needing_emergency_supplies,
    MissionKind, MissionState, MissionStatus, NavPoint, NavPointKind, NavRoute,
};
use crate::agent::Placement;
use crate::clock::MILLISOLS_PER_SOL;
use crate::ledger::{claim, EquipmentKind, Holder, LEDGER_EPSILON};
use crate::{
    id::sequential_id, AgentId, ContainerId, Event, EventSink, GameContent, GameState, MissionId,
    ResourceAmount, VehicleId,
};

/// Creates a mission and provisions it.
///
/// Any infeasibility ends the mission on the spot with that status, releasing
/// whatever was already reserved, and is returned as the error.
pub(crate) fn start_mission(
    state: &mut GameState,
    content: &GameContent,
    kind: MissionKind,
    initiator: &AgentId,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) -> Result<MissionId, MissionStatus> {
    let Some(origin) = state.agents.get(initiator).map(|a| a.home.clone()) else {
        return Err(MissionStatus::InitiatorUnavailable);
    };
    let id = MissionId(sequential_id("mission", &mut state.counters.next_mission_id));
    let now = state.meta.time;
    let min_members = content.constants.mission_min_members as usize;
    state.missions.insert(
        id.clone(),
        MissionState::new(id.clone(), kind, origin, initiator.clone(), now, min_members),
    );

    if let Err(status) = provision(state, content, &id, rng) {
        if let Some(mission) = state.missions.get_mut(&id) {
            mission.add_status(status);
        }
        end_mission(state, &id, events);
        return Err(status);
    }

    let Some(mission) = state.missions.get(&id) else {
        return Err(MissionStatus::InitiatorUnavailable);
    };
    let members = mission.members.clone();
    let vehicle = mission.vehicle.clone().unwrap_or_else(|| VehicleId(String::new()));
    tracing::info!(mission = %id, ?kind, crew = members.len(), %vehicle, "mission started");
    events.push(
        &mut state.counters,
        Event::MissionStarted {
            mission_id: id.clone(),
            kind,
            members,
            vehicle,
        },
    );
    Ok(id)
}

fn provision(
    state: &mut GameState,
    content: &GameContent,
    id: &MissionId,
    rng: &mut dyn RngCore,
) -> Result<(), MissionStatus> {
    check_initiator(state, id)?;
    let vehicle = reserve_vehicle(state, id)?;
    plan_route(state, content, id, &vehicle, rng)?;
    recruit(state, content, id, &vehicle)?;
    stock(state, content, id, &vehicle)?;
    let kind = state.missions.get(id).map(|m| m.kind);
    if kind == Some(MissionKind::EmergencySupply) && content.constants.tow_spare_vehicle {
        tow_spare(state, id, &vehicle);
    }
    Ok(())
}

fn mission(state: &GameState, id: &MissionId) -> Result<MissionState, MissionStatus> {
    state
        .missions
        .get(id)
        .cloned()
        .ok_or(MissionStatus::InitiatorUnavailable)
}

fn check_initiator(state: &GameState, id: &MissionId) -> Result<(), MissionStatus> {
    let m = mission(state, id)?;
    let ready = state.agents.get(&m.initiator).is_some_and(|a| {
        a.alive
            && a.is_person()
            && a.mind.mission.is_none()
            && a.placement == Placement::Settlement(m.origin.clone())
    });
    if ready {
        Ok(())
    } else {
        Err(MissionStatus::InitiatorUnavailable)
    }
}

/// Longest-range reservable rover parked at the origin; ties go to the lowest id.
fn reserve_vehicle(state: &mut GameState, id: &MissionId) -> Result<VehicleId, MissionStatus> {
    let origin = mission(state, id)?.origin;
    let mut parked: Vec<(&VehicleId, f64)> = state
        .vehicles
        .values()
        .filter(|v| {
            v.parked_at.as_ref() == Some(&origin)
                && v.is_reservable()
                && !v.malfunctions.has_malfunction()
        })
        .map(|v| (&v.id, v.range_km))
        .collect();
    parked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let vehicle_id = parked
        .first()
        .map(|(v, _)| (*v).clone())
        .ok_or(MissionStatus::NoReservableVehicles)?;

    let vehicle = state
        .vehicles
        .get_mut(&vehicle_id)
        .ok_or(MissionStatus::NoReservableVehicles)?;
    claim(&mut vehicle.reserved_by, &vehicle_id.0, Holder::Mission(id.clone()))
        .map_err(|_| MissionStatus::NoReservableVehicles)?;
    if let Some(m) = state.missions.get_mut(id) {
        m.vehicle = Some(vehicle_id.clone());
    }
    Ok(vehicle_id)
}

fn plan_route(
    state: &mut GameState,
    content: &GameContent,
    id: &MissionId,
    vehicle_id: &VehicleId,
    rng: &mut dyn RngCore,
) -> Result<(), MissionStatus> {
    let m = mission(state, id)?;
    let range = state.vehicles.get(vehicle_id).map_or(0.0, |v| v.range_km);
    let home = state
        .settlements
        .get(&m.origin)
        .map(|s| s.location)
        .ok_or(MissionStatus::NoSettlementFound)?;
    let home_point = NavPoint {
        location: home,
        kind: NavPointKind::Settlement(m.origin.clone()),
    };

    let mut route = NavRoute::default();
    match m.kind {
        MissionKind::Exploration => {
            let sites = determine_exploration_sites(state, content, &m.origin, range, rng);
            if sites.is_empty() {
                return Err(MissionStatus::NoExplorationSites);
            }
            for site_id in &sites {
                if let Some(site) = state.exploration_sites.iter_mut().find(|s| &s.id == site_id) {
                    site.claimed_by = Some(id.clone());
                    route.push(NavPoint {
                        location: site.location,
                        kind: NavPointKind::Site(site.id.clone()),
                    });
                }
            }
        }
        MissionKind::EmergencySupply => {
            let (target, cargo) =
                find_settlement_needing_emergency_supplies(state, content, &m.origin, range, rng)
                    .ok_or(MissionStatus::NoSettlementFound)?;
            let location = state
                .settlements
                .get(&target)
                .map(|s| s.location)
                .ok_or(MissionStatus::NoSettlementFound)?;
            route.push(NavPoint {
                location,
                kind: NavPointKind::Settlement(target.clone()),
            });
            if let Some(m) = state.missions.get_mut(id) {
                m.target = Some(target);
                m.cargo = cargo;
            }
        }
    }
    route.push(home_point);
    if let Some(m) = state.missions.get_mut(id) {
        m.route = route;
    }
    Ok(())
}

/// Initiator first, then free colonists at the origin in id order.
fn recruit(
    state: &mut GameState,
    content: &GameContent,
    id: &MissionId,
    vehicle_id: &VehicleId,
) -> Result<(), MissionStatus> {
    let m = mission(state, id)?;
    let seats = state.vehicles.get(vehicle_id).map_or(0, |v| v.crew_capacity) as usize;
    let needs_eva = m.kind == MissionKind::Exploration;
    let at_origin = Placement::Settlement(m.origin.clone());

    let mut candidates: Vec<&AgentId> = state
        .agents
        .values()
        .filter(|a| {
            a.alive
                && a.is_person()
                && a.mind.mission.is_none()
                && a.placement == at_origin
                && (!needs_eva || a.fit_for_eva(&content.constants))
                && a.id != m.initiator
        })
        .map(|a| &a.id)
        .collect();
    candidates.sort();
    let crew: Vec<AgentId> = std::iter::once(m.initiator.clone())
        .chain(candidates.into_iter().cloned())
        .take(seats)
        .collect();
    if crew.len() < m.min_members {
        return Err(MissionStatus::NotEnoughMembers);
    }

    for member in &crew {
        if let Some(agent) = state.agents.get_mut(member) {
            agent.mind.mission = Some(id.clone());
        }
    }
    if let Some(m) = state.missions.get_mut(id) {
        m.members = crew;
    }
    Ok(())
}

/// Works out fuel, food and cargo, and checks the origin can supply them.
fn stock(
    state: &mut GameState,
    content: &GameContent,
    id: &MissionId,
    vehicle_id: &VehicleId,
) -> Result<(), MissionStatus> {
    let c = &content.constants;
    let m = mission(state, id)?;
    let vehicle = state
        .vehicles
        .get(vehicle_id)
        .ok_or(MissionStatus::NoReservableVehicles)?;
    let distance = m.route.total_distance_km(&vehicle.location);
    let drive_millisols = if vehicle.speed_km_per_millisol > 0.0 {
        distance / vehicle.speed_km_per_millisol
    } else {
        0.0
    };
    let site_millisols = match m.kind {
        MissionKind::Exploration => c.exploration_site_work_millisols * (m.route.len() - 1) as f64,
        MissionKind::EmergencySupply => 0.0,
    };
    let sols = (c.mission_review_millisols + drive_millisols + site_millisols) / MILLISOLS_PER_SOL
        + 1.0;

    let mut manifest: Vec<ResourceAmount> = Vec::new();
    let mut add = |resource: &crate::ResourceId, kg: f64| {
        if kg <= LEDGER_EPSILON {
            return;
        }
        match manifest.iter_mut().find(|a| &a.resource == resource) {
            Some(entry) => entry.kg += kg,
            None => manifest.push(ResourceAmount {
                resource: resource.clone(),
                kg,
            }),
        }
    };
    add(&c.fuel_resource, distance * vehicle.fuel_per_km * c.fuel_margin);
    add(
        &c.food_resource,
        m.members.len() as f64 * c.food_per_member_per_sol_kg * sols,
    );
    for item in &m.cargo {
        add(&item.resource, item.kg);
    }

    let hold = ContainerId::from(vehicle_id);
    let stores = ContainerId::from(&m.origin);
    let total: f64 = manifest.iter().map(|a| a.kg).sum();
    if total > state.ledger.capacity(&hold) + LEDGER_EPSILON {
        return Err(MissionStatus::CannotLoadResources);
    }
    for item in &manifest {
        let still_needed = item.kg - state.ledger.stored(&hold, &item.resource);
        if still_needed > state.ledger.stored(&stores, &item.resource) + LEDGER_EPSILON {
            return Err(MissionStatus::CannotLoadResources);
        }
    }

    // Suits travel with the crew.
    if m.kind == MissionKind::Exploration {
        for _ in 0..m.members.len() {
            let Some(suit) = state
                .ledger
                .find_available_equipment(EquipmentKind::EvaSuit, &stores)
            else {
                break;
            };
            state
                .ledger
                .move_equipment(&suit, hold.clone())
                .map_err(|_| MissionStatus::CannotLoadResources)?;
        }
    }

    if let Some(m) = state.missions.get_mut(id) {
        m.supplies = manifest;
    }
    Ok(())
}

fn tow_spare(state: &mut GameState, id: &MissionId, main: &VehicleId) {
    let Some(origin) = state.missions.get(id).map(|m| m.origin.clone()) else {
        return;
    };
    let spare = state
        .vehicles
        .values()
        .filter(|v| &v.id != main && v.parked_at.as_ref() == Some(&origin) && v.is_reservable())
        .map(|v| v.id.clone())
        .min();
    let Some(spare) = spare else {
        return;
    };
    let Some(vehicle) = state.vehicles.get_mut(&spare) else {
        return;
    };
    if claim(&mut vehicle.reserved_by, &spare.0, Holder::Mission(id.clone())).is_ok() {
        if let Some(m) = state.missions.get_mut(id) {
            m.towed_vehicle = Some(spare);
        }
    }
}
