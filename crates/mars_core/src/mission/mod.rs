//! Multi-agent missions: a crew, a shared vehicle, and a route.
//!
//! A mission moves through `Reviewing -> Embarking -> Travelling ->
//! (site phase, Travelling)* -> Disembarking -> Completed`. Transitions are
//! decided by [`determine_new_phase`] from predicates evaluated once per
//! pulse after the crew has acted.

mod destination;
mod lifecycle;
mod nav;
mod start;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::agent::Placement;
use crate::clock::MarsTime;
use crate::ledger::LEDGER_EPSILON;
use crate::{
    AgentId, ContainerId, GameContent, GameState, MissionId, ResourceAmount, ResourceId,
    SettlementId, VehicleId,
};

pub use destination::{determine_exploration_sites, find_settlement_needing_emergency_supplies};
pub(crate) use lifecycle::{abort_mission, end_mission, perform_mission_phase, update_missions};
pub use nav::{NavPoint, NavPointKind, NavRoute};
pub(crate) use start::start_mission;

/// Multiple of the site work after which an unfinished site is abandoned.
const SITE_ABANDON_FACTOR: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionKind {
    Exploration,
    EmergencySupply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionPhase {
    Reviewing,
    Embarking,
    Travelling,
    ExploringSite,
    UnloadingSupplies,
    Disembarking,
    Completed,
}

/// Why a mission is in trouble. Every status except `MemberLost` ends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionStatus {
    NoReservableVehicles,
    NoSettlementFound,
    NoExplorationSites,
    CannotLoadResources,
    NotEnoughMembers,
    InitiatorUnavailable,
    OutOfFuel,
    AbortedByCommand,
    MemberLost,
}

impl MissionStatus {
    pub fn is_terminal(self) -> bool {
        self != MissionStatus::MemberLost
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionState {
    pub id: MissionId,
    pub kind: MissionKind,
    pub phase: MissionPhase,
    pub phase_started: MarsTime,
    pub origin: SettlementId,
    pub initiator: AgentId,
    /// The first member drives.
    pub members: Vec<AgentId>,
    pub min_members: usize,
    pub vehicle: Option<VehicleId>,
    pub towed_vehicle: Option<VehicleId>,
    /// Emergency-supply destination.
    pub target: Option<SettlementId>,
    pub route: NavRoute,
    /// Everything that must be aboard before departure, cargo included.
    pub supplies: Vec<ResourceAmount>,
    /// Emergency cargo to hand over at the target.
    pub cargo: Vec<ResourceAmount>,
    pub delivered: Vec<ResourceAmount>,
    /// Effective crew work at the current site.
    pub site_work_done: f64,
    /// The vehicle reached the current waypoint this leg.
    pub arrived: bool,
    pub statuses: SmallVec<[MissionStatus; 4]>,
    done: bool,
}

impl MissionState {
    pub fn new(
        id: MissionId,
        kind: MissionKind,
        origin: SettlementId,
        initiator: AgentId,
        now: MarsTime,
        min_members: usize,
    ) -> Self {
        Self {
            id,
            kind,
            phase: MissionPhase::Reviewing,
            phase_started: now,
            origin,
            initiator,
            members: Vec::new(),
            min_members,
            vehicle: None,
            towed_vehicle: None,
            target: None,
            route: NavRoute::default(),
            supplies: Vec::new(),
            cargo: Vec::new(),
            delivered: Vec::new(),
            site_work_done: 0.0,
            arrived: false,
            statuses: SmallVec::new(),
            done: false,
        }
    }

    /// True once `end_mission` has run. Never reverts.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Records a status. Repeats of a status already recorded are not duplicated.
    pub fn add_status(&mut self, status: MissionStatus) {
        if !self.statuses.contains(&status) {
            self.statuses.push(status);
        }
    }

    pub fn has_terminal_status(&self) -> bool {
        self.statuses.iter().any(|s| s.is_terminal())
    }

    pub(crate) fn mark_done(&mut self) {
        self.done = true;
    }

    pub fn driver(&self) -> Option<&AgentId> {
        self.members.first()
    }

    pub(crate) fn record_delivery(&mut self, resource: &ResourceId, kg: f64) {
        match self.delivered.iter_mut().find(|d| &d.resource == resource) {
            Some(entry) => entry.kg += kg,
            None => self.delivered.push(ResourceAmount {
                resource: resource.clone(),
                kg,
            }),
        }
    }
}

/// Cargo still to be handed over at the target.
pub(crate) fn cargo_remaining(mission: &MissionState) -> Vec<ResourceAmount> {
    mission
        .cargo
        .iter()
        .filter_map(|item| {
            let delivered: f64 = mission
                .delivered
                .iter()
                .filter(|d| d.resource == item.resource)
                .map(|d| d.kg)
                .sum();
            let left = item.kg - delivered;
            (left > LEDGER_EPSILON).then(|| ResourceAmount {
                resource: item.resource.clone(),
                kg: left,
            })
        })
        .collect()
}

pub(crate) fn vehicle_loaded(state: &GameState, mission: &MissionState) -> bool {
    let Some(vehicle) = &mission.vehicle else {
        return false;
    };
    let hold = ContainerId::from(vehicle);
    state.ledger.has_all(&hold, &mission.supplies)
}

fn members_aboard(state: &GameState, mission: &MissionState) -> (usize, usize) {
    let Some(vehicle) = &mission.vehicle else {
        return (0, mission.members.len());
    };
    let aboard = Placement::Vehicle(vehicle.clone());
    let count = mission
        .members
        .iter()
        .filter(|id| state.agents.get(*id).is_some_and(|a| a.placement == aboard))
        .count();
    (count, mission.members.len())
}

/// Aggregate conditions the transition table reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct PhasePredicates {
    pub review_complete: bool,
    pub vehicle_loaded: bool,
    pub everyone_aboard: bool,
    pub arrived: bool,
    pub route_finished: bool,
    pub site_work_complete: bool,
    pub cargo_unloaded: bool,
    pub everyone_disembarked: bool,
    pub vehicle_unloaded: bool,
}

pub(crate) fn evaluate_predicates(
    state: &GameState,
    content: &GameContent,
    mission: &MissionState,
) -> PhasePredicates {
    let c = &content.constants;
    let (aboard, crew) = members_aboard(state, mission);
    let vehicle_unloaded = mission
        .vehicle
        .as_ref()
        .is_none_or(|v| state.ledger.total_stored(&ContainerId::from(v)) <= LEDGER_EPSILON);
    PhasePredicates {
        review_complete: state.meta.time.millisols_since(mission.phase_started)
            >= c.mission_review_millisols,
        vehicle_loaded: vehicle_loaded(state, mission),
        everyone_aboard: crew > 0 && aboard == crew,
        arrived: mission.arrived,
        route_finished: mission.route.is_finished(),
        site_work_complete: site_work_complete(state, content, mission),
        cargo_unloaded: cargo_remaining(mission).is_empty(),
        everyone_disembarked: aboard == 0,
        vehicle_unloaded,
    }
}

/// Enough crew work at the current site, or the crew has spent so long there
/// without finishing that the site is abandoned.
pub(crate) fn site_work_complete(
    state: &GameState,
    content: &GameContent,
    mission: &MissionState,
) -> bool {
    let required = content.constants.exploration_site_work_millisols;
    mission.site_work_done + LEDGER_EPSILON >= required
        || (mission.phase == MissionPhase::ExploringSite
            && state.meta.time.millisols_since(mission.phase_started)
                >= SITE_ABANDON_FACTOR * required)
}

/// The mission transition table. Pure.
pub fn determine_new_phase(
    kind: MissionKind,
    phase: MissionPhase,
    p: &PhasePredicates,
) -> MissionPhase {
    use MissionPhase::{
        Completed, Disembarking, Embarking, ExploringSite, Reviewing, Travelling,
        UnloadingSupplies,
    };
    match phase {
        Reviewing if p.review_complete => Embarking,
        Embarking if p.vehicle_loaded && p.everyone_aboard => Travelling,
        Travelling if p.arrived && p.route_finished => Disembarking,
        Travelling if p.arrived => match kind {
            MissionKind::Exploration => ExploringSite,
            MissionKind::EmergencySupply => UnloadingSupplies,
        },
        ExploringSite if p.site_work_complete && p.everyone_aboard => Travelling,
        UnloadingSupplies if p.cargo_unloaded && p.everyone_aboard => Travelling,
        Disembarking if p.everyone_disembarked && p.vehicle_unloaded => Completed,
        unchanged => unchanged,
    }
}
