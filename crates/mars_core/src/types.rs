//! Type definitions for `mars_core`.
//!
//! Colony state, commands, events, and catalog content. Behaviour-heavy types
//! (tasks, missions, the ledger, malfunction managers) live in their own modules.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentState, Job, Role};
use crate::clock::MarsTime;
use crate::coordinates::Coordinates;
use crate::ledger::{Holder, Ledger};
use crate::malfunction::{MalfunctionManager, Malfunctionable};
use crate::mission::{MissionKind, MissionPhase, MissionState, MissionStatus};
use crate::task::TaskPhase;

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(AgentId);
string_id!(SettlementId);
string_id!(BuildingId);
string_id!(VehicleId);
string_id!(MissionId);
string_id!(EquipmentId);
string_id!(ResourceId);
string_id!(ProcessId);
string_id!(SiteId);
string_id!(ContainerId);
string_id!(CommandId);
string_id!(EventId);
string_id!(PrincipalId);

// Settlements, vehicles and agents each own exactly one ledger container,
// keyed by the owner's id.
impl From<&SettlementId> for ContainerId {
    fn from(id: &SettlementId) -> Self {
        ContainerId(id.0.clone())
    }
}

impl From<&VehicleId> for ContainerId {
    fn from(id: &VehicleId) -> Self {
        ContainerId(id.0.clone())
    }
}

impl From<&AgentId> for ContainerId {
    fn from(id: &AgentId) -> Self {
        ContainerId(id.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Core enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Normal,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingKind {
    Habitat,
    Workshop,
    Greenhouse,
    Airlock,
}

// ---------------------------------------------------------------------------
// State types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub meta: MetaState,
    pub settlements: HashMap<SettlementId, SettlementState>,
    pub buildings: HashMap<BuildingId, BuildingState>,
    pub vehicles: HashMap<VehicleId, VehicleState>,
    pub agents: HashMap<AgentId, AgentState>,
    pub missions: HashMap<MissionId, MissionState>,
    /// Candidate exploration sites. Claimed by at most one mission at a time.
    pub exploration_sites: Vec<ExplorationSite>,
    pub ledger: Ledger,
    pub counters: Counters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaState {
    pub pulse: u64,
    pub time: MarsTime,
    pub seed: u64,
    pub schema_version: u32,
    pub content_version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub next_event_id: u64,
    pub next_command_id: u64,
    pub next_mission_id: u64,
    pub next_malfunction_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementState {
    pub id: SettlementId,
    pub name: String,
    pub location: Coordinates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingState {
    pub id: BuildingId,
    pub settlement: SettlementId,
    pub name: String,
    pub kind: BuildingKind,
    pub malfunctions: MalfunctionManager,
    /// Maintenance or repair crew currently working on the building.
    pub maintenance: Option<Holder>,
    pub active_process: Option<ProcessId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleState {
    pub id: VehicleId,
    pub name: String,
    pub home: SettlementId,
    pub location: Coordinates,
    /// `None` while out on the surface.
    pub parked_at: Option<SettlementId>,
    pub range_km: f64,
    pub fuel_per_km: f64,
    pub speed_km_per_millisol: f64,
    pub crew_capacity: u32,
    pub malfunctions: MalfunctionManager,
    /// Mission that has the vehicle out (or towed).
    pub reserved_by: Option<Holder>,
    pub maintenance: Option<Holder>,
}

impl VehicleState {
    pub fn is_reservable(&self) -> bool {
        self.reserved_by.is_none() && self.maintenance.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationSite {
    pub id: SiteId,
    pub location: Coordinates,
    /// Prior estimate of mineral value; refined when the site is explored.
    pub estimated_value: f64,
    pub explored: bool,
    pub claimed_by: Option<MissionId>,
}

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub id: CommandId,
    pub issued_by: PrincipalId,
    pub issued_pulse: u64,
    pub execute_at_pulse: u64,
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    SetJob {
        agent_id: AgentId,
        job: Job,
    },
    RenameBuilding {
        building_id: BuildingId,
        name: String,
    },
    ReassignRole {
        agent_id: AgentId,
        role: Role,
    },
    StartMission {
        kind: MissionKind,
        initiator: AgentId,
    },
    AbortMission {
        mission_id: MissionId,
    },
}

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub pulse: u64,
    pub event: Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    TaskStarted {
        agent_id: AgentId,
        task_kind: String,
        target: Option<String>,
    },
    /// Only emitted at `EventLevel::Debug`.
    TaskPhaseChanged {
        agent_id: AgentId,
        task_kind: String,
        from: Option<TaskPhase>,
        to: TaskPhase,
    },
    TaskEnded {
        agent_id: AgentId,
        task_kind: String,
        completed: bool,
    },
    TaskFailed {
        agent_id: AgentId,
        task_kind: String,
        reason: String,
    },
    Accident {
        agent_id: AgentId,
        task_kind: String,
        entity: String,
    },
    MalfunctionOccurred {
        entity: Malfunctionable,
        malfunction: String,
        severity: f64,
    },
    MalfunctionRepaired {
        entity: Malfunctionable,
        malfunction: String,
        agent_id: AgentId,
    },
    MaintenanceCompleted {
        entity: Malfunctionable,
        agent_id: AgentId,
    },
    ResourcesDeposited {
        agent_id: AgentId,
        container: ContainerId,
        resource: ResourceId,
        kg: f64,
    },
    ResourceOverflow {
        container: ContainerId,
        resource: ResourceId,
        lost_kg: f64,
    },
    ProcessCompleted {
        building_id: BuildingId,
        process_id: ProcessId,
    },
    MissionStarted {
        mission_id: MissionId,
        kind: MissionKind,
        members: Vec<AgentId>,
        vehicle: VehicleId,
    },
    MissionPhaseChanged {
        mission_id: MissionId,
        from: MissionPhase,
        to: MissionPhase,
    },
    MemberLeftMission {
        mission_id: MissionId,
        agent_id: AgentId,
    },
    MissionEnded {
        mission_id: MissionId,
        statuses: Vec<MissionStatus>,
        completed: bool,
    },
    SiteExplored {
        mission_id: MissionId,
        site_id: SiteId,
        estimated_value: f64,
    },
    SuppliesDelivered {
        mission_id: MissionId,
        settlement_id: SettlementId,
        delivered: Vec<ResourceAmount>,
    },
    AgentDied {
        agent_id: AgentId,
        cause: String,
    },
    JobChanged {
        agent_id: AgentId,
        job: Job,
    },
    RoleChanged {
        agent_id: AgentId,
        role: Role,
    },
    BuildingRenamed {
        building_id: BuildingId,
        name: String,
    },
    CommandRejected {
        command_id: CommandId,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameContent {
    pub content_version: String,
    pub resources: Vec<ResourceDef>,
    pub processes: Vec<ProcessDef>,
    pub malfunctions: Vec<MalfunctionDef>,
    pub emergency_resources: Vec<EmergencyResourceDef>,
    pub maintenance_parts: MaintenancePartsDef,
    pub constants: Constants,
}

impl GameContent {
    /// Looks up a resource by id. A missing id is an authoring error.
    pub fn resource(&self, id: &ResourceId) -> &ResourceDef {
        self.resources
            .iter()
            .find(|r| &r.id == id)
            .unwrap_or_else(|| panic!("unknown resource id '{id}'"))
    }

    pub fn process(&self, id: &ProcessId) -> &ProcessDef {
        self.processes
            .iter()
            .find(|p| &p.id == id)
            .unwrap_or_else(|| panic!("unknown process id '{id}'"))
    }

    pub fn malfunction(&self, id: &str) -> &MalfunctionDef {
        self.malfunctions
            .iter()
            .find(|m| m.id == id)
            .unwrap_or_else(|| panic!("unknown malfunction id '{id}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAmount {
    pub resource: ResourceId,
    pub kg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDef {
    pub id: ResourceId,
    pub name: String,
    /// Can be gathered from the surface around a settlement on EVA.
    pub collectible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDef {
    pub id: ProcessId,
    pub name: String,
    pub work_millisols: f64,
    pub inputs: Vec<ResourceAmount>,
    pub outputs: Vec<ResourceAmount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MalfunctionDef {
    pub id: String,
    pub name: String,
    pub severity: f64,
    pub repair_work_millisols: f64,
    pub repair_parts: Vec<ResourceAmount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyResourceDef {
    pub resource: ResourceId,
    /// A settlement storing less than this is deficient.
    pub threshold_kg: f64,
    /// What the origin must keep for itself on top of the delivery.
    pub reserve_at_origin_kg: f64,
    /// Delivery size for one emergency run.
    pub required_kg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenancePartsDef {
    pub building: Vec<ResourceAmount>,
    pub vehicle: Vec<ResourceAmount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constants {
    // clock
    /// Simulated seconds per real second.
    pub time_ratio: f64,
    pub pulse_millisols: f64,
    pub max_pulse_millisols: f64,
    // scheduling
    pub max_task_selections_per_pulse: u32,
    pub stall_limit: u32,
    pub probability_cap: f64,
    pub experience_per_level: f64,
    // physiology, all on a 0-1000 scale
    pub fatigue_per_millisol: f64,
    pub hunger_per_millisol: f64,
    pub stress_per_millisol: f64,
    pub sleep_threshold: f64,
    pub hunger_threshold: f64,
    pub hunger_interrupt_threshold: f64,
    pub starvation_threshold: f64,
    pub max_eva_fatigue: f64,
    pub relax_millisols: f64,
    pub relax_stress_relief_per_millisol: f64,
    pub sleep_millisols: f64,
    pub sleep_fatigue_relief_per_millisol: f64,
    pub meal_millisols: f64,
    pub meal_hunger_relief: f64,
    pub food_per_meal_kg: f64,
    // task selection weights
    pub relax_base_probability: f64,
    pub maintenance_base_probability: f64,
    pub repair_base_probability: f64,
    pub manufacture_base_probability: f64,
    pub collect_base_probability: f64,
    // wear, malfunctions, accidents
    pub accident_base_rate: f64,
    pub accident_wear_damage: f64,
    pub malfunction_base_rate: f64,
    pub wear_lifetime_millisols: f64,
    pub maintenance_window_millisols: f64,
    pub maintenance_work_millisols: f64,
    pub wear_band_degraded_threshold: f64,
    pub wear_band_critical_threshold: f64,
    pub wear_band_degraded_efficiency: f64,
    pub wear_band_critical_efficiency: f64,
    // EVA
    pub airlock_millisols: f64,
    pub walk_millisols: f64,
    pub collect_work_millisols: f64,
    pub collect_rate_kg_per_millisol: f64,
    pub collect_target_kg: f64,
    pub eva_carry_capacity_kg: f64,
    // vehicles
    pub board_millisols: f64,
    pub load_rate_kg_per_millisol: f64,
    // well-known resources
    pub food_resource: ResourceId,
    pub fuel_resource: ResourceId,
    pub sample_resource: ResourceId,
    // missions
    pub mission_min_members: u32,
    pub mission_review_millisols: f64,
    pub mission_start_interval_millisols: f64,
    pub fuel_margin: f64,
    pub food_per_member_per_sol_kg: f64,
    pub emergency_range_fraction: f64,
    pub tow_spare_vehicle: bool,
    pub exploration_sites_per_mission: u32,
    pub exploration_site_work_millisols: f64,
    pub exploration_site_confidence: f64,
    pub mineral_estimation_variance: f64,
    pub sample_rate_kg_per_millisol: f64,
}
