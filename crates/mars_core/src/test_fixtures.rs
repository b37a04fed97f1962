//! Shared test fixtures for mars_core and downstream crates.
//!
//! `base_content()` provides a full `GameContent` with compressed durations and
//! accidents/malfunctions switched off, so tests opt in to randomness.
//! `base_state()` is one settlement with a habitat, a workshop, an airlock,
//! one rover, three colonists, four EVA suits and three exploration sites.

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::agent::{
    AgentKind, AgentState, Job, Mind, PhysicalCondition, Placement, Role, SkillKind, SkillLedger,
};
use crate::clock::{MarsTime, Pulse};
use crate::ledger::{EquipmentKind, Ledger};
use crate::malfunction::MalfunctionManager;
use crate::{
    AgentId, BuildingId, BuildingKind, BuildingState, CommandEnvelope, CommandId, Constants,
    ContainerId, Coordinates, Counters, EmergencyResourceDef, EquipmentId, EventEnvelope,
    EventLevel, ExplorationSite, GameContent, GameState, MaintenancePartsDef, MalfunctionDef,
    MetaState, PrincipalId, ProcessDef, ProcessId, ResourceAmount, ResourceDef, ResourceId,
    SettlementId, SettlementState, SiteId, VehicleId, VehicleState,
};

pub const HOME: &str = "settlement_0001";
pub const ROVER: &str = "vehicle_0001";
pub const WORKSHOP: &str = "building_0002";
pub const AIRLOCK: &str = "building_0003";

pub const SETTLEMENT_CAPACITY_KG: f64 = 50_000.0;
pub const ROVER_CAPACITY_KG: f64 = 3_000.0;

fn amount(resource: &str, kg: f64) -> ResourceAmount {
    ResourceAmount {
        resource: ResourceId(resource.to_string()),
        kg,
    }
}

fn resource(id: &str, name: &str, collectible: bool) -> ResourceDef {
    ResourceDef {
        id: ResourceId(id.to_string()),
        name: name.to_string(),
        collectible,
    }
}

pub fn test_constants() -> Constants {
    Constants {
        time_ratio: 1000.0,
        pulse_millisols: 10.0,
        max_pulse_millisols: 50.0,
        max_task_selections_per_pulse: 8,
        stall_limit: 3,
        probability_cap: 100.0,
        experience_per_level: 100.0,
        fatigue_per_millisol: 0.05,
        hunger_per_millisol: 0.05,
        stress_per_millisol: 0.02,
        sleep_threshold: 600.0,
        hunger_threshold: 300.0,
        hunger_interrupt_threshold: 600.0,
        starvation_threshold: 1000.0,
        max_eva_fatigue: 700.0,
        relax_millisols: 50.0,
        relax_stress_relief_per_millisol: 1.0,
        sleep_millisols: 300.0,
        sleep_fatigue_relief_per_millisol: 3.0,
        meal_millisols: 20.0,
        meal_hunger_relief: 400.0,
        food_per_meal_kg: 0.6,
        relax_base_probability: 5.0,
        maintenance_base_probability: 20.0,
        repair_base_probability: 50.0,
        manufacture_base_probability: 10.0,
        collect_base_probability: 10.0,
        accident_base_rate: 0.0,
        accident_wear_damage: 10.0,
        malfunction_base_rate: 0.0,
        wear_lifetime_millisols: 100_000.0,
        maintenance_window_millisols: 1000.0,
        maintenance_work_millisols: 50.0,
        wear_band_degraded_threshold: 50.0,
        wear_band_critical_threshold: 20.0,
        wear_band_degraded_efficiency: 0.75,
        wear_band_critical_efficiency: 0.4,
        airlock_millisols: 5.0,
        walk_millisols: 10.0,
        collect_work_millisols: 100.0,
        collect_rate_kg_per_millisol: 0.5,
        collect_target_kg: 500.0,
        eva_carry_capacity_kg: 100.0,
        board_millisols: 5.0,
        load_rate_kg_per_millisol: 20.0,
        food_resource: ResourceId("food".to_string()),
        fuel_resource: ResourceId("methane".to_string()),
        sample_resource: ResourceId("rock_samples".to_string()),
        mission_min_members: 2,
        mission_review_millisols: 20.0,
        mission_start_interval_millisols: 2000.0,
        fuel_margin: 1.5,
        food_per_member_per_sol_kg: 2.0,
        emergency_range_fraction: 0.8,
        tow_spare_vehicle: false,
        exploration_sites_per_mission: 2,
        exploration_site_work_millisols: 60.0,
        exploration_site_confidence: 1.0,
        mineral_estimation_variance: 0.0,
        sample_rate_kg_per_millisol: 0.1,
    }
}

/// Full content: eight resources (two collectible), one process, two
/// malfunctions, food and oxygen as emergency resources.
pub fn base_content() -> GameContent {
    GameContent {
        content_version: "test".to_string(),
        resources: vec![
            resource("food", "Food", false),
            resource("methane", "Methane", false),
            resource("water", "Water", false),
            resource("oxygen", "Oxygen", false),
            resource("spare_parts", "Spare Parts", false),
            resource("rock_samples", "Rock Samples", false),
            resource("ice", "Ice", true),
            resource("regolith", "Regolith", true),
        ],
        processes: vec![ProcessDef {
            id: ProcessId("proc_melt_ice".to_string()),
            name: "Melt Ice".to_string(),
            work_millisols: 100.0,
            inputs: vec![amount("ice", 10.0)],
            outputs: vec![amount("water", 9.0)],
        }],
        malfunctions: vec![
            MalfunctionDef {
                id: "mal_seal_leak".to_string(),
                name: "Seal Leak".to_string(),
                severity: 5.0,
                repair_work_millisols: 30.0,
                repair_parts: vec![amount("spare_parts", 1.0)],
            },
            MalfunctionDef {
                id: "mal_power_fault".to_string(),
                name: "Power Fault".to_string(),
                severity: 8.0,
                repair_work_millisols: 50.0,
                repair_parts: vec![amount("spare_parts", 2.0)],
            },
        ],
        emergency_resources: vec![
            EmergencyResourceDef {
                resource: ResourceId("food".to_string()),
                threshold_kg: 100.0,
                reserve_at_origin_kg: 200.0,
                required_kg: 150.0,
            },
            EmergencyResourceDef {
                resource: ResourceId("oxygen".to_string()),
                threshold_kg: 50.0,
                reserve_at_origin_kg: 100.0,
                required_kg: 80.0,
            },
        ],
        maintenance_parts: MaintenancePartsDef {
            building: vec![amount("spare_parts", 0.5)],
            vehicle: vec![amount("spare_parts", 1.0)],
        },
        constants: test_constants(),
    }
}

/// Content with the bare minimum: no processes, malfunctions or emergency resources.
pub fn minimal_content() -> GameContent {
    GameContent {
        content_version: "minimal".to_string(),
        resources: vec![
            resource("food", "Food", false),
            resource("methane", "Methane", false),
            resource("rock_samples", "Rock Samples", false),
        ],
        processes: vec![],
        malfunctions: vec![],
        emergency_resources: vec![],
        maintenance_parts: MaintenancePartsDef {
            building: vec![],
            vehicle: vec![],
        },
        constants: test_constants(),
    }
}

pub fn empty_state(content: &GameContent) -> GameState {
    GameState {
        meta: MetaState {
            pulse: 0,
            time: MarsTime::default(),
            seed: 42,
            schema_version: 1,
            content_version: content.content_version.clone(),
        },
        settlements: HashMap::new(),
        buildings: HashMap::new(),
        vehicles: HashMap::new(),
        agents: HashMap::new(),
        missions: HashMap::new(),
        exploration_sites: vec![],
        ledger: Ledger::default(),
        counters: Counters::default(),
    }
}

pub fn base_state(content: &GameContent) -> GameState {
    let mut state = empty_state(content);
    let home = add_settlement(
        &mut state,
        HOME,
        Coordinates::new(0.0, 0.0),
        &[
            ("food", 1000.0),
            ("methane", 2000.0),
            ("water", 500.0),
            ("oxygen", 500.0),
            ("spare_parts", 50.0),
            ("ice", 100.0),
        ],
    );
    for (id, name, kind) in [
        ("building_0001", "Habitat One", BuildingKind::Habitat),
        (WORKSHOP, "Workshop", BuildingKind::Workshop),
        (AIRLOCK, "Airlock", BuildingKind::Airlock),
    ] {
        add_building(&mut state, content, &home, id, name, kind);
    }
    add_vehicle(&mut state, content, &home, ROVER);

    for (id, job, role) in [
        ("agent_0001", Job::Engineer, Role::Commander),
        ("agent_0002", Job::Areologist, Role::Scientist),
        ("agent_0003", Job::Pilot, Role::Crew),
    ] {
        person(&mut state, content, &home, id, job, role);
    }
    for n in 1..=4 {
        state.ledger.add_equipment(
            EquipmentId(format!("suit_{n:04}")),
            EquipmentKind::EvaSuit,
            ContainerId::from(&home),
        );
    }
    for (n, lat, lon, value) in [
        (1, 0.5, 0.0, 100.0),
        (2, 0.0, 0.8, 80.0),
        (3, -1.0, -1.0, 60.0),
    ] {
        state.exploration_sites.push(ExplorationSite {
            id: SiteId(format!("site_{n:04}")),
            location: Coordinates::new(lat, lon),
            estimated_value: value,
            explored: false,
            claimed_by: None,
        });
    }
    state
}

pub fn add_settlement(
    state: &mut GameState,
    id: &str,
    location: Coordinates,
    stores: &[(&str, f64)],
) -> SettlementId {
    let id = SettlementId(id.to_string());
    state.settlements.insert(
        id.clone(),
        SettlementState {
            id: id.clone(),
            name: format!("Settlement {}", id.0),
            location,
        },
    );
    let container = ContainerId::from(&id);
    state.ledger.add_container(container.clone(), SETTLEMENT_CAPACITY_KG);
    for (resource, kg) in stores {
        state
            .ledger
            .store(&container, &ResourceId((*resource).to_string()), *kg);
    }
    id
}

pub fn add_building(
    state: &mut GameState,
    content: &GameContent,
    settlement: &SettlementId,
    id: &str,
    name: &str,
    kind: BuildingKind,
) -> BuildingId {
    let id = BuildingId(id.to_string());
    state.buildings.insert(
        id.clone(),
        BuildingState {
            id: id.clone(),
            settlement: settlement.clone(),
            name: name.to_string(),
            kind,
            malfunctions: MalfunctionManager::new(
                content.constants.wear_lifetime_millisols,
                content.maintenance_parts.building.clone(),
            ),
            maintenance: None,
            active_process: None,
        },
    );
    id
}

pub fn add_vehicle(
    state: &mut GameState,
    content: &GameContent,
    home: &SettlementId,
    id: &str,
) -> VehicleId {
    let id = VehicleId(id.to_string());
    let location = state.settlements[home].location;
    state.vehicles.insert(
        id.clone(),
        VehicleState {
            id: id.clone(),
            name: format!("Rover {}", id.0),
            home: home.clone(),
            location,
            parked_at: Some(home.clone()),
            range_km: 1000.0,
            fuel_per_km: 0.5,
            speed_km_per_millisol: 2.0,
            crew_capacity: 4,
            malfunctions: MalfunctionManager::new(
                content.constants.wear_lifetime_millisols,
                content.maintenance_parts.vehicle.clone(),
            ),
            reserved_by: None,
            maintenance: None,
        },
    );
    state
        .ledger
        .add_container(ContainerId::from(&id), ROVER_CAPACITY_KG);
    id
}

/// Adds a rested, fed person with skill level 1 in everything.
pub fn person(
    state: &mut GameState,
    content: &GameContent,
    home: &SettlementId,
    id: &str,
    job: Job,
    role: Role,
) -> AgentId {
    let id = AgentId(id.to_string());
    let location = state.settlements[home].location;
    state.agents.insert(
        id.clone(),
        AgentState {
            id: id.clone(),
            name: format!("Colonist {}", id.0),
            kind: AgentKind::Person,
            home: home.clone(),
            placement: Placement::Settlement(home.clone()),
            location,
            condition: Some(PhysicalCondition::default()),
            skills: SkillLedger::with_levels(&[
                (SkillKind::Mechanics, 1),
                (SkillKind::Materials, 1),
                (SkillKind::Areology, 1),
                (SkillKind::Driving, 1),
                (SkillKind::EvaOperations, 1),
            ]),
            job,
            role,
            mind: Mind::default(),
            alive: true,
        },
    );
    state.ledger.add_container(
        ContainerId::from(&id),
        content.constants.eva_carry_capacity_kg,
    );
    id
}

/// Adds a robot at the fixture's home settlement.
pub fn robot(state: &mut GameState, id: &str) -> AgentId {
    let id = AgentId(id.to_string());
    let home = SettlementId(HOME.to_string());
    let location = state.settlements[&home].location;
    state.agents.insert(
        id.clone(),
        AgentState {
            id: id.clone(),
            name: format!("Robot {}", id.0),
            kind: AgentKind::Robot,
            home: home.clone(),
            placement: Placement::Settlement(home),
            location,
            condition: None,
            skills: SkillLedger::with_levels(&[(SkillKind::Mechanics, 1)]),
            job: Job::Unassigned,
            role: Role::Crew,
            mind: Mind::default(),
            alive: true,
        },
    );
    state.ledger.add_container(ContainerId::from(&id), 0.0);
    id
}

/// The pulse that follows the state's current time by `millisols`.
pub fn next_pulse(state: &GameState, millisols: f64) -> Pulse {
    Pulse {
        id: state.meta.pulse,
        elapsed: millisols,
        time: state.meta.time.plus(millisols),
    }
}

/// Runs `count` fixed-size pulses with no commands and collects every event.
pub fn run_pulses(
    state: &mut GameState,
    content: &GameContent,
    rng: &mut ChaCha8Rng,
    count: u32,
    millisols: f64,
) -> Vec<EventEnvelope> {
    let mut events = Vec::new();
    for _ in 0..count {
        let pulse = next_pulse(state, millisols);
        events.extend(crate::tick(
            state,
            &[],
            content,
            rng,
            EventLevel::Normal,
            &pulse,
        ));
    }
    events
}

/// A command issued and due at the state's current pulse.
pub fn command(state: &GameState, command: crate::Command) -> CommandEnvelope {
    CommandEnvelope {
        id: CommandId(format!("cmd_{:06}", state.meta.pulse)),
        issued_by: PrincipalId("principal_test".to_string()),
        issued_pulse: state.meta.pulse,
        execute_at_pulse: state.meta.pulse,
        command,
    }
}

pub fn make_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(42)
}
