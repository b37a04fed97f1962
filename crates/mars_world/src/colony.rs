//! Initial colony layout: settlements, crews, rovers, and exploration sites.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Result;
use mars_core::agent::{AgentKind, Mind, PhysicalCondition, SkillLedger};
use mars_core::clock::MarsTime;
use mars_core::ledger::{EquipmentKind, Ledger};
use mars_core::{
    AgentId, AgentState, BuildingId, BuildingKind, BuildingState, ContainerId, Coordinates,
    Counters, EquipmentId, ExplorationSite, GameContent, GameState, Job, MalfunctionManager,
    MetaState, Placement, ResourceAmount, ResourceId, Role, SettlementId, SettlementState, SiteId,
    SkillKind, VehicleId, VehicleState,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;

/// Highest skill level a new colonist can start with.
const MAX_STARTING_SKILL: u32 = 3;

const ALL_SKILLS: [SkillKind; 5] = [
    SkillKind::Mechanics,
    SkillKind::Materials,
    SkillKind::Areology,
    SkillKind::Driving,
    SkillKind::EvaOperations,
];

#[derive(Debug, Clone, Deserialize)]
pub struct WorldDef {
    pub settlements: Vec<SettlementSpec>,
    pub exploration: ExplorationSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettlementSpec {
    pub name: String,
    pub lat_deg: f64,
    pub lon_deg: f64,
    pub capacity_kg: f64,
    pub stores: Vec<ResourceAmount>,
    pub buildings: Vec<BuildingSpec>,
    pub vehicles: Vec<VehicleSpec>,
    pub colonists: Vec<ColonistSpec>,
    pub robots: u32,
    pub eva_suits: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildingSpec {
    pub name: String,
    pub kind: BuildingKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleSpec {
    pub name: String,
    pub range_km: f64,
    pub fuel_per_km: f64,
    pub speed_km_per_millisol: f64,
    pub crew_capacity: u32,
    pub capacity_kg: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColonistSpec {
    pub name: String,
    pub job: Job,
    pub role: Role,
}

/// Exploration sites scattered around each settlement at generation time.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorationSpec {
    pub sites_per_settlement: u32,
    pub min_distance_km: f64,
    pub max_distance_km: f64,
    pub min_value: f64,
    pub max_value: f64,
}

pub fn load_world(content_dir: &str) -> Result<WorldDef> {
    super::read_json(Path::new(content_dir), "settlements.json")
}

/// Validates a world layout against loaded content, panicking on any authoring error.
pub fn validate_world(world: &WorldDef, content: &GameContent) {
    let known: HashSet<&ResourceId> = content.resources.iter().map(|r| &r.id).collect();
    assert!(!world.settlements.is_empty(), "world has no settlements");
    for settlement in &world.settlements {
        assert!(
            settlement.capacity_kg > 0.0,
            "settlement '{}' has non-positive capacity",
            settlement.name,
        );
        let stocked: f64 = settlement.stores.iter().map(|s| s.kg).sum();
        assert!(
            stocked <= settlement.capacity_kg,
            "settlement '{}' stores {stocked} kg, over its {} kg capacity",
            settlement.name,
            settlement.capacity_kg,
        );
        for store in &settlement.stores {
            assert!(
                known.contains(&store.resource),
                "settlement '{}' store '{}' is not a known resource",
                settlement.name,
                store.resource,
            );
        }
        for vehicle in &settlement.vehicles {
            assert!(
                vehicle.range_km > 0.0 && vehicle.speed_km_per_millisol > 0.0,
                "vehicle '{}' must have positive range and speed",
                vehicle.name,
            );
            assert!(
                vehicle.crew_capacity > 0,
                "vehicle '{}' has no crew seats",
                vehicle.name,
            );
        }
    }
    let e = &world.exploration;
    assert!(
        e.min_distance_km >= 0.0 && e.min_distance_km <= e.max_distance_km,
        "exploration distance range is inverted",
    );
    assert!(
        e.min_value >= 0.0 && e.min_value <= e.max_value,
        "exploration value range is inverted",
    );
}

fn next_id(prefix: &str, counter: &mut u64) -> String {
    *counter += 1;
    format!("{prefix}_{:04}", *counter)
}

fn starting_skills(rng: &mut impl Rng) -> SkillLedger {
    let levels: Vec<(SkillKind, u32)> = ALL_SKILLS
        .iter()
        .map(|skill| (*skill, rng.gen_range(0..=MAX_STARTING_SKILL)))
        .collect();
    SkillLedger::with_levels(&levels)
}

#[derive(Default)]
struct Numbering {
    settlement: u64,
    building: u64,
    vehicle: u64,
    agent: u64,
    suit: u64,
}

fn add_settlement(
    state: &mut GameState,
    content: &GameContent,
    spec: &SettlementSpec,
    ids: &mut Numbering,
    rng: &mut impl Rng,
) -> SettlementId {
    let id = SettlementId(next_id("settlement", &mut ids.settlement));
    state.settlements.insert(
        id.clone(),
        SettlementState {
            id: id.clone(),
            name: spec.name.clone(),
            location: Coordinates::new(spec.lat_deg, spec.lon_deg),
        },
    );
    let stores = ContainerId::from(&id);
    state.ledger.add_container(stores.clone(), spec.capacity_kg);
    for item in &spec.stores {
        state.ledger.store(&stores, &item.resource, item.kg);
    }
    for _ in 0..spec.eva_suits {
        state.ledger.add_equipment(
            EquipmentId(next_id("suit", &mut ids.suit)),
            EquipmentKind::EvaSuit,
            stores.clone(),
        );
    }

    add_buildings(state, content, &id, &spec.buildings, ids);
    add_vehicles(state, content, &id, &spec.vehicles, ids);
    add_crew(state, content, &id, spec, ids, rng);
    id
}

fn add_buildings(
    state: &mut GameState,
    content: &GameContent,
    settlement: &SettlementId,
    buildings: &[BuildingSpec],
    ids: &mut Numbering,
) {
    for building in buildings {
        let building_id = BuildingId(next_id("building", &mut ids.building));
        state.buildings.insert(
            building_id.clone(),
            BuildingState {
                id: building_id,
                settlement: settlement.clone(),
                name: building.name.clone(),
                kind: building.kind,
                malfunctions: MalfunctionManager::new(
                    content.constants.wear_lifetime_millisols,
                    content.maintenance_parts.building.clone(),
                ),
                maintenance: None,
                active_process: None,
            },
        );
    }
}

fn add_vehicles(
    state: &mut GameState,
    content: &GameContent,
    settlement: &SettlementId,
    vehicles: &[VehicleSpec],
    ids: &mut Numbering,
) {
    let location = state.settlements[settlement].location;
    for vehicle in vehicles {
        let vehicle_id = VehicleId(next_id("vehicle", &mut ids.vehicle));
        state
            .ledger
            .add_container(ContainerId::from(&vehicle_id), vehicle.capacity_kg);
        state.vehicles.insert(
            vehicle_id.clone(),
            VehicleState {
                id: vehicle_id,
                name: vehicle.name.clone(),
                home: settlement.clone(),
                location,
                parked_at: Some(settlement.clone()),
                range_km: vehicle.range_km,
                fuel_per_km: vehicle.fuel_per_km,
                speed_km_per_millisol: vehicle.speed_km_per_millisol,
                crew_capacity: vehicle.crew_capacity,
                malfunctions: MalfunctionManager::new(
                    content.constants.wear_lifetime_millisols,
                    content.maintenance_parts.vehicle.clone(),
                ),
                reserved_by: None,
                maintenance: None,
            },
        );
    }
}

fn insert_agent(state: &mut GameState, agent: AgentState, carry_kg: f64) {
    state
        .ledger
        .add_container(ContainerId::from(&agent.id), carry_kg);
    state.agents.insert(agent.id.clone(), agent);
}

/// Colonists get random starting skills; robots are fixed mechanics.
fn add_crew(
    state: &mut GameState,
    content: &GameContent,
    settlement: &SettlementId,
    spec: &SettlementSpec,
    ids: &mut Numbering,
    rng: &mut impl Rng,
) {
    let location = state.settlements[settlement].location;

    for colonist in &spec.colonists {
        let agent = AgentState {
            id: AgentId(next_id("agent", &mut ids.agent)),
            name: colonist.name.clone(),
            kind: AgentKind::Person,
            home: settlement.clone(),
            placement: Placement::Settlement(settlement.clone()),
            location,
            condition: Some(PhysicalCondition::default()),
            skills: starting_skills(rng),
            job: colonist.job,
            role: colonist.role,
            mind: Mind::default(),
            alive: true,
        };
        insert_agent(state, agent, content.constants.eva_carry_capacity_kg);
    }
    for n in 1..=spec.robots {
        let agent = AgentState {
            id: AgentId(next_id("agent", &mut ids.agent)),
            name: format!("{} Bot {n}", spec.name),
            kind: AgentKind::Robot,
            home: settlement.clone(),
            placement: Placement::Settlement(settlement.clone()),
            location,
            condition: None,
            skills: SkillLedger::with_levels(&[(SkillKind::Mechanics, 2), (SkillKind::Materials, 1)]),
            job: Job::Unassigned,
            role: Role::Crew,
            mind: Mind::default(),
            alive: true,
        };
        insert_agent(state, agent, 0.0);
    }
}

fn scatter_sites(
    state: &mut GameState,
    spec: &ExplorationSpec,
    around: Coordinates,
    rng: &mut impl Rng,
) {
    for _ in 0..spec.sites_per_settlement {
        let bearing = rng.gen_range(0.0..360.0);
        let km = if spec.max_distance_km > spec.min_distance_km {
            rng.gen_range(spec.min_distance_km..spec.max_distance_km)
        } else {
            spec.min_distance_km
        };
        let value = if spec.max_value > spec.min_value {
            rng.gen_range(spec.min_value..spec.max_value)
        } else {
            spec.min_value
        };
        let uuid = mars_core::generate_uuid(rng);
        state.exploration_sites.push(ExplorationSite {
            id: SiteId(format!("site_{uuid}")),
            location: around.offset(bearing, km),
            estimated_value: value,
            explored: false,
            claimed_by: None,
        });
    }
}

/// Builds the starting colony from a world layout.
///
/// Ids are numbered in layout order. Colonist skills, site placement and
/// site value come from `rng`.
pub fn build_initial_state(
    content: &GameContent,
    world: &WorldDef,
    seed: u64,
    rng: &mut impl Rng,
) -> GameState {
    let mut state = GameState {
        meta: MetaState {
            pulse: 0,
            time: MarsTime::default(),
            seed,
            schema_version: 1,
            content_version: content.content_version.clone(),
        },
        settlements: HashMap::new(),
        buildings: HashMap::new(),
        vehicles: HashMap::new(),
        agents: HashMap::new(),
        missions: HashMap::new(),
        exploration_sites: Vec::new(),
        ledger: Ledger::default(),
        counters: Counters::default(),
    };
    let mut ids = Numbering::default();
    for spec in &world.settlements {
        let id = add_settlement(&mut state, content, spec, &mut ids, rng);
        let around = state.settlements[&id].location;
        scatter_sites(&mut state, &world.exploration, around, rng);
    }
    tracing::info!(
        seed,
        settlements = state.settlements.len(),
        agents = state.agents.len(),
        sites = state.exploration_sites.len(),
        "colony generated"
    );
    state
}

/// A fresh colony and the rng seeded for its run.
pub fn new_colony(content: &GameContent, world: &WorldDef, seed: u64) -> (GameState, ChaCha8Rng) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let state = build_initial_state(content, world, seed, &mut rng);
    (state, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mars_core::test_fixtures::base_content;

    fn small_world() -> WorldDef {
        WorldDef {
            settlements: vec![SettlementSpec {
                name: "Test Base".to_string(),
                lat_deg: 0.0,
                lon_deg: 0.0,
                capacity_kg: 10_000.0,
                stores: vec![ResourceAmount {
                    resource: ResourceId("food".to_string()),
                    kg: 500.0,
                }],
                buildings: vec![
                    BuildingSpec {
                        name: "Hab".to_string(),
                        kind: BuildingKind::Habitat,
                    },
                    BuildingSpec {
                        name: "Lock".to_string(),
                        kind: BuildingKind::Airlock,
                    },
                ],
                vehicles: vec![VehicleSpec {
                    name: "Rover".to_string(),
                    range_km: 500.0,
                    fuel_per_km: 0.5,
                    speed_km_per_millisol: 1.0,
                    crew_capacity: 3,
                    capacity_kg: 2000.0,
                }],
                colonists: vec![
                    ColonistSpec {
                        name: "A".to_string(),
                        job: Job::Engineer,
                        role: Role::Commander,
                    },
                    ColonistSpec {
                        name: "B".to_string(),
                        job: Job::Pilot,
                        role: Role::Crew,
                    },
                ],
                robots: 1,
                eva_suits: 3,
            }],
            exploration: ExplorationSpec {
                sites_per_settlement: 5,
                min_distance_km: 10.0,
                max_distance_km: 100.0,
                min_value: 10.0,
                max_value: 50.0,
            },
        }
    }

    #[test]
    fn test_colony_matches_layout() {
        let content = base_content();
        let world = small_world();
        validate_world(&world, &content);
        let (state, _) = new_colony(&content, &world, 7);

        let home = SettlementId("settlement_0001".to_string());
        assert_eq!(state.settlements.len(), 1);
        assert_eq!(state.buildings.len(), 2);
        assert_eq!(state.vehicles.len(), 1);
        assert_eq!(state.agents.len(), 3);
        assert_eq!(state.agents.values().filter(|a| a.is_person()).count(), 2);
        assert_eq!(
            state
                .ledger
                .equipment_in(EquipmentKind::EvaSuit, &ContainerId::from(&home))
                .len(),
            3
        );
        let food = state
            .ledger
            .stored(&ContainerId::from(&home), &ResourceId("food".to_string()));
        assert!((food - 500.0).abs() < 1e-9);
        assert_eq!(state.meta.seed, 7);
    }

    #[test]
    fn test_sites_fall_inside_the_ring() {
        let content = base_content();
        let world = small_world();
        let (state, _) = new_colony(&content, &world, 11);
        let home = Coordinates::new(0.0, 0.0);
        assert_eq!(state.exploration_sites.len(), 5);
        for site in &state.exploration_sites {
            let km = home.distance_km(&site.location);
            assert!((10.0 - 1e-6..=100.0 + 1e-6).contains(&km), "site at {km} km");
            assert!((10.0..50.0).contains(&site.estimated_value));
            assert!(site.id.0.starts_with("site_"));
        }
    }

    #[test]
    fn test_same_seed_same_colony() {
        let content = base_content();
        let world = small_world();
        let (a, _) = new_colony(&content, &world, 3);
        let (b, _) = new_colony(&content, &world, 3);
        let ids = |s: &GameState| {
            s.exploration_sites
                .iter()
                .map(|site| site.id.0.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&a), ids(&b));
        let (c, _) = new_colony(&content, &world, 4);
        assert_ne!(ids(&a), ids(&c));
    }

    #[test]
    #[should_panic(expected = "over its")]
    fn test_overstocked_settlement_panics() {
        let content = base_content();
        let mut world = small_world();
        world.settlements[0].stores[0].kg = 20_000.0;
        validate_world(&world, &content);
    }

    #[test]
    #[should_panic(expected = "is not a known resource")]
    fn test_unknown_store_panics() {
        let content = base_content();
        let mut world = small_world();
        world.settlements[0].stores[0].resource = ResourceId("gold".to_string());
        validate_world(&world, &content);
    }
}
