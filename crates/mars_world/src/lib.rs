//! Content loading and colony generation shared between mars_cli and mars_daemon.

mod colony;
mod runs;

use anyhow::{Context, Result};
use mars_core::{
    EmergencyResourceDef, GameContent, MaintenancePartsDef, MalfunctionDef, ProcessDef,
    ResourceAmount, ResourceDef, ResourceId,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

pub use colony::{
    build_initial_state, load_world, new_colony, validate_world, BuildingSpec, ColonistSpec,
    ExplorationSpec, SettlementSpec, VehicleSpec, WorldDef,
};
pub use runs::{create_run_dir, generate_run_id, write_run_info, RunInfo};

#[derive(Deserialize)]
struct ResourcesFile {
    content_version: String,
    resources: Vec<ResourceDef>,
    emergency_resources: Vec<EmergencyResourceDef>,
}

#[derive(Deserialize)]
struct MalfunctionsFile {
    malfunctions: Vec<MalfunctionDef>,
    maintenance_parts: MaintenancePartsDef,
}

fn read_json<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<T> {
    let text =
        std::fs::read_to_string(dir.join(file)).with_context(|| format!("reading {file}"))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {file}"))
}

fn check_amounts(
    known: &HashSet<&ResourceId>,
    amounts: &[ResourceAmount],
    owner: &str,
    what: &str,
) {
    for amount in amounts {
        assert!(
            known.contains(&amount.resource),
            "{owner} {what} '{}' is not a known resource",
            amount.resource,
        );
        assert!(
            amount.kg.is_finite() && amount.kg > 0.0,
            "{owner} {what} '{}' has non-positive amount: {}",
            amount.resource,
            amount.kg,
        );
    }
}

/// Validates cross-references in loaded content, panicking on any authoring error.
///
/// Catches mistakes like a process consuming an unknown resource, a repair
/// that needs parts nobody stocks, or a constant naming a missing fuel.
pub fn validate_content(content: &GameContent) {
    let mut known: HashSet<&ResourceId> = HashSet::new();
    for resource in &content.resources {
        assert!(!resource.id.0.is_empty(), "resource has empty id");
        assert!(
            known.insert(&resource.id),
            "resource '{}' is defined twice",
            resource.id,
        );
    }

    let c = &content.constants;
    for (name, id) in [
        ("food_resource", &c.food_resource),
        ("fuel_resource", &c.fuel_resource),
        ("sample_resource", &c.sample_resource),
    ] {
        assert!(
            known.contains(id),
            "constant {name} '{id}' is not a known resource"
        );
    }
    for (name, value) in [
        ("time_ratio", c.time_ratio),
        ("pulse_millisols", c.pulse_millisols),
        ("max_pulse_millisols", c.max_pulse_millisols),
        ("probability_cap", c.probability_cap),
        ("experience_per_level", c.experience_per_level),
        ("wear_lifetime_millisols", c.wear_lifetime_millisols),
    ] {
        assert!(
            value.is_finite() && value > 0.0,
            "constant {name} must be positive, got {value}"
        );
    }

    let mut process_ids = HashSet::new();
    for process in &content.processes {
        assert!(
            process_ids.insert(&process.id),
            "process '{}' is defined twice",
            process.id,
        );
        assert!(
            process.work_millisols > 0.0,
            "process '{}' has non-positive work: {}",
            process.id,
            process.work_millisols,
        );
        let owner = format!("process '{}'", process.id);
        check_amounts(&known, &process.inputs, &owner, "input");
        check_amounts(&known, &process.outputs, &owner, "output");
    }

    for malfunction in &content.malfunctions {
        assert!(
            malfunction.severity > 0.0,
            "malfunction '{}' has non-positive severity",
            malfunction.id,
        );
        let owner = format!("malfunction '{}'", malfunction.id);
        check_amounts(&known, &malfunction.repair_parts, &owner, "repair part");
    }

    for def in &content.emergency_resources {
        assert!(
            known.contains(&def.resource),
            "emergency resource '{}' is not a known resource",
            def.resource,
        );
        assert!(
            def.required_kg > 0.0,
            "emergency resource '{}' has non-positive delivery size",
            def.resource,
        );
    }

    check_amounts(
        &known,
        &content.maintenance_parts.building,
        "building maintenance",
        "part",
    );
    check_amounts(
        &known,
        &content.maintenance_parts.vehicle,
        "vehicle maintenance",
        "part",
    );
}

pub fn load_content(content_dir: &str) -> Result<GameContent> {
    let dir = Path::new(content_dir);
    let constants = read_json(dir, "constants.json")?;
    let resources_file: ResourcesFile = read_json(dir, "resources.json")?;
    let processes: Vec<ProcessDef> = read_json(dir, "processes.json")?;
    let malfunctions_file: MalfunctionsFile = read_json(dir, "malfunctions.json")?;
    let content = GameContent {
        content_version: resources_file.content_version,
        resources: resources_file.resources,
        processes,
        malfunctions: malfunctions_file.malfunctions,
        emergency_resources: resources_file.emergency_resources,
        maintenance_parts: malfunctions_file.maintenance_parts,
        constants,
    };
    validate_content(&content);
    tracing::debug!(
        version = %content.content_version,
        resources = content.resources.len(),
        processes = content.processes.len(),
        "content loaded"
    );
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mars_core::test_fixtures::{base_content, minimal_content};
    use mars_core::ProcessId;

    fn amount(resource: &str, kg: f64) -> ResourceAmount {
        ResourceAmount {
            resource: ResourceId(resource.to_string()),
            kg,
        }
    }

    #[test]
    fn test_valid_content_passes_validation() {
        validate_content(&base_content());
        validate_content(&minimal_content());
    }

    #[test]
    #[should_panic(expected = "is defined twice")]
    fn test_duplicate_resource_panics() {
        let mut content = minimal_content();
        let food = content.resources[0].clone();
        content.resources.push(food);
        validate_content(&content);
    }

    #[test]
    #[should_panic(expected = "not a known resource")]
    fn test_process_unknown_input_panics() {
        let mut content = base_content();
        content.processes.push(ProcessDef {
            id: ProcessId("proc_ghost".to_string()),
            name: "Ghost".to_string(),
            work_millisols: 10.0,
            inputs: vec![amount("unobtainium", 1.0)],
            outputs: vec![amount("water", 1.0)],
        });
        validate_content(&content);
    }

    #[test]
    #[should_panic(expected = "non-positive work")]
    fn test_zero_work_process_panics() {
        let mut content = base_content();
        content.processes[0].work_millisols = 0.0;
        validate_content(&content);
    }

    #[test]
    #[should_panic(expected = "constant fuel_resource")]
    fn test_unknown_fuel_panics() {
        let mut content = base_content();
        content.constants.fuel_resource = ResourceId("hydrazine".to_string());
        validate_content(&content);
    }

    #[test]
    #[should_panic(expected = "repair part")]
    fn test_repair_part_unknown_panics() {
        let mut content = base_content();
        content.malfunctions[0].repair_parts = vec![amount("gaskets", 1.0)];
        validate_content(&content);
    }

    #[test]
    #[should_panic(expected = "emergency resource")]
    fn test_emergency_resource_unknown_panics() {
        let mut content = base_content();
        content.emergency_resources[0].resource = ResourceId("coffee".to_string());
        validate_content(&content);
    }

    #[test]
    #[should_panic(expected = "constant pulse_millisols must be positive")]
    fn test_zero_pulse_panics() {
        let mut content = base_content();
        content.constants.pulse_millisols = 0.0;
        validate_content(&content);
    }
}
