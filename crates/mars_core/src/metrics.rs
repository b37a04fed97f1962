//! Snapshot metrics computed from `GameState`.
//!
//! `compute_metrics(&GameState, &GameContent) -> MetricsSnapshot` samples the
//! colony for time-series analysis. No state mutation. The CSV helpers below
//! are the only IO in the crate and are driven by the binaries.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::agent::Placement;
use crate::ledger::EquipmentKind;
use crate::mission::{MissionPhase, MissionStatus};
use crate::{ContainerId, GameContent, GameState};

/// Bumped whenever columns are added, removed or reordered.
const METRICS_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub pulse: u64,
    pub metrics_version: u32,
    pub sol: u64,

    // Population
    pub population_alive: u32,
    pub population_dead: u32,
    pub robots: u32,
    pub agents_idle: u32,
    pub agents_outside: u32,
    pub agents_on_mission: u32,

    // Physiology (living persons)
    pub avg_fatigue: f32,
    pub avg_hunger: f32,
    pub avg_stress: f32,

    // Stores (settlements only)
    pub total_food_kg: f32,
    pub total_fuel_kg: f32,
    pub total_stored_kg: f32,
    pub settlement_storage_used_pct: f32,
    pub eva_suits_available: u32,

    // Missions
    pub missions_active: u32,
    pub missions_completed: u32,
    pub missions_failed: u32,
    pub members_lost: u32,

    // Fleet
    pub vehicles_total: u32,
    pub vehicles_reserved: u32,

    // Wear & malfunctions (buildings and vehicles)
    pub avg_wear_condition: f32,
    pub min_wear_condition: f32,
    pub active_malfunctions: u32,
    pub processes_running: u32,

    // Exploration
    pub sites_total: u32,
    pub sites_explored: u32,
}

#[derive(Default)]
struct PopulationTally {
    alive: u32,
    dead: u32,
    robots: u32,
    idle: u32,
    outside: u32,
    on_mission: u32,
    persons: u32,
    fatigue: f32,
    hunger: f32,
    stress: f32,
}

#[allow(clippy::cast_possible_truncation)]
fn tally_population(state: &GameState) -> PopulationTally {
    let mut t = PopulationTally::default();
    for agent in state.agents.values() {
        if !agent.alive {
            t.dead += 1;
            continue;
        }
        t.alive += 1;
        if !agent.is_person() {
            t.robots += 1;
        }
        if agent.mind.task.is_none() {
            t.idle += 1;
        }
        if agent.placement == Placement::Outside {
            t.outside += 1;
        }
        if agent.mind.mission.is_some() {
            t.on_mission += 1;
        }
        if let Some(condition) = &agent.condition {
            t.persons += 1;
            t.fatigue += condition.fatigue as f32;
            t.hunger += condition.hunger as f32;
            t.stress += condition.stress as f32;
        }
    }
    t
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]
pub fn compute_metrics(state: &GameState, content: &GameContent) -> MetricsSnapshot {
    let c = &content.constants;
    let population = tally_population(state);
    let per_person = |sum: f32| {
        if population.persons > 0 {
            sum / population.persons as f32
        } else {
            0.0
        }
    };

    let mut total_food_kg = 0.0_f32;
    let mut total_fuel_kg = 0.0_f32;
    let mut total_stored_kg = 0.0_f32;
    let mut storage_sum = 0.0_f32;
    let mut eva_suits_available = 0_u32;
    for id in state.settlements.keys() {
        let stores = ContainerId::from(id);
        total_food_kg += state.ledger.stored(&stores, &c.food_resource) as f32;
        total_fuel_kg += state.ledger.stored(&stores, &c.fuel_resource) as f32;
        let stored = state.ledger.total_stored(&stores);
        total_stored_kg += stored as f32;
        let capacity = state.ledger.capacity(&stores);
        if capacity > 0.0 {
            storage_sum += (stored / capacity) as f32;
        }
        eva_suits_available += state
            .ledger
            .equipment_in(EquipmentKind::EvaSuit, &stores)
            .iter()
            .filter(|suit| {
                state
                    .ledger
                    .equipment(suit)
                    .is_some_and(crate::ledger::EquipmentRecord::is_available)
            })
            .count() as u32;
    }
    let settlement_storage_used_pct = if state.settlements.is_empty() {
        0.0
    } else {
        storage_sum / state.settlements.len() as f32 * 100.0
    };

    let mut missions_active = 0_u32;
    let mut missions_completed = 0_u32;
    let mut missions_failed = 0_u32;
    let mut members_lost = 0_u32;
    for mission in state.missions.values() {
        if mission.statuses.contains(&MissionStatus::MemberLost) {
            members_lost += 1;
        }
        if !mission.is_done() {
            missions_active += 1;
        } else if mission.phase == MissionPhase::Completed && !mission.has_terminal_status() {
            missions_completed += 1;
        } else {
            missions_failed += 1;
        }
    }

    let managers = state
        .buildings
        .values()
        .map(|b| &b.malfunctions)
        .chain(state.vehicles.values().map(|v| &v.malfunctions));
    let mut wear_sum = 0.0_f32;
    let mut wear_count = 0_u32;
    let mut min_wear_condition = 0.0_f32;
    let mut active_malfunctions = 0_u32;
    for manager in managers {
        let wear = manager.wear_condition as f32;
        min_wear_condition = if wear_count == 0 {
            wear
        } else {
            min_wear_condition.min(wear)
        };
        wear_sum += wear;
        wear_count += 1;
        active_malfunctions += manager.active.len() as u32;
    }
    let avg_wear_condition = if wear_count > 0 {
        wear_sum / wear_count as f32
    } else {
        0.0
    };

    MetricsSnapshot {
        pulse: state.meta.pulse,
        metrics_version: METRICS_VERSION,
        sol: state.meta.time.sol(),
        population_alive: population.alive,
        population_dead: population.dead,
        robots: population.robots,
        agents_idle: population.idle,
        agents_outside: population.outside,
        agents_on_mission: population.on_mission,
        avg_fatigue: per_person(population.fatigue),
        avg_hunger: per_person(population.hunger),
        avg_stress: per_person(population.stress),
        total_food_kg,
        total_fuel_kg,
        total_stored_kg,
        settlement_storage_used_pct,
        eva_suits_available,
        missions_active,
        missions_completed,
        missions_failed,
        members_lost,
        vehicles_total: state.vehicles.len() as u32,
        vehicles_reserved: state
            .vehicles
            .values()
            .filter(|v| v.reserved_by.is_some())
            .count() as u32,
        avg_wear_condition,
        min_wear_condition,
        active_malfunctions,
        processes_running: state
            .buildings
            .values()
            .filter(|b| b.active_process.is_some())
            .count() as u32,
        sites_total: state.exploration_sites.len() as u32,
        sites_explored: state.exploration_sites.iter().filter(|s| s.explored).count() as u32,
    }
}

/// Write the CSV header row for metrics.
pub fn write_metrics_header(writer: &mut impl Write) -> io::Result<()> {
    writeln!(
        writer,
        "pulse,metrics_version,sol,\
         population_alive,population_dead,robots,agents_idle,agents_outside,agents_on_mission,\
         avg_fatigue,avg_hunger,avg_stress,\
         total_food_kg,total_fuel_kg,total_stored_kg,settlement_storage_used_pct,eva_suits_available,\
         missions_active,missions_completed,missions_failed,members_lost,\
         vehicles_total,vehicles_reserved,\
         avg_wear_condition,min_wear_condition,active_malfunctions,processes_running,\
         sites_total,sites_explored"
    )
}

/// Append a single metrics snapshot as a CSV row.
pub fn append_metrics_row(
    writer: &mut impl Write,
    snapshot: &MetricsSnapshot,
) -> io::Result<()> {
    writeln!(
        writer,
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        snapshot.pulse,
        snapshot.metrics_version,
        snapshot.sol,
        snapshot.population_alive,
        snapshot.population_dead,
        snapshot.robots,
        snapshot.agents_idle,
        snapshot.agents_outside,
        snapshot.agents_on_mission,
        snapshot.avg_fatigue,
        snapshot.avg_hunger,
        snapshot.avg_stress,
        snapshot.total_food_kg,
        snapshot.total_fuel_kg,
        snapshot.total_stored_kg,
        snapshot.settlement_storage_used_pct,
        snapshot.eva_suits_available,
        snapshot.missions_active,
        snapshot.missions_completed,
        snapshot.missions_failed,
        snapshot.members_lost,
        snapshot.vehicles_total,
        snapshot.vehicles_reserved,
        snapshot.avg_wear_condition,
        snapshot.min_wear_condition,
        snapshot.active_malfunctions,
        snapshot.processes_running,
        snapshot.sites_total,
        snapshot.sites_explored,
    )
}

const MAX_ROWS_PER_FILE: usize = 50_000;

/// CSV sink for snapshots, one header per file.
///
/// Starts in `metrics.csv` and rolls over to `metrics_001.csv`,
/// `metrics_002.csv` and so on every [`MAX_ROWS_PER_FILE`] rows.
pub struct MetricsFileWriter {
    run_dir: PathBuf,
    part: u32,
    rows: usize,
    out: BufWriter<File>,
}

impl MetricsFileWriter {
    pub fn new(run_dir: PathBuf) -> io::Result<Self> {
        let out = create_part(&run_dir, 0)?;
        Ok(Self {
            run_dir,
            part: 0,
            rows: 0,
            out,
        })
    }

    /// Appends and flushes one row so a crashed run keeps what it sampled.
    pub fn write_row(&mut self, snapshot: &MetricsSnapshot) -> io::Result<()> {
        if self.rows == MAX_ROWS_PER_FILE {
            self.out.flush()?;
            self.part += 1;
            self.out = create_part(&self.run_dir, self.part)?;
            self.rows = 0;
        }
        append_metrics_row(&mut self.out, snapshot)?;
        self.rows += 1;
        self.out.flush()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn part_name(part: u32) -> String {
    match part {
        0 => "metrics.csv".to_string(),
        n => format!("metrics_{n:03}.csv"),
    }
}

fn create_part(run_dir: &Path, part: u32) -> io::Result<BufWriter<File>> {
    let mut out = BufWriter::new(File::create(run_dir.join(part_name(part)))?);
    write_metrics_header(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{base_content, base_state};

    #[test]
    fn fixture_colony_counts() {
        let content = base_content();
        let state = base_state(&content);
        let snapshot = compute_metrics(&state, &content);

        assert_eq!(snapshot.pulse, 0);
        assert_eq!(snapshot.metrics_version, METRICS_VERSION);
        assert_eq!(snapshot.population_alive as usize, state.agents.len());
        assert_eq!(snapshot.population_dead, 0);
        assert_eq!(snapshot.missions_active, 0);
        assert_eq!(snapshot.vehicles_total as usize, state.vehicles.len());
        assert!(snapshot.total_food_kg > 0.0);
        assert!((snapshot.avg_wear_condition - 100.0).abs() < 1e-3);
    }

    #[test]
    fn header_and_row_have_the_same_width() {
        let content = base_content();
        let state = base_state(&content);
        let mut buf = Vec::new();
        write_metrics_header(&mut buf).unwrap();
        append_metrics_row(&mut buf, &compute_metrics(&state, &content)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let widths: Vec<usize> = text.lines().map(|l| l.split(',').count()).collect();
        assert_eq!(widths.len(), 2);
        assert_eq!(widths[0], widths[1]);
    }

    #[test]
    fn dead_agents_are_counted_apart() {
        let content = base_content();
        let mut state = base_state(&content);
        let id = state.agents.keys().min().cloned().unwrap();
        state.agents.get_mut(&id).unwrap().alive = false;
        let snapshot = compute_metrics(&state, &content);
        assert_eq!(snapshot.population_dead, 1);
        assert_eq!(snapshot.population_alive as usize, state.agents.len() - 1);
    }

    #[test]
    fn writer_creates_metrics_csv_in_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let content = base_content();
        let state = base_state(&content);
        let mut writer = MetricsFileWriter::new(dir.path().to_path_buf()).unwrap();
        writer.write_row(&compute_metrics(&state, &content)).unwrap();
        writer.flush().unwrap();
        let text = std::fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn rollover_files_are_numbered() {
        assert_eq!(part_name(0), "metrics.csv");
        assert_eq!(part_name(1), "metrics_001.csv");
        assert_eq!(part_name(12), "metrics_012.csv");
    }
}
