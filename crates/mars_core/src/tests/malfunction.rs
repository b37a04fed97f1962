use super::*;
use crate::malfunction::{manager, manager_mut, WEAR_PRISTINE};

fn habitat() -> Malfunctionable {
    Malfunctionable::Building(BuildingId("building_0001".to_string()))
}

#[test]
fn buildings_and_parked_vehicles_age_each_pulse() {
    let content = test_content();
    let mut state = test_state(&content);
    run_pulses(&mut state, &content, &mut make_rng(), 10, 10.0);

    let building = manager(&state, &habitat()).unwrap();
    assert!((building.time_since_maintenance - 100.0).abs() < 1e-9);
    let expected = WEAR_PRISTINE - WEAR_PRISTINE * 100.0 / content.constants.wear_lifetime_millisols;
    assert!((building.wear_condition - expected).abs() < 1e-9);

    let rover_wear = manager(&state, &Malfunctionable::Vehicle(rover())).unwrap();
    assert!((rover_wear.time_since_maintenance - 100.0).abs() < 1e-9);
}

#[test]
fn vehicles_away_do_not_age_in_the_garage() {
    let content = test_content();
    let mut state = test_state(&content);
    state.vehicles.get_mut(&rover()).unwrap().parked_at = None;
    run_pulses(&mut state, &content, &mut make_rng(), 5, 10.0);
    let rover_wear = manager(&state, &Malfunctionable::Vehicle(rover())).unwrap();
    assert!(rover_wear.time_since_maintenance.abs() < 1e-12);
}

#[test]
fn certain_failure_breaks_everything_once() {
    let mut content = test_content();
    content.constants.malfunction_base_rate = 1.0;
    let mut state = test_state(&content);
    let events = tick_once(&mut state, &[], &content, 10.0);

    // Three buildings and the parked rover.
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::MalfunctionOccurred { .. })),
        4
    );
    assert!(state
        .buildings
        .values()
        .all(|b| b.malfunctions.has_malfunction()));
    assert_eq!(state.counters.next_malfunction_id, 4);
}

#[test]
fn wear_bands_set_efficiency() {
    let content = test_content();
    let c = &content.constants;
    let mut m = MalfunctionManager::new(1000.0, Vec::new());
    assert!((m.efficiency(c) - 1.0).abs() < 1e-9);

    m.degrade(60.0);
    assert!((m.efficiency(c) - c.wear_band_degraded_efficiency).abs() < 1e-9);
    m.degrade(30.0);
    assert!((m.efficiency(c) - c.wear_band_critical_efficiency).abs() < 1e-9);

    m.add_malfunction(content.malfunction("mal_seal_leak"), 1);
    assert!((m.efficiency(c) - c.wear_band_critical_efficiency * 0.5).abs() < 1e-9);

    m.complete_maintenance();
    assert!((m.wear_condition - WEAR_PRISTINE).abs() < 1e-9);
    assert!(m.has_malfunction(), "maintenance does not repair");
}

#[test]
fn worn_equipment_fails_more_often() {
    let mut m = MalfunctionManager::new(1000.0, Vec::new());
    let fresh = m.malfunction_chance(10.0, 0.001);
    m.degrade(50.0);
    let worn = m.malfunction_chance(10.0, 0.001);
    assert!(worn > fresh);
    assert!((m.malfunction_chance(1.0e9, 1.0) - 1.0).abs() < 1e-12);
}

#[test]
fn worst_malfunction_prefers_severity_then_age() {
    let content = test_content();
    let mut m = MalfunctionManager::new(1000.0, Vec::new());
    m.add_malfunction(content.malfunction("mal_seal_leak"), 1);
    m.add_malfunction(content.malfunction("mal_power_fault"), 2);
    m.add_malfunction(content.malfunction("mal_power_fault"), 3);
    assert_eq!(m.worst_malfunction().unwrap().id, 2);
}

#[test]
fn accident_during_maintenance_breaks_the_target() {
    let mut content = test_content();
    content.constants.accident_base_rate = 1.0;
    let mut state = test_state(&content);
    let target = habitat();
    manager_mut(&mut state, &target).unwrap().add_time(600.0);

    let (task, events) = run_task(
        &mut state,
        &content,
        &agent(1),
        TaskKind::Maintenance {
            target: target.clone(),
        },
        100.0,
        4,
    );
    assert!(!task.completed);
    assert!(events.iter().any(|e| matches!(e.event, Event::Accident { .. })));
    let m = manager(&state, &target).unwrap();
    assert!(m.has_malfunction());
    assert!(m.wear_condition < WEAR_PRISTINE);
}
