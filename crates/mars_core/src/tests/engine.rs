use super::*;

#[test]
fn tick_advances_time_and_pulse() {
    let content = test_content();
    let mut state = test_state(&content);
    tick_once(&mut state, &[], &content, 10.0);
    tick_once(&mut state, &[], &content, 15.0);
    assert_eq!(state.meta.pulse, 2);
    assert!((state.meta.time.total_millisols() - 25.0).abs() < 1e-9);
}

#[test]
fn empty_or_stale_pulses_are_ignored() {
    let content = test_content();
    let mut state = test_state(&content);
    let mut rng = make_rng();

    let empty = Pulse {
        id: 0,
        elapsed: 0.0,
        time: state.meta.time,
    };
    assert!(tick(&mut state, &[], &content, &mut rng, EventLevel::Normal, &empty).is_empty());

    let backwards = Pulse {
        id: 0,
        elapsed: 10.0,
        time: state.meta.time,
    };
    assert!(tick(&mut state, &[], &content, &mut rng, EventLevel::Normal, &backwards).is_empty());

    let nan = Pulse {
        id: 0,
        elapsed: f64::NAN,
        time: state.meta.time.plus(10.0),
    };
    assert!(tick(&mut state, &[], &content, &mut rng, EventLevel::Normal, &nan).is_empty());

    assert_eq!(state.meta.pulse, 0);
    assert!(state.agents.values().all(|a| a.mind.task.is_none()));
}

#[test]
fn event_ids_increase_across_pulses() {
    let content = test_content();
    let mut state = test_state(&content);
    let events = run_pulses(&mut state, &content, &mut make_rng(), 20, 10.0);
    assert!(!events.is_empty());
    for pair in events.windows(2) {
        assert!(pair[0].id < pair[1].id, "{} then {}", pair[0].id, pair[1].id);
        assert!(pair[0].pulse <= pair[1].pulse);
    }
    assert_eq!(state.counters.next_event_id as usize, events.len());
}

#[test]
fn phase_changes_only_at_debug_level() {
    let content = test_content();
    let mut state = test_state(&content);
    let events = run_pulses(&mut state, &content, &mut make_rng(), 80, 10.0);
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::TaskPhaseChanged { .. })),
        0
    );
}

#[test]
fn state_survives_a_json_round_trip_mid_run() {
    let content = test_content();
    let mut state = test_state(&content);
    let mut rng = make_rng();
    run_pulses(&mut state, &content, &mut rng, 30, 10.0);

    let json = serde_json::to_string(&state).unwrap();
    let mut restored: GameState = serde_json::from_str(&json).unwrap();
    let mut rng_copy = rng.clone();
    let a = run_pulses(&mut state, &content, &mut rng, 10, 10.0);
    let b = run_pulses(&mut restored, &content, &mut rng_copy, 10, 10.0);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}
