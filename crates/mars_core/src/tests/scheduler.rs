use super::*;
use crate::task::set_phase_unchecked;

#[test]
fn idle_agents_pick_up_work() {
    let content = test_content();
    let mut state = test_state(&content);
    let events = tick_once(&mut state, &[], &content, 10.0);

    for n in 1..=3 {
        let id = agent(n);
        assert!(
            events.iter().any(|e| matches!(
                &e.event,
                Event::TaskStarted { agent_id, .. } if *agent_id == id
            )),
            "{id} never started a task"
        );
        assert!(state.agents[&id].mind.task.is_some());
    }
}

#[test]
fn selection_cap_of_zero_keeps_everyone_idle() {
    let mut content = test_content();
    content.constants.max_task_selections_per_pulse = 0;
    let mut state = test_state(&content);
    let events = tick_once(&mut state, &[], &content, 10.0);
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::TaskStarted { .. })),
        0
    );
    assert!(state.agents.values().all(|a| a.mind.task.is_none()));
}

#[test]
fn starving_agent_dies_and_drops_what_they_carried() {
    let content = test_content();
    let mut state = test_state(&content);
    let id = agent(3);
    state.agents.get_mut(&id).unwrap().condition.as_mut().unwrap().hunger =
        content.constants.starvation_threshold - 0.01;
    state
        .ledger
        .store(&ContainerId::from(&id), &resource("regolith"), 5.0);

    let events = tick_once(&mut state, &[], &content, 10.0);

    let victim = &state.agents[&id];
    assert!(!victim.alive);
    assert!(victim.mind.task.is_none());
    assert!(!state.ledger.has_container(&ContainerId::from(&id)));
    assert!((state.ledger.stored(&home_stores(), &resource("regolith")) - 5.0).abs() < 1e-9);
    assert!(events.iter().any(|e| matches!(
        &e.event,
        Event::AgentDied { agent_id, cause } if *agent_id == id && cause == "starvation"
    )));
}

#[test]
fn dead_agents_are_skipped() {
    let content = test_content();
    let mut state = test_state(&content);
    let id = agent(1);
    state.agents.get_mut(&id).unwrap().alive = false;
    let fatigue_before = state.agents[&id].condition.as_ref().unwrap().fatigue;

    let events = run_pulses(&mut state, &content, &mut make_rng(), 5, 10.0);

    assert!(!events.iter().any(|e| matches!(
        &e.event,
        Event::TaskStarted { agent_id, .. } if *agent_id == id
    )));
    let fatigue_after = state.agents[&id].condition.as_ref().unwrap().fatigue;
    assert!((fatigue_after - fatigue_before).abs() < 1e-12);
}

#[test]
fn broken_task_fails_without_stopping_the_pulse() {
    let content = test_content();
    let mut state = test_state(&content);
    let id = agent(1);
    let mut broken = task::create_task(&mut state, &content, &id, TaskKind::Relax);
    set_phase_unchecked(&mut broken, TaskPhase::Driving);
    state.agents.get_mut(&id).unwrap().mind.task = Some(broken);

    let events = tick_once(&mut state, &[], &content, 10.0);

    assert!(events.iter().any(|e| matches!(
        &e.event,
        Event::TaskFailed { agent_id, task_kind, .. } if *agent_id == id && task_kind == "Relax"
    )));
    assert!(events.iter().any(|e| matches!(
        &e.event,
        Event::TaskStarted { agent_id, .. } if *agent_id == id
    )));
    assert_eq!(state.meta.pulse, 1);
}

#[test]
fn body_accrues_every_pulse() {
    let content = test_content();
    let mut state = test_state(&content);
    run_pulses(&mut state, &content, &mut make_rng(), 10, 10.0);
    let hunger = state.agents[&agent(2)].condition.as_ref().unwrap().hunger;
    // 100 millisols at 0.05 per millisol, and nobody is hungry enough to eat yet.
    assert!((hunger - 5.0).abs() < 1e-6, "hunger {hunger}");
}

#[test]
fn same_seed_same_history() {
    let content = test_content();
    let run = || {
        let mut state = test_state(&content);
        let events = run_pulses(&mut state, &content, &mut make_rng(), 60, 10.0);
        serde_json::to_string(&events).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn task_making_no_progress_is_dropped_after_stall_limit() {
    let mut content = test_content();
    content.constants.wear_band_critical_efficiency = 0.0;
    let mut state = test_state(&content);
    let workshop = BuildingId(test_fixtures::WORKSHOP.to_string());
    state.buildings.get_mut(&workshop).unwrap().malfunctions.wear_condition = 0.0;
    let id = agent(1);
    let stuck = task::create_task(
        &mut state,
        &content,
        &id,
        TaskKind::Manufacture {
            building: workshop,
            process: ProcessId("proc_melt_ice".to_string()),
        },
    );
    assert!(!stuck.is_done());
    state.agents.get_mut(&id).unwrap().mind.task = Some(stuck);

    let gave_up = |events: &[EventEnvelope]| {
        events.iter().any(|e| matches!(
            &e.event,
            Event::TaskEnded { agent_id, task_kind, completed: false }
                if *agent_id == id && task_kind == "Manufacture"
        ))
    };

    assert_eq!(content.constants.stall_limit, 3);
    for expected in 1..=2 {
        let events = tick_once(&mut state, &[], &content, 10.0);
        assert!(!gave_up(&events), "dropped early on pulse {expected}");
        assert_eq!(state.agents[&id].mind.stalled_calls, expected);
    }
    let events = tick_once(&mut state, &[], &content, 10.0);
    assert!(gave_up(&events));
}
