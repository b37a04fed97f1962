//! Director-driven runs.
//!
//! These run the full tick loop with the `ColonyDirector` issuing commands and
//! check that the colony gets its expeditions out and home again.

use mars_control::{ColonyDirector, CommandSource};
use mars_core::test_fixtures::{add_settlement, base_content, base_state, make_rng, next_pulse};
use mars_core::*;

struct Run {
    events: Vec<EventEnvelope>,
    commands: Vec<CommandEnvelope>,
}

fn run_directed(state: &mut GameState, content: &GameContent, pulses: u32) -> Run {
    let mut rng = make_rng();
    let mut director = ColonyDirector::new();
    let mut next_command_id = 0u64;
    let mut run = Run {
        events: Vec::new(),
        commands: Vec::new(),
    };
    for _ in 0..pulses {
        let commands = director.generate_commands(state, content, &mut next_command_id);
        let pulse = next_pulse(state, content.constants.pulse_millisols);
        run.events.extend(tick(
            state,
            &commands,
            content,
            &mut rng,
            EventLevel::Normal,
            &pulse,
        ));
        run.commands.extend(commands);
    }
    run
}

fn completed_missions(events: &[EventEnvelope]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e.event, Event::MissionEnded { completed: true, .. }))
        .count()
}

#[test]
fn director_sends_out_an_expedition_that_comes_home() {
    let content = base_content();
    let mut state = base_state(&content);
    let run = run_directed(&mut state, &content, 150);

    assert!(run
        .events
        .iter()
        .any(|e| matches!(e.event, Event::MissionStarted { kind: MissionKind::Exploration, .. })));
    assert_eq!(completed_missions(&run.events), 1);
    assert!(state.exploration_sites.iter().filter(|s| s.explored).count() >= 2);
}

#[test]
fn director_never_overlaps_missions_from_one_settlement() {
    let content = base_content();
    let mut state = base_state(&content);
    let run = run_directed(&mut state, &content, 500);

    let mut active = 0i32;
    for envelope in &run.events {
        match envelope.event {
            Event::MissionStarted { .. } => {
                active += 1;
                assert_eq!(active, 1, "second mission started at pulse {}", envelope.pulse);
            }
            Event::MissionEnded { .. } => active = (active - 1).max(0),
            _ => {}
        }
    }
    let start_pulses: Vec<u64> = run
        .commands
        .iter()
        .filter(|c| matches!(c.command, Command::StartMission { .. }))
        .map(|c| c.issued_pulse)
        .collect();
    for pair in start_pulses.windows(2) {
        assert!(pair[1] - pair[0] >= 200, "starts at {pair:?}");
    }
}

#[test]
fn director_relieves_a_starving_neighbour() {
    let content = base_content();
    let mut state = base_state(&content);
    let needy = add_settlement(
        &mut state,
        "settlement_0002",
        Coordinates::new(0.0, 1.0),
        &[("food", 10.0)],
    );
    let run = run_directed(&mut state, &content, 150);

    assert!(run.events.iter().any(|e| matches!(
        &e.event,
        Event::SuppliesDelivered { settlement_id, .. } if *settlement_id == needy
    )));
    let food = state
        .ledger
        .stored(&ContainerId::from(&needy), &ResourceId("food".to_string()));
    assert!(food >= 100.0, "food {food}");
}
