use super::*;

fn rejected(events: &[EventEnvelope]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match &e.event {
            Event::CommandRejected { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn set_job_changes_the_job() {
    let content = test_content();
    let mut state = test_state(&content);
    let cmd = command(
        &state,
        Command::SetJob {
            agent_id: agent(3),
            job: Job::Technician,
        },
    );
    let events = tick_once(&mut state, &[cmd], &content, 10.0);
    assert_eq!(state.agents[&agent(3)].job, Job::Technician);
    assert!(events.iter().any(|e| matches!(
        e.event,
        Event::JobChanged {
            job: Job::Technician,
            ..
        }
    )));
}

#[test]
fn robots_have_no_job_to_change() {
    let content = test_content();
    let mut state = test_state(&content);
    let bot = test_fixtures::robot(&mut state, "agent_9000");
    let cmd = command(
        &state,
        Command::SetJob {
            agent_id: bot.clone(),
            job: Job::Pilot,
        },
    );
    let events = tick_once(&mut state, &[cmd], &content, 10.0);
    assert_eq!(state.agents[&bot].job, Job::Unassigned);
    assert_eq!(rejected(&events).len(), 1);
}

#[test]
fn reassign_role_records_the_new_role() {
    let content = test_content();
    let mut state = test_state(&content);
    let cmd = command(
        &state,
        Command::ReassignRole {
            agent_id: agent(1),
            role: Role::Crew,
        },
    );
    tick_once(&mut state, &[cmd], &content, 10.0);
    assert_eq!(state.agents[&agent(1)].role, Role::Crew);
}

#[test]
fn rename_trims_and_refuses_blank_names() {
    let content = test_content();
    let mut state = test_state(&content);
    let building = BuildingId("building_0001".to_string());

    let blank = command(
        &state,
        Command::RenameBuilding {
            building_id: building.clone(),
            name: "   ".to_string(),
        },
    );
    let events = tick_once(&mut state, &[blank], &content, 10.0);
    assert_eq!(rejected(&events).len(), 1);
    assert_eq!(state.buildings[&building].name, "Habitat One");

    let renamed = command(
        &state,
        Command::RenameBuilding {
            building_id: building.clone(),
            name: "  Dome  ".to_string(),
        },
    );
    tick_once(&mut state, &[renamed], &content, 10.0);
    assert_eq!(state.buildings[&building].name, "Dome");
}

#[test]
fn commands_wait_for_their_pulse() {
    let content = test_content();
    let mut state = test_state(&content);
    let mut cmd = command(
        &state,
        Command::SetJob {
            agent_id: agent(2),
            job: Job::Pilot,
        },
    );
    cmd.execute_at_pulse = 2;

    tick_once(&mut state, std::slice::from_ref(&cmd), &content, 10.0);
    assert_eq!(state.agents[&agent(2)].job, Job::Areologist);
    tick_once(&mut state, std::slice::from_ref(&cmd), &content, 10.0);
    assert_eq!(state.agents[&agent(2)].job, Job::Areologist);
    tick_once(&mut state, std::slice::from_ref(&cmd), &content, 10.0);
    assert_eq!(state.agents[&agent(2)].job, Job::Pilot);
}

#[test]
fn unknown_targets_are_rejected_not_fatal() {
    let content = test_content();
    let mut state = test_state(&content);
    let commands = [
        command(
            &state,
            Command::AbortMission {
                mission_id: MissionId("mission_0042".to_string()),
            },
        ),
        command(
            &state,
            Command::StartMission {
                kind: MissionKind::Exploration,
                initiator: AgentId("agent_0404".to_string()),
            },
        ),
        command(
            &state,
            Command::RenameBuilding {
                building_id: BuildingId("building_0404".to_string()),
                name: "Nowhere".to_string(),
            },
        ),
    ];
    let events = tick_once(&mut state, &commands, &content, 10.0);
    assert_eq!(rejected(&events).len(), 3);
    assert!(state.missions.is_empty());
    assert_eq!(state.meta.pulse, 1);
}

#[test]
fn start_and_abort_by_command() {
    let content = test_content();
    let mut state = test_state(&content);
    let cmd = command(
        &state,
        Command::StartMission {
            kind: MissionKind::Exploration,
            initiator: agent(1),
        },
    );
    let events = tick_once(&mut state, &[cmd], &content, 10.0);
    let started: Vec<MissionId> = events
        .iter()
        .filter_map(|e| match &e.event {
            Event::MissionStarted { mission_id, .. } => Some(mission_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(started.len(), 1);
    let id = started[0].clone();

    let abort = command(
        &state,
        Command::AbortMission {
            mission_id: id.clone(),
        },
    );
    let events = tick_once(&mut state, &[abort], &content, 10.0);
    assert!(state.missions[&id].is_done());
    assert!(events.iter().any(|e| matches!(
        &e.event,
        Event::MissionEnded { mission_id, completed: false, .. } if *mission_id == id
    )));
}

#[test]
fn refused_mission_is_reported_and_recorded() {
    let content = test_content();
    let mut state = test_state(&content);
    state.vehicles.get_mut(&rover()).unwrap().maintenance = Some(Holder::Agent(agent(3)));
    let cmd = command(
        &state,
        Command::StartMission {
            kind: MissionKind::Exploration,
            initiator: agent(1),
        },
    );
    let events = tick_once(&mut state, &[cmd], &content, 10.0);
    assert_eq!(rejected(&events).len(), 1);
    assert_eq!(state.missions.len(), 1);
    assert!(state.missions.values().all(MissionState::is_done));
}
