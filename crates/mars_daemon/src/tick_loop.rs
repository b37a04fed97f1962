use crate::state::{EventTx, SharedSim, SimState};
use mars_control::CommandSource;
use mars_core::{CommandEnvelope, EventEnvelope, EventLevel, Pulse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{Interval, MissedTickBehavior};

const PAUSED_POLL: Duration = Duration::from_millis(50);

/// Applies one pulse: queued operator commands first, then the director's.
pub fn step(sim: &mut SimState, pulse: &Pulse) -> Vec<EventEnvelope> {
    let SimState {
        game_state,
        content,
        rng,
        director,
        next_command_id,
        pending_commands,
        ..
    } = sim;
    let mut commands: Vec<CommandEnvelope> = pending_commands.drain(..).collect();
    if let Some(director) = director.as_mut() {
        commands.extend(director.generate_commands(game_state, content, next_command_id));
    }
    let events = mars_core::tick(
        game_state,
        &commands,
        content,
        rng,
        EventLevel::Normal,
        pulse,
    );

    let metrics_every = sim.metrics_every;
    if metrics_every > 0 && sim.game_state.meta.pulse % metrics_every == 0 {
        let snapshot = mars_core::compute_metrics(&sim.game_state, &sim.content);
        sim.push_metrics(snapshot);
    }
    events
}

/// Drives the simulation until `max_pulses` is reached, or forever.
///
/// With `pulses_per_sec > 0` each pulse covers the real time since the last
/// one, scaled by the clock's time ratio. Otherwise pulses are fixed-size
/// and run as fast as the runtime allows.
pub async fn run_pulse_loop(
    sim: SharedSim,
    event_tx: EventTx,
    paused: Arc<AtomicBool>,
    pulses_per_sec: f64,
    max_pulses: Option<u64>,
) {
    let mut interval = if pulses_per_sec > 0.0 {
        let mut iv = tokio::time::interval(Duration::from_secs_f64(1.0 / pulses_per_sec));
        iv.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Some(iv)
    } else {
        None
    };
    let mut last = Instant::now();

    loop {
        if paused.load(Ordering::Relaxed) {
            tokio::time::sleep(PAUSED_POLL).await;
            last = Instant::now();
            continue;
        }

        let (events, done) = {
            let mut guard = sim.lock();
            let pulse = if interval.is_some() {
                let now = Instant::now();
                let pulse = guard.clock.advance(now - last);
                last = now;
                pulse
            } else {
                let millisols = guard.content.constants.pulse_millisols;
                guard.clock.pulse_fixed(millisols)
            };
            let events = pulse.map_or_else(Vec::new, |pulse| step(&mut guard, &pulse));
            let done = max_pulses.is_some_and(|max| guard.game_state.meta.pulse >= max);
            (events, done)
        };

        if !events.is_empty() {
            let _ = event_tx.send(events);
        }
        if done {
            tracing::info!("max pulses reached, stopping pulse loop");
            break;
        }

        wait(&mut interval).await;
    }
}

async fn wait(interval: &mut Option<Interval>) {
    match interval {
        Some(iv) => {
            iv.tick().await;
        }
        None => tokio::task::yield_now().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{make_test_sim, METRICS_HISTORY_LEN};
    use mars_core::{AgentId, Command, Event, MissionKind, PrincipalId};

    fn fixed_pulse(sim: &mut SimState) -> Pulse {
        sim.clock.pulse_fixed(10.0).unwrap()
    }

    #[test]
    fn test_step_applies_queued_commands() {
        let mut sim = make_test_sim();
        let envelope = mars_control::make_cmd(
            &PrincipalId("principal_operator".to_string()),
            0,
            &mut sim.next_command_id,
            Command::StartMission {
                kind: MissionKind::Exploration,
                initiator: AgentId("agent_0001".to_string()),
            },
        );
        sim.pending_commands.push_back(envelope);

        let pulse = fixed_pulse(&mut sim);
        let events = step(&mut sim, &pulse);

        assert!(sim.pending_commands.is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e.event, Event::MissionStarted { .. })));
        assert_eq!(sim.game_state.meta.pulse, 1);
    }

    #[test]
    fn test_step_samples_metrics_on_schedule() {
        let mut sim = make_test_sim();
        sim.metrics_every = 2;
        for _ in 0..6 {
            let pulse = fixed_pulse(&mut sim);
            step(&mut sim, &pulse);
        }
        assert_eq!(sim.metrics_history.len(), 3);
        assert_eq!(sim.metrics_history.back().unwrap().pulse, 6);
    }

    #[test]
    fn test_metrics_history_is_bounded() {
        let mut sim = make_test_sim();
        let snapshot = mars_core::compute_metrics(&sim.game_state, &sim.content);
        for _ in 0..METRICS_HISTORY_LEN + 5 {
            sim.push_metrics(snapshot.clone());
        }
        assert_eq!(sim.metrics_history.len(), METRICS_HISTORY_LEN);
    }

    #[test]
    fn test_director_runs_inside_step() {
        let mut sim = make_test_sim();
        sim.director = Some(mars_control::ColonyDirector::new());
        let pulse = fixed_pulse(&mut sim);
        let events = step(&mut sim, &pulse);
        assert!(events
            .iter()
            .any(|e| matches!(e.event, Event::MissionStarted { .. })));
    }

    #[tokio::test]
    async fn test_loop_stops_at_max_pulses() {
        let sim = Arc::new(parking_lot::Mutex::new(make_test_sim()));
        let (event_tx, _rx) = tokio::sync::broadcast::channel(64);
        let paused = Arc::new(AtomicBool::new(false));

        run_pulse_loop(sim.clone(), event_tx, paused, 0.0, Some(5)).await;

        let guard = sim.lock();
        assert_eq!(guard.game_state.meta.pulse, 5);
        assert!((guard.game_state.meta.time.total_millisols() - 50.0).abs() < 1e-9);
    }
}
