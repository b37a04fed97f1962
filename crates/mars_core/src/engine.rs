use rand::{Rng, RngCore};

use crate::commands::apply_commands;
use crate::malfunction::accrue_wear;
use crate::mission::update_missions;
use crate::scheduler::run_agents;
use crate::{CommandEnvelope, EventEnvelope, EventLevel, EventSink, GameContent, GameState, Pulse};

/// Advance the simulation by one pulse.
///
/// Order of operations:
/// 1. Apply commands due by this pulse.
/// 2. Run every agent for the pulse's elapsed time.
/// 3. Update missions, one phase step at most.
/// 4. Accrue wear and roll for malfunctions.
/// 5. Record the new time and increment the pulse counter.
///
/// A pulse that covers no time, or that is not later than the state's
/// current time, is ignored and produces no events.
///
/// Returns all events produced this pulse.
pub fn tick(
    state: &mut GameState,
    commands: &[CommandEnvelope],
    content: &GameContent,
    rng: &mut impl Rng,
    event_level: EventLevel,
    pulse: &Pulse,
) -> Vec<EventEnvelope> {
    if !pulse.elapsed.is_finite() || pulse.elapsed <= 0.0 || pulse.time <= state.meta.time {
        tracing::debug!(pulse = pulse.id, elapsed = pulse.elapsed, "pulse skipped");
        return Vec::new();
    }
    let rng: &mut dyn RngCore = rng;
    let mut events = EventSink::new(state.meta.pulse, event_level);

    apply_commands(state, commands, content, rng, &mut events);
    run_agents(state, content, pulse.elapsed, rng, &mut events);
    update_missions(state, content, rng, &mut events);
    accrue_wear(state, content, pulse.elapsed, rng, &mut events);

    state.meta.time = pulse.time;
    state.meta.pulse += 1;
    events.into_events()
}
