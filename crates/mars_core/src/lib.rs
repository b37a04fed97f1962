//! `mars_core`: deterministic simulation of a Mars colony, one pulse at a time.
//!
//! No IO, no network. All randomness comes from the `Rng` passed to `tick`.

pub mod agent;
pub mod clock;
mod commands;
pub mod coordinates;
mod engine;
mod id;
pub mod ledger;
pub mod malfunction;
mod meta;
pub mod metrics;
pub mod mission;
mod scheduler;
mod selection;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;
mod types;

pub use agent::{AgentKind, AgentState, Job, PhysicalCondition, Placement, Role, SkillKind};
pub use clock::{MarsTime, MasterClock, Pulse};
pub use coordinates::Coordinates;
pub use engine::tick;
pub use id::{generate_uuid, sequential_id};
pub use ledger::{Holder, Ledger, LedgerError};
pub use malfunction::{MalfunctionManager, Malfunctionable};
pub use metrics::{
    append_metrics_row, compute_metrics, write_metrics_header, MetricsFileWriter,
    MetricsSnapshot,
};
pub use mission::{
    determine_new_phase, MissionKind, MissionPhase, MissionState, MissionStatus, NavRoute,
    PhasePredicates,
};
pub use selection::weighted_pick;
pub use task::{Task, TaskError, TaskKind, TaskKindTag, TaskPhase};
pub use types::*;

/// Build an [`EventEnvelope`] with a monotonically increasing event id.
pub(crate) fn emit(counters: &mut Counters, pulse: u64, event: Event) -> EventEnvelope {
    let id = EventId(format!("evt_{:06}", counters.next_event_id));
    counters.next_event_id += 1;
    EventEnvelope { id, pulse, event }
}

/// Events raised during one pulse. Debug-only events are dropped unless the
/// pulse runs at `EventLevel::Debug`.
pub(crate) struct EventSink {
    pulse: u64,
    level: EventLevel,
    events: Vec<EventEnvelope>,
}

impl EventSink {
    pub(crate) fn new(pulse: u64, level: EventLevel) -> Self {
        Self {
            pulse,
            level,
            events: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, counters: &mut Counters, event: Event) {
        self.events.push(emit(counters, self.pulse, event));
    }

    pub(crate) fn push_debug(&mut self, counters: &mut Counters, event: Event) {
        if self.level == EventLevel::Debug {
            self.push(counters, event);
        }
    }

    pub(crate) fn into_events(self) -> Vec<EventEnvelope> {
        self.events
    }
}

#[cfg(test)]
mod tests;
