//! Single-agent task state machines.
//!
//! A task is a tagged [`TaskKind`] plus the phase it is in. Behaviour lives in
//! [`PHASE_TABLE`], keyed by `(TaskKindTag, TaskPhase)`; a phase outside a
//! kind's rows does not exist for that kind. A handler receives a time budget
//! in millisols and returns what it did not use.

mod eva;
mod vehicle;
mod work;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentState, Placement, SkillKind};
use crate::ledger::{Holder, LedgerError};
use crate::malfunction::{self, Malfunctionable};
use crate::{
    AgentId, BuildingId, Constants, Coordinates, EquipmentId, Event, EventSink, GameContent,
    GameState, MissionId, ProcessId, ResourceId,
};

const WORK_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("phase {phase:?} is not registered for {kind:?}")]
    UnregisteredPhase { kind: TaskKindTag, phase: TaskPhase },
    #[error("{0:?} has no registered phases")]
    NoPhases(TaskKindTag),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskKind {
    Relax,
    Sleep,
    EatMeal,
    Maintenance {
        target: Malfunctionable,
    },
    RepairMalfunction {
        target: Malfunctionable,
        malfunction: u64,
    },
    Manufacture {
        building: BuildingId,
        process: ProcessId,
    },
    CollectResources {
        resource: ResourceId,
        site: Coordinates,
    },
    LoadVehicle {
        mission: MissionId,
    },
    UnloadVehicle {
        mission: MissionId,
    },
    BoardVehicle {
        mission: MissionId,
    },
    DriveVehicle {
        mission: MissionId,
    },
    ExploreSite {
        mission: MissionId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKindTag {
    Relax,
    Sleep,
    EatMeal,
    Maintenance,
    RepairMalfunction,
    Manufacture,
    CollectResources,
    LoadVehicle,
    UnloadVehicle,
    BoardVehicle,
    DriveVehicle,
    ExploreSite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskPhase {
    Relaxing,
    Sleeping,
    Eating,
    Maintaining,
    Repairing,
    Manufacturing,
    ExitAirlock,
    SiteWork,
    WalkBack,
    EnterAirlock,
    Loading,
    Unloading,
    Boarding,
    Driving,
}

/// What a kind of task demands of the agent doing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    pub needs_eva: bool,
    pub needs_vehicle: bool,
    pub needs_biology: bool,
}

impl TaskKind {
    pub fn tag(&self) -> TaskKindTag {
        match self {
            TaskKind::Relax => TaskKindTag::Relax,
            TaskKind::Sleep => TaskKindTag::Sleep,
            TaskKind::EatMeal => TaskKindTag::EatMeal,
            TaskKind::Maintenance { .. } => TaskKindTag::Maintenance,
            TaskKind::RepairMalfunction { .. } => TaskKindTag::RepairMalfunction,
            TaskKind::Manufacture { .. } => TaskKindTag::Manufacture,
            TaskKind::CollectResources { .. } => TaskKindTag::CollectResources,
            TaskKind::LoadVehicle { .. } => TaskKindTag::LoadVehicle,
            TaskKind::UnloadVehicle { .. } => TaskKindTag::UnloadVehicle,
            TaskKind::BoardVehicle { .. } => TaskKindTag::BoardVehicle,
            TaskKind::DriveVehicle { .. } => TaskKindTag::DriveVehicle,
            TaskKind::ExploreSite { .. } => TaskKindTag::ExploreSite,
        }
    }

    pub fn mission(&self) -> Option<&MissionId> {
        match self {
            TaskKind::LoadVehicle { mission }
            | TaskKind::UnloadVehicle { mission }
            | TaskKind::BoardVehicle { mission }
            | TaskKind::DriveVehicle { mission }
            | TaskKind::ExploreSite { mission } => Some(mission),
            _ => None,
        }
    }

    pub fn target_label(&self) -> Option<String> {
        match self {
            TaskKind::Maintenance { target } | TaskKind::RepairMalfunction { target, .. } => {
                Some(target.to_string())
            }
            TaskKind::Manufacture { process, .. } => Some(process.0.clone()),
            TaskKind::CollectResources { resource, .. } => Some(resource.0.clone()),
            _ => self.mission().map(|m| m.0.clone()),
        }
    }
}

impl TaskKindTag {
    pub const fn label(self) -> &'static str {
        match self {
            TaskKindTag::Relax => "Relax",
            TaskKindTag::Sleep => "Sleep",
            TaskKindTag::EatMeal => "EatMeal",
            TaskKindTag::Maintenance => "Maintenance",
            TaskKindTag::RepairMalfunction => "RepairMalfunction",
            TaskKindTag::Manufacture => "Manufacture",
            TaskKindTag::CollectResources => "CollectResources",
            TaskKindTag::LoadVehicle => "LoadVehicle",
            TaskKindTag::UnloadVehicle => "UnloadVehicle",
            TaskKindTag::BoardVehicle => "BoardVehicle",
            TaskKindTag::DriveVehicle => "DriveVehicle",
            TaskKindTag::ExploreSite => "ExploreSite",
        }
    }

    pub const fn capabilities(self) -> Capabilities {
        let (needs_eva, needs_vehicle, needs_biology) = match self {
            TaskKindTag::Sleep | TaskKindTag::EatMeal => (false, false, true),
            TaskKindTag::CollectResources => (true, false, true),
            TaskKindTag::ExploreSite => (true, true, true),
            TaskKindTag::LoadVehicle
            | TaskKindTag::UnloadVehicle
            | TaskKindTag::BoardVehicle
            | TaskKindTag::DriveVehicle => (false, true, false),
            TaskKindTag::Relax
            | TaskKindTag::Maintenance
            | TaskKindTag::RepairMalfunction
            | TaskKindTag::Manufacture => (false, false, false),
        };
        Capabilities {
            needs_eva,
            needs_vehicle,
            needs_biology,
        }
    }

    /// Skill that scales work rate and accident chance, if any.
    pub const fn skill(self) -> Option<SkillKind> {
        match self {
            TaskKindTag::Maintenance | TaskKindTag::RepairMalfunction => Some(SkillKind::Mechanics),
            TaskKindTag::Manufacture => Some(SkillKind::Materials),
            TaskKindTag::CollectResources => Some(SkillKind::EvaOperations),
            TaskKindTag::ExploreSite => Some(SkillKind::Areology),
            TaskKindTag::DriveVehicle => Some(SkillKind::Driving),
            TaskKindTag::Relax
            | TaskKindTag::Sleep
            | TaskKindTag::EatMeal
            | TaskKindTag::LoadVehicle
            | TaskKindTag::UnloadVehicle
            | TaskKindTag::BoardVehicle => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase dispatch
// ---------------------------------------------------------------------------

pub(crate) type PhaseHandler = fn(&mut PhaseCtx<'_>, f64) -> Result<f64, TaskError>;

struct PhaseEntry {
    kind: TaskKindTag,
    phase: TaskPhase,
    handler: PhaseHandler,
}

/// Every (kind, phase) pair that exists. A kind's first row is its start phase.
const PHASE_TABLE: &[PhaseEntry] = &[
    PhaseEntry {
        kind: TaskKindTag::Relax,
        phase: TaskPhase::Relaxing,
        handler: work::relaxing,
    },
    PhaseEntry {
        kind: TaskKindTag::Sleep,
        phase: TaskPhase::Sleeping,
        handler: work::sleeping,
    },
    PhaseEntry {
        kind: TaskKindTag::EatMeal,
        phase: TaskPhase::Eating,
        handler: work::eating,
    },
    PhaseEntry {
        kind: TaskKindTag::Maintenance,
        phase: TaskPhase::Maintaining,
        handler: work::maintaining,
    },
    PhaseEntry {
        kind: TaskKindTag::RepairMalfunction,
        phase: TaskPhase::Repairing,
        handler: work::repairing,
    },
    PhaseEntry {
        kind: TaskKindTag::Manufacture,
        phase: TaskPhase::Manufacturing,
        handler: work::manufacturing,
    },
    PhaseEntry {
        kind: TaskKindTag::CollectResources,
        phase: TaskPhase::ExitAirlock,
        handler: eva::exit_airlock,
    },
    PhaseEntry {
        kind: TaskKindTag::CollectResources,
        phase: TaskPhase::SiteWork,
        handler: eva::site_work,
    },
    PhaseEntry {
        kind: TaskKindTag::CollectResources,
        phase: TaskPhase::WalkBack,
        handler: eva::walk_back,
    },
    PhaseEntry {
        kind: TaskKindTag::CollectResources,
        phase: TaskPhase::EnterAirlock,
        handler: eva::enter_airlock,
    },
    PhaseEntry {
        kind: TaskKindTag::LoadVehicle,
        phase: TaskPhase::Loading,
        handler: vehicle::loading,
    },
    PhaseEntry {
        kind: TaskKindTag::UnloadVehicle,
        phase: TaskPhase::Unloading,
        handler: vehicle::unloading,
    },
    PhaseEntry {
        kind: TaskKindTag::BoardVehicle,
        phase: TaskPhase::Boarding,
        handler: vehicle::boarding,
    },
    PhaseEntry {
        kind: TaskKindTag::DriveVehicle,
        phase: TaskPhase::Driving,
        handler: vehicle::driving,
    },
    PhaseEntry {
        kind: TaskKindTag::ExploreSite,
        phase: TaskPhase::ExitAirlock,
        handler: eva::exit_airlock,
    },
    PhaseEntry {
        kind: TaskKindTag::ExploreSite,
        phase: TaskPhase::SiteWork,
        handler: eva::site_work,
    },
    PhaseEntry {
        kind: TaskKindTag::ExploreSite,
        phase: TaskPhase::WalkBack,
        handler: eva::walk_back,
    },
    PhaseEntry {
        kind: TaskKindTag::ExploreSite,
        phase: TaskPhase::EnterAirlock,
        handler: eva::enter_airlock,
    },
];

/// Registered phases of a kind, start phase first.
pub fn phases_of(kind: TaskKindTag) -> impl Iterator<Item = TaskPhase> {
    PHASE_TABLE
        .iter()
        .filter(move |entry| entry.kind == kind)
        .map(|entry| entry.phase)
}

pub fn is_registered(kind: TaskKindTag, phase: TaskPhase) -> bool {
    handler_for(kind, phase).is_some()
}

fn handler_for(kind: TaskKindTag, phase: TaskPhase) -> Option<PhaseHandler> {
    PHASE_TABLE
        .iter()
        .find(|entry| entry.kind == kind && entry.phase == phase)
        .map(|entry| entry.handler)
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Something a task holds until it ends. Released in reverse order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reservation {
    Equipment(EquipmentId),
    Maintenance(Malfunctionable),
    Workshop {
        building: BuildingId,
        process: ProcessId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Task {
    pub kind: TaskKind,
    phase: Option<TaskPhase>,
    pub work_required: f64,
    pub work_done: f64,
    /// Time spent in the current phase.
    pub phase_time: f64,
    pub time_spent: f64,
    pub experience: f64,
    /// Inputs or parts have been drawn from the ledger.
    pub started: bool,
    pub completed: bool,
    pub done: bool,
    ended: bool,
    pub sub_task: Option<Box<Task>>,
    reservations: Vec<Reservation>,
    /// Where an EVA began, and where the agent goes back to.
    pub eva_origin: Option<Placement>,
}

impl Task {
    fn new(kind: TaskKind, work_required: f64) -> Self {
        Self {
            kind,
            phase: None,
            work_required,
            work_done: 0.0,
            phase_time: 0.0,
            time_spent: 0.0,
            experience: 0.0,
            started: false,
            completed: false,
            done: false,
            ended: false,
            sub_task: None,
            reservations: Vec::new(),
            eva_origin: None,
        }
    }

    /// A task whose eligibility check failed: done before it starts.
    fn failed(kind: TaskKind) -> Self {
        Self {
            done: true,
            ..Self::new(kind, 0.0)
        }
    }

    pub fn tag(&self) -> TaskKindTag {
        self.kind.tag()
    }

    pub fn label(&self) -> &'static str {
        self.tag().label()
    }

    pub fn phase(&self) -> Option<TaskPhase> {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn work_complete(&self) -> bool {
        self.work_done + WORK_EPSILON >= self.work_required
    }

    /// Moves to `phase`. Phases outside the kind's table rows are an error.
    pub fn set_phase(&mut self, phase: TaskPhase) -> Result<(), TaskError> {
        let kind = self.tag();
        if !is_registered(kind, phase) {
            return Err(TaskError::UnregisteredPhase { kind, phase });
        }
        self.phase = Some(phase);
        self.phase_time = 0.0;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Phase context
// ---------------------------------------------------------------------------

/// Everything a phase handler may touch.
pub(crate) struct PhaseCtx<'a> {
    pub state: &'a mut GameState,
    pub content: &'a GameContent,
    pub agent_id: &'a AgentId,
    pub task: &'a mut Task,
    pub rng: &'a mut dyn RngCore,
    pub events: &'a mut EventSink,
}

impl PhaseCtx<'_> {
    fn constants(&self) -> &Constants {
        &self.content.constants
    }

    fn agent(&self) -> Option<&AgentState> {
        self.state.agents.get(self.agent_id)
    }

    fn agent_mut(&mut self) -> Option<&mut AgentState> {
        self.state.agents.get_mut(self.agent_id)
    }

    fn emit(&mut self, event: Event) {
        self.events.push(&mut self.state.counters, event);
    }

    fn efficiency(&self) -> f64 {
        let Some(agent) = self.agent() else {
            return 0.0;
        };
        match self.task.tag().skill() {
            Some(skill) => agent.efficiency(skill, self.constants()),
            None => agent.performance(self.constants()),
        }
    }

    /// Spends up to `available` on the remaining work at the agent's
    /// efficiency times `multiplier`. Returns the time used.
    fn work(&mut self, available: f64, multiplier: f64) -> f64 {
        let efficiency = self.efficiency() * multiplier;
        if efficiency <= 0.0 {
            return 0.0;
        }
        let remaining = (self.task.work_required - self.task.work_done).max(0.0);
        let used = available.min(remaining / efficiency);
        self.task.work_done += used * efficiency;
        self.task.phase_time += used;
        self.add_experience(used);
        used
    }

    /// Spends up to `available` toward a phase lasting `duration`.
    fn spend(&mut self, available: f64, duration: f64) -> f64 {
        let used = available.min((duration - self.task.phase_time).max(0.0));
        self.task.phase_time += used;
        used
    }

    fn phase_elapsed(&self, duration: f64) -> bool {
        self.task.phase_time + WORK_EPSILON >= duration
    }

    fn add_experience(&mut self, millisols: f64) {
        let Some(skill) = self.task.tag().skill() else {
            return;
        };
        let per_level = self.constants().experience_per_level;
        self.task.experience += millisols;
        if let Some(agent) = self.agent_mut() {
            agent.skills.add_experience(skill, millisols, per_level);
        }
    }

    fn set_phase(&mut self, phase: TaskPhase) -> Result<(), TaskError> {
        let from = self.task.phase;
        self.task.set_phase(phase)?;
        let event = Event::TaskPhaseChanged {
            agent_id: self.agent_id.clone(),
            task_kind: self.task.label().to_string(),
            from,
            to: phase,
        };
        self.events.push_debug(&mut self.state.counters, event);
        Ok(())
    }

    /// The EVA suit this task has reserved, as a malfunction target.
    fn worn_suit(&self) -> Option<Malfunctionable> {
        self.task.reservations.iter().find_map(|r| match r {
            Reservation::Equipment(id) => Some(Malfunctionable::Suit(id.clone())),
            _ => None,
        })
    }

    fn finish(&mut self, completed: bool) {
        self.task.completed = completed;
        self.task.done = true;
    }

    /// Rolls for an accident over `millisols` of work.
    ///
    /// `chance = accident_base_rate * millisols / (1 + skill)`. On an accident
    /// the worked-on entity takes damage and a malfunction. EVA work passes the
    /// agent's suit as the entity.
    fn check_for_accident(&mut self, millisols: f64, target: Option<&Malfunctionable>) -> bool {
        let Some(skill) = self.task.tag().skill() else {
            return false;
        };
        if millisols <= 0.0 {
            return false;
        }
        let level = self.agent().map_or(0, |a| a.skills.level(skill));
        let chance = self.constants().accident_base_rate * millisols / (1.0 + f64::from(level));
        if self.rng.gen::<f64>() >= chance {
            return false;
        }
        let entity = match target {
            Some(target) => {
                let damage = self.constants().accident_wear_damage;
                malfunction::break_down(
                    self.state,
                    self.content,
                    target,
                    damage,
                    &mut *self.rng,
                    self.events,
                );
                target.to_string()
            }
            None => self.agent_id.to_string(),
        };
        let event = Event::Accident {
            agent_id: self.agent_id.clone(),
            task_kind: self.task.label().to_string(),
            entity,
        };
        self.emit(event);
        true
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Builds a task of `kind` for the agent.
///
/// Eligibility is checked before anything is reserved; an ineligible agent
/// gets a task that is already done and has touched nothing.
pub(crate) fn create_task(
    state: &mut GameState,
    content: &GameContent,
    agent_id: &AgentId,
    kind: TaskKind,
) -> Task {
    let prepared = plan_for(state, content, agent_id, &kind);
    let Some(plan) = prepared else {
        return Task::failed(kind);
    };

    let mut task = Task::new(kind, plan.work_required);
    task.eva_origin = plan.eva_origin;
    for reservation in plan.reservations {
        if let Err(err) = acquire(state, agent_id, &reservation) {
            tracing::debug!(agent = %agent_id, %err, "reservation failed, task not started");
            release_all(state, agent_id, &mut task);
            task.done = true;
            return task;
        }
        task.reservations.push(reservation);
    }
    task
}

/// Whether `kind` could start for the agent right now.
pub(crate) fn is_eligible(
    state: &GameState,
    content: &GameContent,
    agent_id: &AgentId,
    kind: &TaskKind,
) -> bool {
    plan_for(state, content, agent_id, kind).is_some()
}

fn plan_for(
    state: &GameState,
    content: &GameContent,
    agent_id: &AgentId,
    kind: &TaskKind,
) -> Option<TaskPlan> {
    match kind.tag() {
        TaskKindTag::Relax | TaskKindTag::Sleep | TaskKindTag::EatMeal => {
            work::prepare_personal(state, content, agent_id, kind)
        }
        TaskKindTag::Maintenance | TaskKindTag::RepairMalfunction | TaskKindTag::Manufacture => {
            work::prepare_work(state, content, agent_id, kind)
        }
        TaskKindTag::CollectResources | TaskKindTag::ExploreSite => {
            eva::prepare(state, content, agent_id, kind)
        }
        TaskKindTag::LoadVehicle
        | TaskKindTag::UnloadVehicle
        | TaskKindTag::BoardVehicle
        | TaskKindTag::DriveVehicle => vehicle::prepare(state, content, agent_id, kind),
    }
}

/// Result of a kind's eligibility check.
pub(crate) struct TaskPlan {
    pub work_required: f64,
    pub reservations: Vec<Reservation>,
    pub eva_origin: Option<Placement>,
}

impl TaskPlan {
    fn new(work_required: f64) -> Self {
        Self {
            work_required,
            reservations: Vec::new(),
            eva_origin: None,
        }
    }
}

/// Runs the task for up to `available` millisols and returns the unused time,
/// always within `[0, available]`.
pub(crate) fn perform_task(
    state: &mut GameState,
    content: &GameContent,
    agent_id: &AgentId,
    task: &mut Task,
    available: f64,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) -> Result<f64, TaskError> {
    if available <= 0.0 || task.done {
        return Ok(available.max(0.0));
    }
    if !should_continue(state, agent_id, task) {
        task.done = true;
        return Ok(available);
    }

    let mut remaining = available;
    if task.sub_task.is_none() {
        maybe_interrupt_for_meal(state, content, agent_id, task);
    }
    if let Some(sub) = task.sub_task.as_deref_mut() {
        remaining = perform_task(state, content, agent_id, sub, remaining, rng, events)?;
    }
    if task.sub_task.as_ref().is_some_and(|sub| sub.done) {
        if let Some(mut sub) = task.sub_task.take() {
            end_task(state, agent_id, &mut sub, events);
        }
    }
    if task.sub_task.is_some() || remaining <= 0.0 {
        return Ok(remaining.clamp(0.0, available));
    }

    let kind = task.tag();
    let phase = match task.phase {
        Some(phase) => phase,
        None => {
            let first = phases_of(kind).next().ok_or(TaskError::NoPhases(kind))?;
            task.set_phase(first)?;
            first
        }
    };
    let handler = handler_for(kind, phase).ok_or(TaskError::UnregisteredPhase { kind, phase })?;
    let mut ctx = PhaseCtx {
        state,
        content,
        agent_id,
        task,
        rng,
        events,
    };
    let left = handler(&mut ctx, remaining)?.clamp(0.0, remaining);
    task.time_spent += remaining - left;
    Ok(left)
}

/// Termination predicates checked at the top of every `perform_task`.
fn should_continue(state: &GameState, agent_id: &AgentId, task: &Task) -> bool {
    let Some(agent) = state.agents.get(agent_id) else {
        return false;
    };
    if !agent.alive {
        return false;
    }
    match task.kind.mission() {
        Some(mission_id) => state.missions.get(mission_id).is_some_and(|m| {
            !m.is_done() && m.members.contains(agent_id) && agent.mind.mission.as_ref() == Some(mission_id)
        }),
        None => true,
    }
}

/// Hungry agents break off indoor work for a meal.
fn maybe_interrupt_for_meal(
    state: &mut GameState,
    content: &GameContent,
    agent_id: &AgentId,
    task: &mut Task,
) {
    let tag = task.tag();
    let caps = tag.capabilities();
    if tag == TaskKindTag::EatMeal || caps.needs_eva || caps.needs_vehicle {
        return;
    }
    let hungry = state
        .agents
        .get(agent_id)
        .and_then(|a| a.condition.as_ref())
        .is_some_and(|c| c.hunger >= content.constants.hunger_interrupt_threshold);
    if !hungry {
        return;
    }
    let meal = create_task(state, content, agent_id, TaskKind::EatMeal);
    if !meal.done {
        task.sub_task = Some(Box::new(meal));
    }
}

/// Terminal transition. Releases reservations in reverse acquisition order.
/// Safe to call more than once; only the first call has effects.
pub(crate) fn end_task(
    state: &mut GameState,
    agent_id: &AgentId,
    task: &mut Task,
    events: &mut EventSink,
) {
    if task.ended {
        return;
    }
    if let Some(mut sub) = task.sub_task.take() {
        end_task(state, agent_id, &mut sub, events);
    }
    if task.tag().capabilities().needs_eva {
        eva::return_inside(state, agent_id, task, events);
    }
    release_all(state, agent_id, task);
    task.done = true;
    task.ended = true;
    events.push(
        &mut state.counters,
        Event::TaskEnded {
            agent_id: agent_id.clone(),
            task_kind: task.label().to_string(),
            completed: task.completed,
        },
    );
}

fn acquire(
    state: &mut GameState,
    agent_id: &AgentId,
    reservation: &Reservation,
) -> Result<(), LedgerError> {
    let holder = Holder::Agent(agent_id.clone());
    match reservation {
        Reservation::Equipment(id) => state.ledger.reserve_equipment(id, holder),
        Reservation::Maintenance(target) => match malfunction::maintenance_slot_mut(state, target) {
            Some(slot) => crate::ledger::claim(slot, &target.to_string(), holder),
            None => Err(LedgerError::NotReserved(target.to_string())),
        },
        Reservation::Workshop { building, process } => {
            let Some(workshop) = state.buildings.get_mut(building) else {
                return Err(LedgerError::NotReserved(building.0.clone()));
            };
            if workshop.active_process.is_some() {
                return Err(LedgerError::AlreadyReserved {
                    item: building.0.clone(),
                    holder,
                });
            }
            workshop.active_process = Some(process.clone());
            Ok(())
        }
    }
}

fn release_all(state: &mut GameState, agent_id: &AgentId, task: &mut Task) {
    let holder = Holder::Agent(agent_id.clone());
    while let Some(reservation) = task.reservations.pop() {
        let result = match &reservation {
            Reservation::Equipment(id) => state.ledger.release_equipment(id, &holder),
            Reservation::Maintenance(target) => {
                match malfunction::maintenance_slot_mut(state, target) {
                    Some(slot) => crate::ledger::release(slot, &target.to_string(), &holder),
                    None => Ok(()),
                }
            }
            Reservation::Workshop { building, .. } => {
                if let Some(workshop) = state.buildings.get_mut(building) {
                    workshop.active_process = None;
                }
                Ok(())
            }
        };
        if let Err(err) = result {
            tracing::debug!(agent = %agent_id, %err, "reservation already released");
        }
    }
}

#[cfg(test)]
pub(crate) fn set_phase_unchecked(task: &mut Task, phase: TaskPhase) {
    task.phase = Some(phase);
}
