//! Colonists and robots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::task::Task;
use crate::{AgentId, Constants, ContainerId, Coordinates, MissionId, SettlementId, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    Person,
    Robot,
}

/// Where an agent physically is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    Settlement(SettlementId),
    Vehicle(VehicleId),
    /// On the surface, in an EVA suit.
    Outside,
}

impl Placement {
    /// The ledger container an agent inside this placement draws from.
    pub fn container(&self) -> Option<ContainerId> {
        match self {
            Placement::Settlement(id) => Some(ContainerId::from(id)),
            Placement::Vehicle(id) => Some(ContainerId::from(id)),
            Placement::Outside => None,
        }
    }

    pub fn settlement(&self) -> Option<&SettlementId> {
        match self {
            Placement::Settlement(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SkillKind {
    Mechanics,
    Materials,
    Areology,
    Driving,
    EvaOperations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Job {
    Unassigned,
    Engineer,
    Technician,
    Areologist,
    Pilot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Commander,
    Engineer,
    Scientist,
    Crew,
}

/// Fatigue, hunger and stress on a 0-1000 scale. Persons only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhysicalCondition {
    pub fatigue: f64,
    pub hunger: f64,
    pub stress: f64,
}

impl PhysicalCondition {
    pub fn accrue(&mut self, millisols: f64, constants: &Constants) {
        self.fatigue = (self.fatigue + constants.fatigue_per_millisol * millisols).min(1000.0);
        self.hunger += constants.hunger_per_millisol * millisols;
        self.stress = (self.stress + constants.stress_per_millisol * millisols).min(1000.0);
    }

    /// 1.0 when rested and fed, falling toward 0.1.
    pub fn performance(&self, constants: &Constants) -> f64 {
        let fatigue_penalty = (self.fatigue - constants.sleep_threshold).max(0.0) / 1000.0;
        let hunger_penalty = (self.hunger - constants.hunger_threshold).max(0.0) / 1000.0;
        let stress_penalty = (self.stress - 500.0).max(0.0) / 2000.0;
        ((1.0 - fatigue_penalty) * (1.0 - hunger_penalty) * (1.0 - stress_penalty)).clamp(0.1, 1.0)
    }

    pub fn is_starving(&self, constants: &Constants) -> bool {
        self.hunger >= constants.starvation_threshold
    }

    pub fn fit_for_eva(&self, constants: &Constants) -> bool {
        self.fatigue < constants.max_eva_fatigue && self.hunger < constants.hunger_interrupt_threshold
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillState {
    pub level: u32,
    pub experience: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillLedger(pub BTreeMap<SkillKind, SkillState>);

impl SkillLedger {
    pub fn with_levels(levels: &[(SkillKind, u32)]) -> Self {
        Self(
            levels
                .iter()
                .map(|(skill, level)| {
                    (
                        *skill,
                        SkillState {
                            level: *level,
                            experience: 0.0,
                        },
                    )
                })
                .collect(),
        )
    }

    pub fn level(&self, skill: SkillKind) -> u32 {
        self.0.get(&skill).map_or(0, |s| s.level)
    }

    /// Adds experience; each level costs `per_level * (level + 1)`.
    pub fn add_experience(&mut self, skill: SkillKind, amount: f64, per_level: f64) {
        if amount <= 0.0 || per_level <= 0.0 {
            return;
        }
        let state = self.0.entry(skill).or_default();
        state.experience += amount;
        loop {
            let cost = per_level * f64::from(state.level + 1);
            if state.experience < cost {
                break;
            }
            state.experience -= cost;
            state.level += 1;
        }
    }
}

/// Work-rate multiplier for a skill level.
pub fn skill_efficiency(level: u32) -> f64 {
    match level {
        0 => 0.5,
        1 => 1.0,
        n => 1.0 + 0.2 * f64::from(n),
    }
}

/// Task-selection state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mind {
    pub task: Option<Task>,
    pub mission: Option<MissionId>,
    /// Consecutive calls in which the current task made no progress.
    pub stalled_calls: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    pub name: String,
    pub kind: AgentKind,
    pub home: SettlementId,
    pub placement: Placement,
    pub location: Coordinates,
    /// `None` for robots.
    pub condition: Option<PhysicalCondition>,
    pub skills: SkillLedger,
    pub job: Job,
    pub role: Role,
    pub mind: Mind,
    pub alive: bool,
}

impl AgentState {
    pub fn is_person(&self) -> bool {
        self.kind == AgentKind::Person
    }

    /// The agent's own carry container (samples, collected resources).
    pub fn container(&self) -> ContainerId {
        ContainerId::from(&self.id)
    }

    pub fn performance(&self, constants: &Constants) -> f64 {
        self.condition
            .as_ref()
            .map_or(1.0, |c| c.performance(constants))
    }

    pub fn efficiency(&self, skill: SkillKind, constants: &Constants) -> f64 {
        skill_efficiency(self.skills.level(skill)) * self.performance(constants)
    }

    pub fn fit_for_eva(&self, constants: &Constants) -> bool {
        self.is_person()
            && self
                .condition
                .as_ref()
                .is_some_and(|c| c.fit_for_eva(constants))
    }

    pub fn settlement(&self) -> Option<&SettlementId> {
        self.placement.settlement()
    }
}
