//! Wear, maintenance timing and malfunctions for buildings, vehicles and EVA suits.

use std::fmt;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::ledger::Holder;
use crate::{
    BuildingId, Constants, EquipmentId, Event, EventSink, GameContent, GameState,
    MalfunctionDef, ResourceAmount, VehicleId,
};

pub const WEAR_PRISTINE: f64 = 100.0;

/// Anything that wears out and can be maintained or repaired.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Malfunctionable {
    Building(BuildingId),
    Vehicle(VehicleId),
    /// Suits only break in accidents and never wear with time.
    Suit(EquipmentId),
}

impl fmt::Display for Malfunctionable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Malfunctionable::Building(id) => write!(f, "{id}"),
            Malfunctionable::Vehicle(id) => write!(f, "{id}"),
            Malfunctionable::Suit(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Malfunction {
    pub id: u64,
    pub def_id: String,
    pub severity: f64,
    pub repair_work_required: f64,
    pub repair_work_done: f64,
    pub repair_parts: Vec<ResourceAmount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MalfunctionManager {
    /// 0-100, 100 is pristine. Only decreases until maintenance resets it.
    pub wear_condition: f64,
    pub time_since_maintenance: f64,
    pub lifetime_millisols: f64,
    pub maintenance_parts: Vec<ResourceAmount>,
    pub active: Vec<Malfunction>,
    pub maintenance_count: u32,
}

impl MalfunctionManager {
    pub fn new(lifetime_millisols: f64, maintenance_parts: Vec<ResourceAmount>) -> Self {
        Self {
            wear_condition: WEAR_PRISTINE,
            time_since_maintenance: 0.0,
            lifetime_millisols,
            maintenance_parts,
            active: Vec::new(),
            maintenance_count: 0,
        }
    }

    pub fn add_time(&mut self, millisols: f64) {
        if millisols <= 0.0 {
            return;
        }
        self.time_since_maintenance += millisols;
        if self.lifetime_millisols > 0.0 {
            let wear = WEAR_PRISTINE * millisols / self.lifetime_millisols;
            self.wear_condition = (self.wear_condition - wear).max(0.0);
        }
    }

    /// Fraction of the maintenance window that has elapsed.
    pub fn maintenance_need(&self, window_millisols: f64) -> f64 {
        if window_millisols <= 0.0 {
            return 0.0;
        }
        self.time_since_maintenance / window_millisols
    }

    pub fn complete_maintenance(&mut self) {
        self.time_since_maintenance = 0.0;
        self.wear_condition = WEAR_PRISTINE;
        self.maintenance_count += 1;
    }

    pub fn degrade(&mut self, damage: f64) {
        self.wear_condition = (self.wear_condition - damage.max(0.0)).max(0.0);
    }

    pub fn has_malfunction(&self) -> bool {
        !self.active.is_empty()
    }

    /// Highest severity first; ties go to the oldest.
    pub fn worst_malfunction(&self) -> Option<&Malfunction> {
        self.active.iter().max_by(|a, b| {
            a.severity
                .total_cmp(&b.severity)
                .then_with(|| b.id.cmp(&a.id))
        })
    }

    pub fn malfunction_mut(&mut self, id: u64) -> Option<&mut Malfunction> {
        self.active.iter_mut().find(|m| m.id == id)
    }

    pub fn add_malfunction(&mut self, def: &MalfunctionDef, id: u64) {
        self.active.push(Malfunction {
            id,
            def_id: def.id.clone(),
            severity: def.severity,
            repair_work_required: def.repair_work_millisols,
            repair_work_done: 0.0,
            repair_parts: def.repair_parts.clone(),
        });
    }

    pub fn clear_malfunction(&mut self, id: u64) -> Option<Malfunction> {
        let index = self.active.iter().position(|m| m.id == id)?;
        Some(self.active.remove(index))
    }

    /// Output multiplier from wear bands, halved again while anything is broken.
    pub fn efficiency(&self, constants: &Constants) -> f64 {
        let band = if self.wear_condition <= constants.wear_band_critical_threshold {
            constants.wear_band_critical_efficiency
        } else if self.wear_condition <= constants.wear_band_degraded_threshold {
            constants.wear_band_degraded_efficiency
        } else {
            1.0
        };
        if self.has_malfunction() {
            band * 0.5
        } else {
            band
        }
    }

    /// Chance of a spontaneous malfunction over `millisols`. Grows as wear does.
    pub fn malfunction_chance(&self, millisols: f64, base_rate: f64) -> f64 {
        let worn = (WEAR_PRISTINE - self.wear_condition) / WEAR_PRISTINE;
        (base_rate * millisols * (1.0 + 3.0 * worn)).clamp(0.0, 1.0)
    }
}

pub fn manager<'a>(state: &'a GameState, target: &Malfunctionable) -> Option<&'a MalfunctionManager> {
    match target {
        Malfunctionable::Building(id) => state.buildings.get(id).map(|b| &b.malfunctions),
        Malfunctionable::Vehicle(id) => state.vehicles.get(id).map(|v| &v.malfunctions),
        Malfunctionable::Suit(id) => state.ledger.equipment(id).map(|e| &e.malfunctions),
    }
}

pub fn manager_mut<'a>(
    state: &'a mut GameState,
    target: &Malfunctionable,
) -> Option<&'a mut MalfunctionManager> {
    match target {
        Malfunctionable::Building(id) => state.buildings.get_mut(id).map(|b| &mut b.malfunctions),
        Malfunctionable::Vehicle(id) => state.vehicles.get_mut(id).map(|v| &mut v.malfunctions),
        Malfunctionable::Suit(id) => state
            .ledger
            .equipment_mut(id)
            .map(|e| &mut e.malfunctions),
    }
}

/// The maintenance/repair reservation slot of the target. A suit under repair
/// holds its ordinary reservation, so nobody can wear it meanwhile.
pub fn maintenance_slot<'a>(
    state: &'a GameState,
    target: &Malfunctionable,
) -> Option<&'a Option<Holder>> {
    match target {
        Malfunctionable::Building(id) => state.buildings.get(id).map(|b| &b.maintenance),
        Malfunctionable::Vehicle(id) => state.vehicles.get(id).map(|v| &v.maintenance),
        Malfunctionable::Suit(id) => state.ledger.equipment(id).map(|e| &e.reserved_by),
    }
}

pub fn maintenance_slot_mut<'a>(
    state: &'a mut GameState,
    target: &Malfunctionable,
) -> Option<&'a mut Option<Holder>> {
    match target {
        Malfunctionable::Building(id) => state.buildings.get_mut(id).map(|b| &mut b.maintenance),
        Malfunctionable::Vehicle(id) => state.vehicles.get_mut(id).map(|v| &mut v.maintenance),
        Malfunctionable::Suit(id) => state
            .ledger
            .equipment_mut(id)
            .map(|e| &mut e.reserved_by),
    }
}

/// Injects a random catalog malfunction into `target` after `damage` wear.
pub(crate) fn break_down(
    state: &mut GameState,
    content: &GameContent,
    target: &Malfunctionable,
    damage: f64,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) {
    if content.malfunctions.is_empty() {
        return;
    }
    let def = &content.malfunctions[rng.gen_range(0..content.malfunctions.len())];
    state.counters.next_malfunction_id += 1;
    let id = state.counters.next_malfunction_id;
    let Some(manager) = manager_mut(state, target) else {
        return;
    };
    manager.degrade(damage);
    manager.add_malfunction(def, id);
    events.push(
        &mut state.counters,
        Event::MalfunctionOccurred {
            entity: target.clone(),
            malfunction: def.id.clone(),
            severity: def.severity,
        },
    );
}

/// Ages every building and every vehicle parked at a settlement, then rolls for
/// spontaneous malfunctions. Driving vehicles age inside the driving phase.
pub(crate) fn accrue_wear(
    state: &mut GameState,
    content: &GameContent,
    millisols: f64,
    rng: &mut dyn RngCore,
    events: &mut EventSink,
) {
    let mut targets: Vec<Malfunctionable> = state
        .buildings
        .keys()
        .cloned()
        .map(Malfunctionable::Building)
        .chain(
            state
                .vehicles
                .values()
                .filter(|v| v.parked_at.is_some())
                .map(|v| Malfunctionable::Vehicle(v.id.clone())),
        )
        .collect();
    targets.sort();

    let base_rate = content.constants.malfunction_base_rate;
    for target in targets {
        let Some(manager) = manager_mut(state, &target) else {
            continue;
        };
        manager.add_time(millisols);
        let chance = manager.malfunction_chance(millisols, base_rate);
        if rng.gen::<f64>() < chance {
            break_down(state, content, &target, 0.0, rng, events);
        }
    }
}
