//! Resource and equipment ledger.
//!
//! The ledger is the single owner of stored quantities. Settlements, vehicles
//! and agents own containers by id and query amounts fresh each pulse.
//! Invariants: a container never holds more than its capacity, and transfers
//! move all of the requested amount or nothing.

use std::fmt;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::malfunction::MalfunctionManager;
use crate::{AgentId, ContainerId, EquipmentId, MissionId, ResourceAmount, ResourceId};

/// Amounts at or below this are treated as empty.
pub const LEDGER_EPSILON: f64 = 1e-9;

/// Who holds a reservation on a shared item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Holder {
    Agent(AgentId),
    Mission(MissionId),
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Agent(id) => write!(f, "{id}"),
            Holder::Mission(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown container {0}")]
    UnknownContainer(ContainerId),
    #[error("{container} holds {stored} kg of {resource}, {requested} kg requested")]
    InsufficientResource {
        container: ContainerId,
        resource: ResourceId,
        requested: f64,
        stored: f64,
    },
    #[error("{container} has room for {room} kg, {requested} kg of {resource} offered")]
    InsufficientCapacity {
        container: ContainerId,
        resource: ResourceId,
        requested: f64,
        room: f64,
    },
    #[error("invalid amount {0}")]
    InvalidAmount(f64),
    #[error("unknown equipment {0}")]
    UnknownEquipment(EquipmentId),
    #[error("{item} is already reserved by {holder}")]
    AlreadyReserved { item: String, holder: Holder },
    #[error("{0} is not reserved by the releasing holder")]
    NotReserved(String),
}

/// Claims a reservation slot. Claiming a slot someone already holds is an error.
pub fn claim(slot: &mut Option<Holder>, item: &str, holder: Holder) -> Result<(), LedgerError> {
    if let Some(current) = slot {
        return Err(LedgerError::AlreadyReserved {
            item: item.to_string(),
            holder: current.clone(),
        });
    }
    *slot = Some(holder);
    Ok(())
}

/// Releases a slot held by `holder`, restoring it to unreserved.
pub fn release(slot: &mut Option<Holder>, item: &str, holder: &Holder) -> Result<(), LedgerError> {
    if slot.as_ref() != Some(holder) {
        return Err(LedgerError::NotReserved(item.to_string()));
    }
    *slot = None;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquipmentKind {
    EvaSuit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentRecord {
    pub id: EquipmentId,
    pub kind: EquipmentKind,
    pub container: ContainerId,
    pub reserved_by: Option<Holder>,
    pub malfunctions: MalfunctionManager,
}

impl EquipmentRecord {
    /// Unreserved and not broken.
    pub fn is_available(&self) -> bool {
        self.reserved_by.is_none() && !self.malfunctions.has_malfunction()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerStore {
    pub capacity_kg: f64,
    amounts: AHashMap<ResourceId, f64>,
}

impl ContainerStore {
    fn total(&self) -> f64 {
        self.amounts.values().sum()
    }

    fn room(&self) -> f64 {
        (self.capacity_kg - self.total()).max(0.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    containers: AHashMap<ContainerId, ContainerStore>,
    equipment: AHashMap<EquipmentId, EquipmentRecord>,
}

impl Ledger {
    /// Registers a container, or resets the capacity of an existing one.
    pub fn add_container(&mut self, id: ContainerId, capacity_kg: f64) {
        self.containers.entry(id).or_default().capacity_kg = capacity_kg.max(0.0);
    }

    pub fn has_container(&self, id: &ContainerId) -> bool {
        self.containers.contains_key(id)
    }

    pub fn capacity(&self, id: &ContainerId) -> f64 {
        self.containers.get(id).map_or(0.0, |c| c.capacity_kg)
    }

    pub fn stored(&self, id: &ContainerId, resource: &ResourceId) -> f64 {
        self.containers
            .get(id)
            .and_then(|c| c.amounts.get(resource))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn total_stored(&self, id: &ContainerId) -> f64 {
        self.containers.get(id).map_or(0.0, ContainerStore::total)
    }

    pub fn remaining_capacity(&self, id: &ContainerId) -> f64 {
        self.containers.get(id).map_or(0.0, ContainerStore::room)
    }

    /// Non-empty holdings, sorted by resource id.
    pub fn contents(&self, id: &ContainerId) -> Vec<(ResourceId, f64)> {
        let mut contents: Vec<(ResourceId, f64)> = self
            .containers
            .get(id)
            .map(|c| {
                c.amounts
                    .iter()
                    .filter(|(_, kg)| **kg > LEDGER_EPSILON)
                    .map(|(r, kg)| (r.clone(), *kg))
                    .collect()
            })
            .unwrap_or_default();
        contents.sort_by(|a, b| a.0.cmp(&b.0));
        contents
    }

    pub fn has_all(&self, id: &ContainerId, amounts: &[ResourceAmount]) -> bool {
        amounts
            .iter()
            .all(|a| self.stored(id, &a.resource) + LEDGER_EPSILON >= a.kg)
    }

    /// Stores up to `amount`, clamped to remaining capacity. Returns what was stored.
    pub fn store(&mut self, id: &ContainerId, resource: &ResourceId, amount: f64) -> f64 {
        if !amount.is_finite() || amount <= 0.0 {
            return 0.0;
        }
        let Some(container) = self.containers.get_mut(id) else {
            return 0.0;
        };
        let stored = amount.min(container.room());
        if stored > 0.0 {
            *container.amounts.entry(resource.clone()).or_insert(0.0) += stored;
        }
        stored
    }

    pub fn retrieve(
        &mut self,
        id: &ContainerId,
        resource: &ResourceId,
        amount: f64,
    ) -> Result<(), LedgerError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let container = self
            .containers
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownContainer(id.clone()))?;
        let stored = container.amounts.get(resource).copied().unwrap_or(0.0);
        if amount > stored + LEDGER_EPSILON {
            return Err(LedgerError::InsufficientResource {
                container: id.clone(),
                resource: resource.clone(),
                requested: amount,
                stored,
            });
        }
        let left = stored - amount;
        if left <= LEDGER_EPSILON {
            container.amounts.remove(resource);
        } else {
            container.amounts.insert(resource.clone(), left);
        }
        Ok(())
    }

    /// Retrieves every amount in the list, or nothing if any is short.
    pub fn retrieve_all(
        &mut self,
        id: &ContainerId,
        amounts: &[ResourceAmount],
    ) -> Result<(), LedgerError> {
        for amount in amounts {
            let stored = self.stored(id, &amount.resource);
            if amount.kg > stored + LEDGER_EPSILON {
                return Err(LedgerError::InsufficientResource {
                    container: id.clone(),
                    resource: amount.resource.clone(),
                    requested: amount.kg,
                    stored,
                });
            }
        }
        for amount in amounts {
            self.retrieve(id, &amount.resource, amount.kg)?;
        }
        Ok(())
    }

    /// Moves exactly `amount` from one container to another, or nothing.
    pub fn transfer(
        &mut self,
        from: &ContainerId,
        to: &ContainerId,
        resource: &ResourceId,
        amount: f64,
    ) -> Result<(), LedgerError> {
        if !self.has_container(to) {
            return Err(LedgerError::UnknownContainer(to.clone()));
        }
        self.retrieve(from, resource, amount)?;
        let stored = self.store(to, resource, amount);
        if stored + LEDGER_EPSILON < amount {
            // Roll back: the source had this amount a moment ago, so it fits.
            self.retrieve(to, resource, stored)?;
            if let Some(source) = self.containers.get_mut(from) {
                *source.amounts.entry(resource.clone()).or_insert(0.0) += amount;
            }
            return Err(LedgerError::InsufficientCapacity {
                container: to.clone(),
                resource: resource.clone(),
                requested: amount,
                room: stored,
            });
        }
        Ok(())
    }

    /// Moves as much of `max` as the source holds and the target can take.
    pub fn transfer_available(
        &mut self,
        from: &ContainerId,
        to: &ContainerId,
        resource: &ResourceId,
        max: f64,
    ) -> f64 {
        let amount = max
            .min(self.stored(from, resource))
            .min(self.remaining_capacity(to));
        if amount <= LEDGER_EPSILON {
            return 0.0;
        }
        match self.transfer(from, to, resource, amount) {
            Ok(()) => amount,
            Err(_) => 0.0,
        }
    }

    /// Drops a container and hands back what it held.
    pub fn remove_container(&mut self, id: &ContainerId) -> Vec<(ResourceId, f64)> {
        let contents = self.contents(id);
        self.containers.remove(id);
        contents
    }

    // -- equipment ---------------------------------------------------------

    pub fn add_equipment(&mut self, id: EquipmentId, kind: EquipmentKind, container: ContainerId) {
        self.equipment.insert(
            id.clone(),
            EquipmentRecord {
                id,
                kind,
                container,
                reserved_by: None,
                malfunctions: MalfunctionManager::new(0.0, Vec::new()),
            },
        );
    }

    pub fn equipment(&self, id: &EquipmentId) -> Option<&EquipmentRecord> {
        self.equipment.get(id)
    }

    pub fn equipment_mut(&mut self, id: &EquipmentId) -> Option<&mut EquipmentRecord> {
        self.equipment.get_mut(id)
    }

    /// Lowest-id available item of `kind` held in `container`.
    pub fn find_available_equipment(
        &self,
        kind: EquipmentKind,
        container: &ContainerId,
    ) -> Option<EquipmentId> {
        self.equipment
            .values()
            .filter(|e| e.kind == kind && &e.container == container && e.is_available())
            .map(|e| e.id.clone())
            .min()
    }

    /// Every item of `kind` held in `container`, sorted by id.
    pub fn equipment_in(&self, kind: EquipmentKind, container: &ContainerId) -> Vec<EquipmentId> {
        let mut ids: Vec<EquipmentId> = self
            .equipment
            .values()
            .filter(|e| e.kind == kind && &e.container == container)
            .map(|e| e.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn reserve_equipment(&mut self, id: &EquipmentId, holder: Holder) -> Result<(), LedgerError> {
        let record = self
            .equipment
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownEquipment(id.clone()))?;
        claim(&mut record.reserved_by, &id.0, holder)
    }

    pub fn release_equipment(&mut self, id: &EquipmentId, holder: &Holder) -> Result<(), LedgerError> {
        let record = self
            .equipment
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownEquipment(id.clone()))?;
        release(&mut record.reserved_by, &id.0, holder)
    }

    pub fn move_equipment(&mut self, id: &EquipmentId, to: ContainerId) -> Result<(), LedgerError> {
        let record = self
            .equipment
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownEquipment(id.clone()))?;
        record.container = to;
        Ok(())
    }
}
