//! Where missions go.

use rand::Rng;

use crate::selection::weighted_pick;
use crate::{ContainerId, GameContent, GameState, ResourceAmount, SettlementId, SiteId};

/// Picks a settlement short of an emergency resource that `origin` can spare.
///
/// A target qualifies when it is within `emergency_range_fraction * range`
/// of the origin and stores less than the threshold of some emergency
/// resource, while the origin holds more than its own reserve plus the
/// delivery. Qualifying targets are weighted by total deficit. Returns the
/// target and the cargo to deliver.
pub fn find_settlement_needing_emergency_supplies<R: Rng + ?Sized>(
    state: &GameState,
    content: &GameContent,
    origin: &SettlementId,
    vehicle_range_km: f64,
    rng: &mut R,
) -> Option<(SettlementId, Vec<ResourceAmount>)> {
    let home = state.settlements.get(origin)?;
    let home_stores = ContainerId::from(origin);
    let max_km = vehicle_range_km * content.constants.emergency_range_fraction;

    let mut ids: Vec<&SettlementId> = state.settlements.keys().filter(|id| *id != origin).collect();
    ids.sort();

    let mut candidates: Vec<((SettlementId, Vec<ResourceAmount>), f64)> = Vec::new();
    for id in ids {
        let settlement = &state.settlements[id];
        if home.location.distance_km(&settlement.location) > max_km {
            continue;
        }
        let stores = ContainerId::from(id);
        let mut cargo = Vec::new();
        let mut deficit = 0.0;
        for def in &content.emergency_resources {
            let stored = state.ledger.stored(&stores, &def.resource);
            if stored >= def.threshold_kg {
                continue;
            }
            let spare = state.ledger.stored(&home_stores, &def.resource);
            if spare <= def.reserve_at_origin_kg + def.required_kg {
                continue;
            }
            cargo.push(ResourceAmount {
                resource: def.resource.clone(),
                kg: def.required_kg,
            });
            deficit += def.threshold_kg - stored;
        }
        if !cargo.is_empty() {
            candidates.push(((id.clone(), cargo), deficit));
        }
    }
    weighted_pick(&candidates, f64::MAX, rng).cloned()
}

/// Chooses unexplored, unclaimed sites for one expedition, in visiting order.
///
/// Sites within half the vehicle range are weighted by estimated value times
/// the configured confidence and drawn without replacement. The draw is then
/// ordered nearest-first and trimmed until the round trip fits the range.
pub fn determine_exploration_sites<R: Rng + ?Sized>(
    state: &GameState,
    content: &GameContent,
    origin: &SettlementId,
    vehicle_range_km: f64,
    rng: &mut R,
) -> Vec<SiteId> {
    let c = &content.constants;
    let Some(home) = state.settlements.get(origin).map(|s| s.location) else {
        return Vec::new();
    };
    let mut candidates: Vec<(SiteId, f64)> = state
        .exploration_sites
        .iter()
        .filter(|s| !s.explored && s.claimed_by.is_none())
        .filter(|s| home.distance_km(&s.location) <= vehicle_range_km / 2.0)
        .map(|s| (s.id.clone(), s.estimated_value * c.exploration_site_confidence))
        .collect();
    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    let mut picked = Vec::new();
    while picked.len() < c.exploration_sites_per_mission as usize {
        let Some(id) = weighted_pick(&candidates, f64::MAX, rng).cloned() else {
            break;
        };
        candidates.retain(|(candidate, _)| candidate != &id);
        picked.push(id);
    }

    let location = |id: &SiteId| {
        state
            .exploration_sites
            .iter()
            .find(|s| &s.id == id)
            .map_or(home, |s| s.location)
    };
    let mut ordered: Vec<SiteId> = Vec::with_capacity(picked.len());
    let mut at = home;
    while !picked.is_empty() {
        let nearest = picked
            .iter()
            .enumerate()
            .min_by(|a, b| {
                at.distance_km(&location(a.1))
                    .total_cmp(&at.distance_km(&location(b.1)))
                    .then_with(|| a.1.cmp(b.1))
            })
            .map_or(0, |(i, _)| i);
        let next = picked.remove(nearest);
        at = location(&next);
        ordered.push(next);
    }

    let round_trip = |sites: &[SiteId]| {
        let mut km = 0.0;
        let mut at = home;
        for id in sites {
            km += at.distance_km(&location(id));
            at = location(id);
        }
        km + at.distance_km(&home)
    };
    while !ordered.is_empty() && round_trip(&ordered) > vehicle_range_km {
        ordered.pop();
    }
    ordered
}
