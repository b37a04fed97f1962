//! Mission waypoints.

use serde::{Deserialize, Serialize};

use crate::{Coordinates, SettlementId, SiteId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NavPointKind {
    Site(SiteId),
    Settlement(SettlementId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavPoint {
    pub location: Coordinates,
    pub kind: NavPointKind,
}

/// Append-only list of waypoints, consumed in order. `index <= points.len()`.
///
/// Distances are always recomputed from the list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavRoute {
    points: Vec<NavPoint>,
    index: usize,
}

impl NavRoute {
    pub fn new(points: Vec<NavPoint>) -> Self {
        Self { points, index: 0 }
    }

    pub fn push(&mut self, point: NavPoint) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn nav_index(&self) -> usize {
        self.index
    }

    pub fn points(&self) -> &[NavPoint] {
        &self.points
    }

    pub fn is_finished(&self) -> bool {
        self.index >= self.points.len()
    }

    /// Next waypoint to reach.
    pub fn current(&self) -> Option<&NavPoint> {
        self.points.get(self.index)
    }

    /// Most recently reached waypoint.
    pub fn last_reached(&self) -> Option<&NavPoint> {
        self.index.checked_sub(1).and_then(|i| self.points.get(i))
    }

    pub fn arrive(&mut self) {
        if self.index < self.points.len() {
            self.index += 1;
        }
    }

    /// Distance from `from` to the next waypoint plus every leg after it.
    /// Zero once every waypoint is reached.
    pub fn remaining_distance_km(&self, from: &Coordinates) -> f64 {
        let Some(next) = self.current() else {
            return 0.0;
        };
        let legs: f64 = self.points[self.index..]
            .windows(2)
            .map(|pair| pair[0].location.distance_km(&pair[1].location))
            .sum();
        from.distance_km(&next.location) + legs
    }

    /// Full length of the route starting at `start`.
    pub fn total_distance_km(&self, start: &Coordinates) -> f64 {
        let Some(first) = self.points.first() else {
            return 0.0;
        };
        let legs: f64 = self
            .points
            .windows(2)
            .map(|pair| pair[0].location.distance_km(&pair[1].location))
            .sum();
        start.distance_km(&first.location) + legs
    }
}
