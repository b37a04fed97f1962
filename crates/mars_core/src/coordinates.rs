//! Positions on the Martian surface.

use serde::{Deserialize, Serialize};

pub const MARS_RADIUS_KM: f64 = 3389.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat_deg: f64,
    pub lon_deg: f64,
}

impl Coordinates {
    pub const fn new(lat_deg: f64, lon_deg: f64) -> Self {
        Self { lat_deg, lon_deg }
    }

    /// Great-circle distance in km.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        MARS_RADIUS_KM * self.central_angle(other)
    }

    fn central_angle(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.lat_deg.to_radians(), other.lat_deg.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon_deg - self.lon_deg).to_radians();
        let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * h.sqrt().min(1.0).asin()
    }

    /// The point `km` along the great circle toward `target`. Never overshoots.
    #[must_use]
    pub fn toward(&self, target: &Coordinates, km: f64) -> Coordinates {
        let angle = self.central_angle(target);
        let total = MARS_RADIUS_KM * angle;
        if km >= total || angle < 1e-12 {
            return *target;
        }
        if km <= 0.0 {
            return *self;
        }
        let fraction = km / total;
        let a = ((1.0 - fraction) * angle).sin() / angle.sin();
        let b = (fraction * angle).sin() / angle.sin();
        let (x1, y1, z1) = self.unit_vector();
        let (x2, y2, z2) = target.unit_vector();
        let (x, y, z) = (a * x1 + b * x2, a * y1 + b * y2, a * z1 + b * z2);
        Coordinates {
            lat_deg: z.atan2(x.hypot(y)).to_degrees(),
            lon_deg: y.atan2(x).to_degrees(),
        }
    }

    /// A point `km` away on the given compass bearing.
    #[must_use]
    pub fn offset(&self, bearing_deg: f64, km: f64) -> Coordinates {
        let angle = km / MARS_RADIUS_KM;
        let lat1 = self.lat_deg.to_radians();
        let lon1 = self.lon_deg.to_radians();
        let bearing = bearing_deg.to_radians();
        let lat2 = (lat1.sin() * angle.cos() + lat1.cos() * angle.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angle.sin() * lat1.cos()).atan2(angle.cos() - lat1.sin() * lat2.sin());
        Coordinates {
            lat_deg: lat2.to_degrees(),
            lon_deg: lon2.to_degrees(),
        }
    }

    fn unit_vector(&self) -> (f64, f64, f64) {
        let (lat, lon) = (self.lat_deg.to_radians(), self.lon_deg.to_radians());
        (lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
    }
}
