use mars_core::coordinates::MARS_RADIUS_KM;
use mars_core::mission::{NavPoint, NavPointKind};
use mars_core::{Coordinates, NavRoute, SettlementId, SiteId};

fn site(id: &str, lat: f64, lon: f64) -> NavPoint {
    NavPoint {
        location: Coordinates::new(lat, lon),
        kind: NavPointKind::Site(SiteId(id.to_string())),
    }
}

fn degree_km() -> f64 {
    MARS_RADIUS_KM * std::f64::consts::PI / 180.0
}

#[test]
fn test_distance_to_self_is_zero() {
    let here = Coordinates::new(12.5, -40.0);
    assert!(here.distance_km(&here).abs() < 1e-9);
}

#[test]
fn test_one_degree_along_the_equator() {
    let a = Coordinates::new(0.0, 0.0);
    let b = Coordinates::new(0.0, 1.0);
    assert!((a.distance_km(&b) - degree_km()).abs() < 1e-6);
    assert!((a.distance_km(&b) - b.distance_km(&a)).abs() < 1e-12);
}

#[test]
fn test_toward_never_overshoots() {
    let a = Coordinates::new(0.0, 0.0);
    let b = Coordinates::new(0.0, 2.0);
    let total = a.distance_km(&b);

    let halfway = a.toward(&b, total / 2.0);
    assert!((a.distance_km(&halfway) - total / 2.0).abs() < 1e-6);
    assert!((halfway.distance_km(&b) - total / 2.0).abs() < 1e-6);

    assert_eq!(a.toward(&b, total * 3.0), b);
    assert_eq!(a.toward(&b, 0.0), a);
}

#[test]
fn test_offset_lands_at_the_requested_distance() {
    let origin = Coordinates::new(10.0, 20.0);
    let moved = origin.offset(45.0, 120.0);
    assert!((origin.distance_km(&moved) - 120.0).abs() < 1e-6);
}

#[test]
fn test_route_is_consumed_in_order() {
    let home = NavPoint {
        location: Coordinates::new(0.0, 0.0),
        kind: NavPointKind::Settlement(SettlementId("settlement_0001".to_string())),
    };
    let mut route = NavRoute::new(vec![site("site_a", 0.0, 1.0), site("site_b", 0.0, 2.0), home]);
    let start = Coordinates::new(0.0, 0.0);

    assert_eq!(route.nav_index(), 0);
    assert!(route.last_reached().is_none());
    assert!((route.total_distance_km(&start) - 4.0 * degree_km()).abs() < 1e-6);
    assert!(
        (route.remaining_distance_km(&start) - route.total_distance_km(&start)).abs() < 1e-9
    );

    route.arrive();
    assert_eq!(
        route.last_reached().map(|p| &p.kind),
        Some(&NavPointKind::Site(SiteId("site_a".to_string())))
    );
    let at_a = Coordinates::new(0.0, 1.0);
    assert!((route.remaining_distance_km(&at_a) - 3.0 * degree_km()).abs() < 1e-6);

    route.arrive();
    route.arrive();
    assert!(route.is_finished());
    assert!(route.remaining_distance_km(&start).abs() < 1e-12);

    route.arrive();
    assert_eq!(route.nav_index(), route.len(), "arriving past the end is a no-op");
}

#[test]
fn test_empty_route_is_finished() {
    let route = NavRoute::default();
    assert!(route.is_empty());
    assert!(route.is_finished());
    assert!(route.current().is_none());
    assert!(route.total_distance_km(&Coordinates::new(0.0, 0.0)).abs() < 1e-12);
}
