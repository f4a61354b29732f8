// src/services/geo_ranker.rs
use std::cmp::Ordering;

use crate::models::{driver::Driver, location::Coordinate};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Distance reported for a driver that has never sent a location.
pub const MISSING_LOCATION_DISTANCE: f64 = 100_000.0;

pub const DEFAULT_MAX_RADIUS_METERS: f64 = 500_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingConfig {
    pub max_radius_meters: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_radius_meters: DEFAULT_MAX_RADIUS_METERS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub driver: Driver,
    pub distance_meters: f64,
    pub has_location: bool,
}

/// Great-circle distance in meters. A missing side yields
/// [`MISSING_LOCATION_DISTANCE`] instead of an error.
pub fn distance_meters(a: Option<Coordinate>, b: Option<Coordinate>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return MISSING_LOCATION_DISTANCE;
    };

    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Orders drivers for offering: located drivers nearest first, then
/// location-less drivers in input order. Drivers beyond the radius are dropped.
pub fn rank_candidates(
    pickup: Coordinate,
    drivers: Vec<Driver>,
    config: &RankingConfig,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = drivers
        .into_iter()
        .map(|driver| {
            let location = driver
                .last_known_location
                .map(|l| l.coordinate())
                .filter(Coordinate::is_valid);
            RankedCandidate {
                distance_meters: distance_meters(Some(pickup), location),
                has_location: location.is_some(),
                driver,
            }
        })
        .filter(|candidate| candidate.distance_meters <= config.max_radius_meters)
        .collect();

    // sort_by is stable, so equal keys keep input order
    ranked.sort_by(|a, b| match (a.has_location, b.has_location) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
        (true, true) => a.distance_meters.total_cmp(&b.distance_meters),
    });

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::location::DriverLocation;

    const PICKUP: Coordinate = Coordinate {
        lat: -1.0903,
        lng: 35.8612,
    };

    fn driver_at(id: &str, at: Option<Coordinate>) -> Driver {
        let mut driver = Driver::new(id, id, "0700", "KAA 000A", "sedan");
        driver.last_known_location = at.map(DriverLocation::now);
        driver
    }

    fn north_of_pickup(meters: f64) -> Coordinate {
        let degrees = meters / (EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0);
        Coordinate::new(PICKUP.lat + degrees, PICKUP.lng)
    }

    fn ids(ranked: &[RankedCandidate]) -> Vec<&str> {
        ranked.iter().map(|c| c.driver.id.as_str()).collect()
    }

    #[test]
    fn test_distance_zero_for_same_point() {
        assert!(distance_meters(Some(PICKUP), Some(PICKUP)).abs() < 1e-6);
    }

    #[test]
    fn test_distance_known_value() {
        // One degree of latitude on a 6371 km sphere
        let d = distance_meters(Some(Coordinate::new(0.0, 0.0)), Some(Coordinate::new(1.0, 0.0)));
        assert!((d - 111_194.93).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_distance_missing_side_is_sentinel() {
        assert_eq!(distance_meters(None, Some(PICKUP)), MISSING_LOCATION_DISTANCE);
        assert_eq!(distance_meters(Some(PICKUP), None), MISSING_LOCATION_DISTANCE);
    }

    #[test]
    fn test_rank_orders_by_distance() {
        let drivers = vec![
            driver_at("d500", Some(north_of_pickup(500.0))),
            driver_at("d2000", Some(north_of_pickup(2000.0))),
            driver_at("d100", Some(north_of_pickup(100.0))),
        ];
        let ranked = rank_candidates(PICKUP, drivers, &RankingConfig::default());
        assert_eq!(ids(&ranked), vec!["d100", "d500", "d2000"]);
        assert!((ranked[0].distance_meters - 100.0).abs() < 1.0);
    }

    #[test]
    fn test_located_drivers_precede_locationless_even_when_farther() {
        // 300 km is numerically farther than the sentinel, still ranks first
        let drivers = vec![
            driver_at("ghost", None),
            driver_at("far", Some(north_of_pickup(300_000.0))),
        ];
        let ranked = rank_candidates(PICKUP, drivers, &RankingConfig::default());
        assert_eq!(ids(&ranked), vec!["far", "ghost"]);
        assert!(!ranked[1].has_location);
    }

    #[test]
    fn test_locationless_keep_input_order() {
        let drivers = vec![
            driver_at("g1", None),
            driver_at("near", Some(north_of_pickup(50.0))),
            driver_at("g2", None),
            driver_at("g3", None),
        ];
        let ranked = rank_candidates(PICKUP, drivers, &RankingConfig::default());
        assert_eq!(ids(&ranked), vec!["near", "g1", "g2", "g3"]);
    }

    #[test]
    fn test_all_locationless_returns_input_order() {
        let drivers = vec![driver_at("c", None), driver_at("a", None), driver_at("b", None)];
        let ranked = rank_candidates(PICKUP, drivers, &RankingConfig::default());
        assert_eq!(ids(&ranked), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_equal_distances_are_stable() {
        let spot = north_of_pickup(700.0);
        let drivers = vec![driver_at("first", Some(spot)), driver_at("second", Some(spot))];
        let ranked = rank_candidates(PICKUP, drivers, &RankingConfig::default());
        assert_eq!(ids(&ranked), vec!["first", "second"]);
    }

    #[test]
    fn test_radius_excludes_far_drivers() {
        let config = RankingConfig {
            max_radius_meters: 1_000.0,
        };
        let drivers = vec![
            driver_at("near", Some(north_of_pickup(900.0))),
            driver_at("far", Some(north_of_pickup(1_500.0))),
            driver_at("ghost", None),
        ];
        let ranked = rank_candidates(PICKUP, drivers, &config);
        assert_eq!(ids(&ranked), vec!["near"]);
    }

    #[test]
    fn test_invalid_location_treated_as_missing() {
        let drivers = vec![
            driver_at("broken", Some(Coordinate::new(f64::NAN, 0.0))),
            driver_at("ok", Some(north_of_pickup(10.0))),
        ];
        let ranked = rank_candidates(PICKUP, drivers, &RankingConfig::default());
        assert_eq!(ids(&ranked), vec!["ok", "broken"]);
        assert!(!ranked[1].has_location);
    }
}
