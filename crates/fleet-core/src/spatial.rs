//! Distance helpers.

use crate::models::LatLng;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Euclidean distance in raw degrees.
///
/// Only meaningful for the small separations the marker smoother deals with;
/// it ignores longitude convergence toward the poles.
pub fn planar_distance_deg(a: LatLng, b: LatLng) -> f64 {
    let dlat = b.latitude - a.latitude;
    let dlng = b.longitude - a.longitude;
    (dlat * dlat + dlng * dlng).sqrt()
}

/// Move a point `distance_m` along `bearing_rad` (0 = North, clockwise).
pub fn offset_by_bearing(lat: f64, lon: f64, distance_m: f64, bearing_rad: f64) -> (f64, f64) {
    if distance_m.abs() <= f64::EPSILON {
        return (lat, lon);
    }

    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    (lat2.to_degrees(), lon2.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_distance() {
        // Approx 111km per degree of latitude
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_320.0).abs() < 1000.0);
    }

    #[test]
    fn test_planar_distance_is_pythagorean() {
        let a = LatLng::new(10.0, 20.0);
        let b = LatLng::new(10.003, 20.004);
        assert!((planar_distance_deg(a, b) - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_offset_by_bearing_round_trips_distance() {
        let (lat, lon) = offset_by_bearing(33.6846, -117.8265, 250.0, std::f64::consts::FRAC_PI_2);
        let dist = haversine_distance(33.6846, -117.8265, lat, lon);
        assert!((dist - 250.0).abs() < 0.5);
    }
}
