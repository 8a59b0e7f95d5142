//! Track path implementations.

use fleet_core::spatial::offset_by_bearing;
use std::f64::consts::PI;

/// A path a simulated vehicle follows.
pub trait TrackPath: Send + Sync {
    /// (lat, lon, altitude_m) at `t` seconds from start.
    fn position(&self, t: f64) -> (f64, f64, f64);

    /// Approximate heading at `t` (degrees, 0 = North).
    fn heading(&self, t: f64) -> f64 {
        let dt = 0.1;
        let (lat1, lon1, _) = self.position(t);
        let (lat2, lon2, _) = self.position(t + dt);

        let dlat = lat2 - lat1;
        let dlon = (lon2 - lon1) * lat1.to_radians().cos();
        if dlat.abs() < 1e-10 && dlon.abs() < 1e-10 {
            return 0.0;
        }

        dlon.atan2(dlat).to_degrees().rem_euclid(360.0)
    }

    fn speed_mps(&self) -> f64;
}

/// Circle around a center point.
pub struct CircularPath {
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_m: f64,
    pub altitude_m: f64,
    pub speed_mps: f64,
    pub start_angle: f64,
    pub clockwise: bool,
    period: f64,
}

impl CircularPath {
    /// `start_angle` is a bearing in radians from the center.
    pub fn new(
        center_lat: f64,
        center_lon: f64,
        radius_m: f64,
        altitude_m: f64,
        speed_mps: f64,
        start_angle: f64,
        clockwise: bool,
    ) -> Self {
        let circumference = 2.0 * PI * radius_m;
        let period = if speed_mps > 0.0 {
            circumference / speed_mps
        } else {
            f64::INFINITY
        };

        Self {
            center_lat,
            center_lon,
            radius_m,
            altitude_m,
            speed_mps,
            start_angle,
            clockwise,
            period,
        }
    }

    pub fn period_secs(&self) -> f64 {
        self.period
    }
}

impl TrackPath for CircularPath {
    fn position(&self, t: f64) -> (f64, f64, f64) {
        let sweep = 2.0 * PI * t / self.period;
        let bearing = if self.clockwise {
            self.start_angle + sweep
        } else {
            self.start_angle - sweep
        };
        let (lat, lon) = offset_by_bearing(self.center_lat, self.center_lon, self.radius_m, bearing);
        (lat, lon, self.altitude_m)
    }

    fn speed_mps(&self) -> f64 {
        self.speed_mps
    }
}
