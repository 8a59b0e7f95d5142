//! Video time to telemetry sample alignment.
//!
//! The first sample of a loaded range is the anchor for video time zero:
//! `target = anchor.timestamp + video_elapsed_secs * 1000ms`. The nominal
//! mission start time is not used because it routinely disagrees with the
//! first fix by seconds to minutes.

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::TelemetryPoint;

/// Index of the sample whose timestamp is closest to `target_ms`.
///
/// `points` must be sorted ascending by timestamp. Both neighbours of the
/// crossing point are visited on the way down, so the result is the global
/// minimum distance, not merely the first sample at or after the target.
pub fn closest_sample_index(points: &[TelemetryPoint], target_ms: i64) -> Option<usize> {
    if points.is_empty() {
        return None;
    }

    let mut left = 0usize;
    let mut right = points.len() - 1;
    let mut best = 0usize;
    let mut best_diff = i64::MAX;

    while left <= right {
        let mid = left + (right - left) / 2;
        let timestamp = points[mid].timestamp_ms();
        let diff = (timestamp - target_ms).abs();
        if diff < best_diff {
            best_diff = diff;
            best = mid;
        }

        if timestamp < target_ms {
            left = mid + 1;
        } else if timestamp > target_ms {
            match mid.checked_sub(1) {
                Some(next) => right = next,
                None => break,
            }
        } else {
            break;
        }
    }

    Some(best)
}

/// Immutable, ascending-by-timestamp sample set for one playback session.
#[derive(Debug, Clone, Default)]
pub struct TelemetryTrack {
    points: Vec<TelemetryPoint>,
}

impl TelemetryTrack {
    /// Build a track, sorting if the input is out of order.
    pub fn from_points(mut points: Vec<TelemetryPoint>) -> Self {
        let sorted = points
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp);
        if !sorted {
            tracing::warn!(
                samples = points.len(),
                "telemetry range arrived out of order; sorting before alignment"
            );
            points.sort_by_key(|point| point.timestamp);
        }
        Self { points }
    }

    pub fn points(&self) -> &[TelemetryPoint] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&TelemetryPoint> {
        self.points.get(index)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The sample that corresponds to video time zero.
    pub fn anchor(&self) -> Option<&TelemetryPoint> {
        self.points.first()
    }

    /// Wall-clock instant for a video position. Negative or non-finite
    /// positions clamp to the anchor; positions past the representable
    /// range clamp to the last sample.
    pub fn target_for_video_time(&self, video_elapsed_secs: f64) -> Option<DateTime<Utc>> {
        let anchor = self.anchor()?;
        let secs = if video_elapsed_secs.is_finite() {
            video_elapsed_secs.max(0.0)
        } else {
            0.0
        };
        let offset_ms = (secs * 1000.0).round() as i64;
        let target = TimeDelta::try_milliseconds(offset_ms)
            .and_then(|offset| anchor.timestamp.checked_add_signed(offset));
        match target {
            Some(target) => Some(target),
            None => self.points.last().map(|last| last.timestamp),
        }
    }

    pub fn closest_to_video_time(&self, video_elapsed_secs: f64) -> Option<usize> {
        let target = self.target_for_video_time(video_elapsed_secs)?;
        closest_sample_index(&self.points, target.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rand::Rng;

    fn point_at(base: DateTime<Utc>, offset_ms: i64) -> TelemetryPoint {
        TelemetryPoint {
            id: offset_ms.to_string(),
            vehicle_id: "DRONE-1".to_string(),
            latitude: 33.0,
            longitude: -117.0,
            altitude: 50.0,
            speed: 5.0,
            heading: 90.0,
            battery_level: 80.0,
            timestamp: base + Duration::milliseconds(offset_ms),
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_track_has_no_match() {
        assert_eq!(closest_sample_index(&[], 0), None);
        assert_eq!(TelemetryTrack::default().closest_to_video_time(3.0), None);
    }

    #[test]
    fn test_video_time_maps_to_nearest_sample() {
        let base = base_time();
        let track = TelemetryTrack::from_points(vec![
            point_at(base, 0),
            point_at(base, 5_000),
            point_at(base, 10_000),
        ]);

        assert_eq!(track.closest_to_video_time(0.0), Some(0));
        assert_eq!(track.closest_to_video_time(6.0), Some(1));
        assert_eq!(track.closest_to_video_time(7.6), Some(2));
        assert_eq!(track.closest_to_video_time(500.0), Some(2));
        assert_eq!(track.closest_to_video_time(-4.0), Some(0));
    }

    #[test]
    fn test_huge_video_time_clamps_to_last_sample() {
        let base = base_time();
        let single = TelemetryTrack::from_points(vec![point_at(base, 0)]);
        assert_eq!(single.closest_to_video_time(1e13), Some(0));

        let track = TelemetryTrack::from_points(vec![
            point_at(base, 0),
            point_at(base, 5_000),
            point_at(base, 10_000),
        ]);
        assert_eq!(
            track.target_for_video_time(1e13),
            Some(base + Duration::milliseconds(10_000))
        );
        assert_eq!(track.closest_to_video_time(1e13), Some(2));
        assert_eq!(track.closest_to_video_time(f64::MAX), Some(2));
    }

    #[test]
    fn test_exact_match_short_circuits() {
        let base = base_time();
        let points: Vec<_> = (0..7).map(|i| point_at(base, i * 1_000)).collect();
        let target = base.timestamp_millis() + 4_000;
        assert_eq!(closest_sample_index(&points, target), Some(4));
    }

    #[test]
    fn test_matches_linear_scan_on_random_tracks() {
        let mut rng = rand::rng();
        let base = base_time();

        for _ in 0..500 {
            let len = rng.random_range(1..64);
            let mut offset = 0i64;
            let points: Vec<_> = (0..len)
                .map(|_| {
                    offset += rng.random_range(1..5_000);
                    point_at(base, offset)
                })
                .collect();

            let target = base.timestamp_millis() + rng.random_range(-2_000..offset + 2_000);
            let best = closest_sample_index(&points, target).unwrap();
            let best_diff = (points[best].timestamp_ms() - target).abs();
            let brute_diff = points
                .iter()
                .map(|point| (point.timestamp_ms() - target).abs())
                .min()
                .unwrap();
            assert_eq!(best_diff, brute_diff, "target {} len {}", target, len);
        }
    }

    #[test]
    fn test_unsorted_input_is_sorted_on_ingestion() {
        let base = base_time();
        let track = TelemetryTrack::from_points(vec![
            point_at(base, 10_000),
            point_at(base, 0),
            point_at(base, 5_000),
        ]);
        assert_eq!(track.anchor().unwrap().id, "0");
        assert_eq!(track.closest_to_video_time(9.0), Some(2));
    }
}
