//! Marker position smoothing.
//!
//! Live samples arrive at irregular intervals; rendering them verbatim makes
//! markers jump. Each marker tweens from where it is currently drawn to the
//! newest target with an ease-out cubic curve, unless the jump is larger than
//! the teleport threshold, in which case it snaps.
//!
//! The math ([`interpolate`]) is independent of any clock. Callers drive
//! [`MarkerAnimator::tick`] from whatever frame source they have: a tokio
//! interval, a render loop callback, or a test-controlled instant.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::models::LatLng;
use crate::rules::SmoothingRules;
use crate::spatial::planar_distance_deg;

/// `1 - (1 - t)^3`, with `t` clamped to `[0, 1]`.
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Eased position `elapsed` into a tween of length `duration`.
pub fn interpolate(start: LatLng, end: LatLng, elapsed: Duration, duration: Duration) -> LatLng {
    if duration.is_zero() {
        return end;
    }
    let t = elapsed.as_secs_f64() / duration.as_secs_f64();
    if t >= 1.0 {
        return end;
    }
    let eased = ease_out_cubic(t);
    LatLng::new(
        start.latitude + (end.latitude - start.latitude) * eased,
        start.longitude + (end.longitude - start.longitude) * eased,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerPhase {
    /// No position yet
    Idle,
    /// Tween in progress
    Animating,
    /// Resting on the last target
    Settled,
}

#[derive(Debug, Clone, Copy)]
enum AnimationState {
    Idle,
    Animating {
        from: LatLng,
        to: LatLng,
        started_at: Instant,
    },
    Settled {
        at: LatLng,
    },
}

/// Per-marker tween state machine.
#[derive(Debug, Clone)]
pub struct MarkerAnimator {
    rules: SmoothingRules,
    state: AnimationState,
}

impl Default for MarkerAnimator {
    fn default() -> Self {
        Self::new(SmoothingRules::default())
    }
}

impl MarkerAnimator {
    pub fn new(rules: SmoothingRules) -> Self {
        Self {
            rules,
            state: AnimationState::Idle,
        }
    }

    pub fn phase(&self) -> MarkerPhase {
        match self.state {
            AnimationState::Idle => MarkerPhase::Idle,
            AnimationState::Animating { .. } => MarkerPhase::Animating,
            AnimationState::Settled { .. } => MarkerPhase::Settled,
        }
    }

    /// Where the marker should be drawn at `now`.
    pub fn position_at(&self, now: Instant) -> Option<LatLng> {
        match self.state {
            AnimationState::Idle => None,
            AnimationState::Animating {
                from,
                to,
                started_at,
            } => Some(interpolate(
                from,
                to,
                now.saturating_duration_since(started_at),
                self.rules.animation_duration,
            )),
            AnimationState::Settled { at } => Some(at),
        }
    }

    /// The position the marker is heading to (or resting on).
    pub fn target(&self) -> Option<LatLng> {
        match self.state {
            AnimationState::Idle => None,
            AnimationState::Animating { to, .. } => Some(to),
            AnimationState::Settled { at } => Some(at),
        }
    }

    /// Accept a new target and return the position to draw this frame.
    ///
    /// A tween in progress is restarted from its current interpolated
    /// position, not from its old target.
    pub fn set_target(&mut self, target: LatLng, now: Instant) -> LatLng {
        let Some(current) = self.position_at(now) else {
            self.state = AnimationState::Settled { at: target };
            return target;
        };

        if self.target() == Some(target) {
            return current;
        }

        if planar_distance_deg(current, target) > self.rules.teleport_threshold_deg {
            self.state = AnimationState::Settled { at: target };
            return target;
        }

        self.state = AnimationState::Animating {
            from: current,
            to: target,
            started_at: now,
        };
        current
    }

    /// Advance one frame. Returns the new position while animating and
    /// `None` once nothing is moving.
    pub fn tick(&mut self, now: Instant) -> Option<LatLng> {
        let AnimationState::Animating { to, started_at, .. } = self.state else {
            return None;
        };
        let position = self.position_at(now)?;
        if now.saturating_duration_since(started_at) >= self.rules.animation_duration {
            self.state = AnimationState::Settled { at: to };
            return Some(to);
        }
        Some(position)
    }

    /// Stop any tween, leaving the marker where it is drawn at `now`.
    pub fn cancel(&mut self, now: Instant) {
        if let Some(at) = self.position_at(now) {
            self.state = AnimationState::Settled { at };
        }
    }
}

/// One rendered marker position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerFrame {
    pub vehicle_id: String,
    pub position: LatLng,
    pub phase: MarkerPhase,
}

/// Animators for every marker on the map.
#[derive(Debug, Default)]
pub struct MarkerLayer {
    rules: SmoothingRules,
    markers: HashMap<String, MarkerAnimator>,
}

impl MarkerLayer {
    pub fn new(rules: SmoothingRules) -> Self {
        Self {
            rules,
            markers: HashMap::new(),
        }
    }

    pub fn set_target(&mut self, vehicle_id: &str, target: LatLng, now: Instant) -> LatLng {
        let rules = self.rules;
        self.markers
            .entry(vehicle_id.to_string())
            .or_insert_with(|| MarkerAnimator::new(rules))
            .set_target(target, now)
    }

    /// Advance every animating marker; returns only the ones that moved.
    pub fn frame(&mut self, now: Instant) -> Vec<MarkerFrame> {
        self.markers
            .iter_mut()
            .filter_map(|(vehicle_id, animator)| {
                animator.tick(now).map(|position| MarkerFrame {
                    vehicle_id: vehicle_id.clone(),
                    position,
                    phase: animator.phase(),
                })
            })
            .collect()
    }

    pub fn is_animating(&self) -> bool {
        self.markers
            .values()
            .any(|animator| animator.phase() == MarkerPhase::Animating)
    }

    /// Drop a marker and its tween.
    pub fn remove(&mut self, vehicle_id: &str) -> bool {
        self.markers.remove(vehicle_id).is_some()
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Current drawn position of every marker, sorted by vehicle id.
    pub fn positions(&self, now: Instant) -> Vec<MarkerFrame> {
        let mut frames: Vec<MarkerFrame> = self
            .markers
            .iter()
            .filter_map(|(vehicle_id, animator)| {
                animator.position_at(now).map(|position| MarkerFrame {
                    vehicle_id: vehicle_id.clone(),
                    position,
                    phase: animator.phase(),
                })
            })
            .collect();
        frames.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        frames
    }
}
