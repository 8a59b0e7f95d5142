//! Exponential delay with jitter for re-polling a dropped broker link.
//!
//! The MQTT event loop reconnects on the next poll; this only paces those
//! polls so an offline broker does not turn into a tight loop and log storm.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    jitter_ratio: f64,
}

impl Backoff {
    pub(crate) fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
            jitter_ratio: 0.2,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.base;
    }

    /// Delay before the next poll; doubles up to `max`.
    pub(crate) fn fail(&mut self) -> Duration {
        let delay = add_jitter(self.current, self.jitter_ratio);
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

/// Stretch `delay` by a random amount of at most `ratio` of itself.
fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
    let spread_ms = (delay.as_millis() as f64 * ratio) as u64;
    if spread_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::rng().random_range(0..=spread_ms))
}
