use std::collections::VecDeque;

use crate::types::VelocitySample;

/// Append-only ring of `VelocitySample`s pruned to the maximum of all
/// configured lookback windows, feeding `velNorm`/`accNorm` into the
/// volatility market-making pricing family.
pub struct VelocityTracker {
    samples: VecDeque<VelocitySample>,
    max_window_ms: i64,
}

impl VelocityTracker {
    pub fn new(max_window_ms: i64) -> Self {
        Self {
            samples: VecDeque::new(),
            max_window_ms,
        }
    }

    pub fn push(&mut self, sample: VelocitySample) {
        self.samples.push_back(sample);
        let cutoff = sample.ts_ms - self.max_window_ms;
        while let Some(front) = self.samples.front() {
            if front.ts_ms < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Price change in pips/second over the given window, anchored at the
    /// most recent sample. `None` if there's no sample at or before the
    /// window start.
    pub fn velocity_pips_per_sec(&self, now_ms: i64, window_ms: i64) -> Option<f64> {
        let latest = self.samples.back()?;
        let window_start = now_ms - window_ms;
        let earliest_in_window = self
            .samples
            .iter()
            .find(|s| s.ts_ms >= window_start)?;
        let dt_s = (latest.ts_ms - earliest_in_window.ts_ms) as f64 / 1000.0;
        if dt_s <= 0.0 {
            return None;
        }
        Some((latest.price_pips - earliest_in_window.price_pips) as f64 / dt_s)
    }

    /// Change in velocity between the first and second half of the window,
    /// in pips/second^2.
    pub fn acceleration_pips_per_sec2(&self, now_ms: i64, window_ms: i64) -> Option<f64> {
        let half = window_ms / 2;
        let v_recent = self.velocity_pips_per_sec(now_ms, half)?;
        let v_prior = self.velocity_pips_per_sec(now_ms - half, half)?;
        let dt_s = half as f64 / 1000.0;
        if dt_s <= 0.0 {
            return None;
        }
        Some((v_recent - v_prior) / dt_s)
    }
}

/// Normalize a raw velocity/acceleration reading against a configured scale,
/// clamped to [-1, 1] so it composes additively into the volmm z-score.
pub fn normalize(raw: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 0.0;
    }
    (raw / scale).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(ts_ms: i64, price_pips: i64) -> VelocitySample {
        VelocitySample { ts_ms, price_pips }
    }

    #[test]
    fn test_pruning_to_max_window() {
        let mut t = VelocityTracker::new(5_000);
        for i in 0..20 {
            t.push(s(i * 1000, 1000 + i));
        }
        // only samples within the last 5000ms of the latest (ts=19000) survive
        assert!(t.len() <= 6);
        assert!(t.samples.front().unwrap().ts_ms >= 14_000);
    }

    /// Scenario: price rises 100 pips over 10 seconds, 1 sample/second.
    /// Expected: velocity over the full window is 10 pips/sec.
    #[test]
    fn test_velocity_linear_ramp() {
        let mut t = VelocityTracker::new(20_000);
        for i in 0..=10 {
            t.push(s(i * 1000, 1000 + i * 10));
        }
        let v = t.velocity_pips_per_sec(10_000, 10_000).unwrap();
        assert!((v - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_empty_tracker_is_none() {
        let t = VelocityTracker::new(5_000);
        assert!(t.velocity_pips_per_sec(0, 1000).is_none());
    }

    /// Scenario: velocity doubles between the first and second half of the
    /// acceleration window.
    /// Expected: acceleration is positive (speeding up).
    #[test]
    fn test_acceleration_detects_speedup() {
        let mut t = VelocityTracker::new(20_000);
        // first half: slow ramp (1 pip/s), second half: fast ramp (5 pips/s)
        for i in 0..=5 {
            t.push(s(i * 1000, i));
        }
        for i in 6..=10 {
            let prior = 5;
            t.push(s(i * 1000, prior + (i - 5) * 5));
        }
        let acc = t.acceleration_pips_per_sec2(10_000, 10_000).unwrap();
        assert!(acc > 0.0, "acceleration = {acc}");
    }

    #[test]
    fn test_normalize_clamps() {
        assert_eq!(normalize(50.0, 10.0), 1.0);
        assert_eq!(normalize(-50.0, 10.0), -1.0);
        assert!((normalize(5.0, 10.0) - 0.5).abs() < 1e-9);
        assert_eq!(normalize(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_reset_clears_samples() {
        let mut t = VelocityTracker::new(5_000);
        t.push(s(0, 100));
        assert!(!t.is_empty());
        t.reset();
        assert!(t.is_empty());
    }
}
