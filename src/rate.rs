//! Differential rate tracking over monotonically increasing counters.
//!
//! Platform counters (cumulative network octets, disk sectors, CPU time) are
//! monotonic only within the lifetime of the thing they measure. Interface
//! replug, device remount, or PID reuse resets them, so a decrease must
//! re-baseline rather than produce a negative or absurdly large rate.

use std::time::Instant;

/// One observation of a cumulative counter.
#[derive(Debug, Clone, Copy)]
pub struct CounterSample {
    pub value: u64,
    pub time: Instant,
}

/// Converts a cumulative counter into a per-second rate in the counter's
/// native unit. Callers convert to MB/s, %, etc.
#[derive(Debug, Default)]
pub struct RateTracker {
    last: Option<CounterSample>,
    rate: f64,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one observation and get the current rate.
    ///
    /// Before two observations with a positive time delta exist the rate is
    /// 0.0. A non-advancing clock returns the previous rate without touching
    /// stored state. A counter decrease re-baselines at the new value and
    /// reports 0.0 for this call.
    pub fn observe(&mut self, value: u64, time: Instant) -> f64 {
        let prev = match self.last {
            Some(prev) => prev,
            None => {
                self.last = Some(CounterSample { value, time });
                return self.rate;
            }
        };

        let dt = time.saturating_duration_since(prev.time).as_secs_f64();
        if dt <= 0.0 {
            return self.rate;
        }

        if value < prev.value {
            // Counter reset: new baseline, no rate until the next observation.
            self.rate = 0.0;
        } else {
            self.rate = (value - prev.value) as f64 / dt;
        }
        self.last = Some(CounterSample { value, time });
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn first_observation_has_no_rate() {
        let mut tracker = RateTracker::new();
        assert_eq!(tracker.observe(1000, Instant::now()), 0.0);
    }

    #[test]
    fn steady_counter_yields_delta_over_interval() {
        let base = Instant::now();
        let mut tracker = RateTracker::new();
        tracker.observe(1000, base);
        assert_eq!(tracker.observe(3000, at(base, 2)), 1000.0);
        assert_eq!(tracker.observe(3500, at(base, 3)), 500.0);
    }

    #[test]
    fn counter_reset_rebaselines_without_negative_rate() {
        let base = Instant::now();
        let mut tracker = RateTracker::new();
        tracker.observe(5000, base);
        tracker.observe(6000, at(base, 1));

        // Counter fell back (e.g. interface restarted): 0.0, not negative.
        assert_eq!(tracker.observe(100, at(base, 2)), 0.0);

        // Next observation resumes against the reset baseline, not the old
        // one, so no inflated spike either.
        assert_eq!(tracker.observe(400, at(base, 3)), 300.0);
    }

    #[test]
    fn zero_width_interval_repeats_previous_rate() {
        let base = Instant::now();
        let mut tracker = RateTracker::new();
        tracker.observe(0, base);
        let rate = tracker.observe(700, at(base, 1));
        assert_eq!(rate, 700.0);

        // Same timestamp again: rate unchanged, baseline untouched.
        assert_eq!(tracker.observe(9999, at(base, 1)), rate);
        assert_eq!(tracker.observe(1400, at(base, 2)), 700.0);
    }

}
