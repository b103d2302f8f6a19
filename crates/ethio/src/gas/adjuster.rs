use std::collections::VecDeque;

use cairn_config::GasConfig;
use tracing::*;

/// Rolling estimator for an acceptable gas price.
///
/// Samples accumulate in a time-bounded window (tolerates variable sampling
/// intervals); each update tick moves the live estimate toward the window
/// maximum by at most `scale_factor`, clamped to `[floor, ceiling]`. With no
/// samples recorded the estimate sits at the floor.
#[derive(Debug)]
pub struct GasPriceAdjuster {
    config: GasConfig,
    /// (recorded_at unix millis, observed price) pairs, oldest first.
    samples: VecDeque<(u64, u64)>,
    estimate: u64,
}

impl GasPriceAdjuster {
    pub fn new(config: GasConfig) -> Self {
        let estimate = config.floor.min(config.ceiling);
        Self {
            config,
            samples: VecDeque::new(),
            estimate,
        }
    }

    /// The price to use for the next submission. Never blocks.
    pub fn current_estimate(&self) -> u64 {
        self.estimate
    }

    /// Records one observed network price.
    pub fn sample(&mut self, price: u64, now: u64) {
        self.evict_stale(now);
        self.samples.push_back((now, price));
    }

    /// One scheduled update tick. Returns the (possibly unchanged) estimate.
    pub fn update(&mut self, now: u64) -> u64 {
        self.evict_stale(now);

        let Some(candidate) = self.samples.iter().map(|(_, price)| *price).max() else {
            return self.estimate;
        };

        let scaled_up = (self.estimate as f64 * self.config.scale_factor) as u64;
        let scaled_down = (self.estimate as f64 / self.config.scale_factor) as u64;
        let moved = candidate.clamp(scaled_down, scaled_up);
        let next = moved.clamp(self.config.floor, self.config.ceiling);

        if next != self.estimate {
            debug!(prev = %self.estimate, %next, %candidate, "gas estimate moved");
        }
        self.estimate = next;
        self.estimate
    }

    fn evict_stale(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.config.sample_window_ms);
        while let Some((recorded_at, _)) = self.samples.front() {
            if *recorded_at >= cutoff {
                break;
            }
            self.samples.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GasConfig {
        GasConfig {
            floor: 10,
            ceiling: 1000,
            scale_factor: 1.5,
            sample_interval_ms: 1_000,
            update_interval_ms: 1_000,
            sample_window_ms: 60_000,
        }
    }

    /// Walk the estimate up to a steady level via repeated ticks.
    fn settle_at(adjuster: &mut GasPriceAdjuster, price: u64, now: &mut u64) {
        loop {
            adjuster.sample(price, *now);
            let prev = adjuster.current_estimate();
            adjuster.update(*now);
            *now += 1_000;
            if adjuster.current_estimate() == prev {
                break;
            }
        }
    }

    #[test]
    fn test_no_samples_returns_floor() {
        let mut adjuster = GasPriceAdjuster::new(test_config());
        assert_eq!(adjuster.current_estimate(), 10);
        assert_eq!(adjuster.update(5_000), 10);
    }

    #[test]
    fn test_single_update_bounded_by_scale_factor() {
        let mut adjuster = GasPriceAdjuster::new(test_config());
        let mut now = 1_000;
        settle_at(&mut adjuster, 100, &mut now);
        assert_eq!(adjuster.current_estimate(), 100);

        // A burst implying 500 only moves the estimate to 100 * 1.5.
        adjuster.sample(500, now);
        assert_eq!(adjuster.update(now), 150);
    }

    #[test]
    fn test_estimate_decays_when_samples_drop() {
        let mut adjuster = GasPriceAdjuster::new(test_config());
        let mut now = 1_000;
        settle_at(&mut adjuster, 150, &mut now);
        assert_eq!(adjuster.current_estimate(), 150);

        adjuster.sample(40, now);
        // Old high samples are still inside the window, so nothing moves yet.
        assert_eq!(adjuster.update(now), 150);

        // Jump past the window so only the low sample's era remains.
        now += 120_000;
        adjuster.sample(40, now);
        assert_eq!(adjuster.update(now), 100, "one downward step of /1.5");
        assert_eq!(adjuster.update(now), 66);
    }

    #[test]
    fn test_estimate_clamped_to_bounds() {
        let mut adjuster = GasPriceAdjuster::new(test_config());
        let mut now = 1_000;
        settle_at(&mut adjuster, 5_000, &mut now);
        assert_eq!(adjuster.current_estimate(), 1000, "capped at ceiling");

        let mut adjuster = GasPriceAdjuster::new(test_config());
        adjuster.sample(1, 1_000);
        assert_eq!(adjuster.update(1_000), 10, "never below floor");
    }

    #[test]
    fn test_sampling_gap_keeps_previous_estimate() {
        let mut adjuster = GasPriceAdjuster::new(test_config());
        let mut now = 1_000;
        settle_at(&mut adjuster, 100, &mut now);

        // All samples age out and none arrive; the estimate must hold.
        now += 600_000;
        assert_eq!(adjuster.update(now), 100);
    }
}
