//! Delays inserted between page fetches and after identity rotation.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;

/// Points in a crawl where the orchestrator pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// Before every seed after the first.
    BetweenSeeds,
    /// Before every internal link.
    BetweenInternalLinks,
    /// After rotating identity ahead of a seed, so the new circuit can build.
    AfterRotationBeforeSeed,
    /// After rotating identity ahead of an internal link.
    AfterRotationBeforeInternal,
}

/// Decides how long to wait at each [`Pause`].
pub trait PacingPolicy: Send + Sync {
    fn delay(&self, pause: Pause) -> Duration;
}

/// Randomized human-scale pacing.
#[derive(Debug, Clone)]
pub struct RandomPacing {
    pub between_seeds: RangeInclusive<f64>,
    pub between_internal: RangeInclusive<f64>,
    pub rotation_seed: RangeInclusive<f64>,
    pub rotation_internal: RangeInclusive<f64>,
}

impl Default for RandomPacing {
    fn default() -> Self {
        Self {
            between_seeds: 2.0..=5.0,
            between_internal: 1.0..=3.0,
            rotation_seed: 3.0..=6.0,
            rotation_internal: 2.0..=4.0,
        }
    }
}

impl PacingPolicy for RandomPacing {
    fn delay(&self, pause: Pause) -> Duration {
        let range = match pause {
            Pause::BetweenSeeds => &self.between_seeds,
            Pause::BetweenInternalLinks => &self.between_internal,
            Pause::AfterRotationBeforeSeed => &self.rotation_seed,
            Pause::AfterRotationBeforeInternal => &self.rotation_internal,
        };
        if range.start() >= range.end() {
            return Duration::from_secs_f64(range.start().max(0.0));
        }
        Duration::from_secs_f64(rand::rng().random_range(range.clone()))
    }
}

/// No delays at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

impl PacingPolicy for NoPacing {
    fn delay(&self, _pause: Pause) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_pacing_ranges() {
        let pacing = RandomPacing::default();
        for _ in 0..50 {
            let d = pacing.delay(Pause::BetweenSeeds).as_secs_f64();
            assert!((2.0..=5.0).contains(&d));
            let d = pacing.delay(Pause::BetweenInternalLinks).as_secs_f64();
            assert!((1.0..=3.0).contains(&d));
            let d = pacing.delay(Pause::AfterRotationBeforeSeed).as_secs_f64();
            assert!((3.0..=6.0).contains(&d));
            let d = pacing.delay(Pause::AfterRotationBeforeInternal).as_secs_f64();
            assert!((2.0..=4.0).contains(&d));
        }
    }

    #[test]
    fn test_degenerate_range() {
        let pacing = RandomPacing {
            between_seeds: 1.5..=1.5,
            ..Default::default()
        };
        assert_eq!(pacing.delay(Pause::BetweenSeeds), Duration::from_secs_f64(1.5));
    }

    #[test]
    fn test_no_pacing() {
        assert_eq!(NoPacing.delay(Pause::AfterRotationBeforeSeed), Duration::ZERO);
    }
}
