//! Delay draws and coverage gating shared by the deferred-effect
//! processes.

use vitalis_population::{SamplingError, SimRng};
use vitalis_types::{AgentIndex, DelayDistribution};

/// Shape of the gamma delay distribution (coefficient of variation 0.5).
pub const GAMMA_SHAPE: f64 = 4.0;

/// Smallest delay ever returned, in ticks.
pub const MIN_DELAY: f64 = 1.0;

/// Draws per-agent delays from a configured distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelaySampler {
    distribution: DelayDistribution,
    mean: f64,
}

impl DelaySampler {
    /// Build a sampler with the given distribution and mean (in ticks).
    ///
    /// # Errors
    ///
    /// Returns [`SamplingError::InvalidParameter`] unless `mean` is finite
    /// and positive.
    pub fn new(distribution: DelayDistribution, mean: f64) -> Result<Self, SamplingError> {
        if !mean.is_finite() || mean <= 0.0 {
            return Err(SamplingError::InvalidParameter {
                distribution: "delay",
                reason: format!("mean must be finite and positive, got {mean}"),
            });
        }
        Ok(Self { distribution, mean })
    }

    /// The configured distribution.
    pub const fn distribution(&self) -> DelayDistribution {
        self.distribution
    }

    /// The configured mean.
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// One delay draw, floored at [`MIN_DELAY`].
    pub fn sample(&self, rng: &SimRng) -> Result<f64, SamplingError> {
        let draw = match self.distribution {
            DelayDistribution::Gamma => rng.gamma(GAMMA_SHAPE, self.mean / GAMMA_SHAPE)?,
            DelayDistribution::Exponential => rng.exponential(self.mean)?,
        };
        Ok(draw.max(MIN_DELAY))
    }

    /// One delay draw as a whole-tick offset, `floor(draw)`. Always at
    /// least 1.
    pub fn offset_ticks(&self, rng: &SimRng) -> Result<u64, SamplingError> {
        let draw = self.sample(rng)?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ticks = draw.floor() as u64;
        Ok(ticks.max(1))
    }
}

/// Apply a coverage gate to `indices`.
///
/// Coverage at or above 1 keeps everyone. Otherwise `round(n × coverage)`
/// distinct agents are picked uniformly at random without replacement.
pub fn select_covered(
    indices: &[AgentIndex],
    coverage: f64,
    rng: &SimRng,
) -> Result<Vec<AgentIndex>, SamplingError> {
    if coverage >= 1.0 {
        return Ok(indices.to_vec());
    }
    if coverage <= 0.0 || indices.is_empty() {
        return Ok(Vec::new());
    }
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let amount = ((indices.len() as f64) * coverage).round() as usize;
    rng.choose_without_replacement(indices, amount.min(indices.len()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn draws_are_floored_at_one() {
        let rng = SimRng::seeded(11);
        let sampler = DelaySampler::new(DelayDistribution::Exponential, 1.0).unwrap();
        for _ in 0..1_000 {
            assert!(sampler.sample(&rng).unwrap() >= MIN_DELAY);
            assert!(sampler.offset_ticks(&rng).unwrap() >= 1);
        }
    }

    #[test]
    fn gamma_mean_matches_configuration() {
        let rng = SimRng::seeded(12);
        let sampler = DelaySampler::new(DelayDistribution::Gamma, 180.0).unwrap();
        let n = 20_000_u32;
        let total: f64 = (0..n).map(|_| sampler.sample(&rng).unwrap()).sum();
        let mean = total / f64::from(n);
        assert!((mean - 180.0).abs() < 3.0, "mean {mean}");
    }

    #[test]
    fn non_positive_mean_is_rejected() {
        assert!(DelaySampler::new(DelayDistribution::Gamma, 0.0).is_err());
        assert!(DelaySampler::new(DelayDistribution::Exponential, f64::NAN).is_err());
    }

    #[test]
    fn full_coverage_keeps_everyone_in_order() {
        let rng = SimRng::seeded(1);
        let idx: Vec<AgentIndex> = (0..10).map(AgentIndex).collect();
        assert_eq!(select_covered(&idx, 1.0, &rng).unwrap(), idx);
        assert!(select_covered(&idx, 0.0, &rng).unwrap().is_empty());
    }

    #[test]
    fn partial_coverage_rounds() {
        let rng = SimRng::seeded(2);
        let idx: Vec<AgentIndex> = (0..10).map(AgentIndex).collect();
        let picked = select_covered(&idx, 0.25, &rng).unwrap();
        // round(2.5) rounds half away from zero.
        assert_eq!(picked.len(), 3);
        let unique: HashSet<AgentIndex> = picked.iter().copied().collect();
        assert_eq!(unique.len(), 3);
        assert!(picked.iter().all(|i| idx.contains(i)));

        let small = [AgentIndex(0)];
        assert!(select_covered(&small, 0.4, &rng).unwrap().is_empty());
    }
}
