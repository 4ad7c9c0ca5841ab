//! Shared seeded random source.
//!
//! One [`SimRng`] is created per run and cloned into every process that
//! draws; all clones advance the same generator, so a run is reproducible
//! from its seed as long as processes execute in a fixed order.

use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Gamma, Poisson};

use crate::error::SamplingError;

/// Cloneable handle to the run's single random generator.
#[derive(Debug, Clone)]
pub struct SimRng {
    inner: Rc<RefCell<StdRng>>,
}

impl SimRng {
    /// Create a generator from `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Draw a Poisson count with mean `lambda`.
    ///
    /// A mean of zero always yields zero.
    pub fn poisson(&self, lambda: f64) -> Result<u64, SamplingError> {
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(SamplingError::InvalidParameter {
                distribution: "poisson",
                reason: format!("mean must be finite and non-negative, got {lambda}"),
            });
        }
        if lambda <= 0.0 {
            return Ok(0);
        }
        let dist = Poisson::new(lambda).map_err(|err| SamplingError::InvalidParameter {
            distribution: "poisson",
            reason: err.to_string(),
        })?;
        let draw: f64 = dist.sample(&mut *self.inner.borrow_mut());
        // Poisson draws are non-negative integers carried in an f64.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = draw.max(0.0) as u64;
        Ok(count)
    }

    /// Draw from a gamma distribution with the given shape and scale.
    pub fn gamma(&self, shape: f64, scale: f64) -> Result<f64, SamplingError> {
        let dist = Gamma::new(shape, scale).map_err(|err| SamplingError::InvalidParameter {
            distribution: "gamma",
            reason: err.to_string(),
        })?;
        Ok(dist.sample(&mut *self.inner.borrow_mut()))
    }

    /// Draw from an exponential distribution with the given mean.
    pub fn exponential(&self, mean: f64) -> Result<f64, SamplingError> {
        if !mean.is_finite() || mean <= 0.0 {
            return Err(SamplingError::InvalidParameter {
                distribution: "exponential",
                reason: format!("mean must be finite and positive, got {mean}"),
            });
        }
        let dist = Exp::new(mean.recip()).map_err(|err| SamplingError::InvalidParameter {
            distribution: "exponential",
            reason: err.to_string(),
        })?;
        Ok(dist.sample(&mut *self.inner.borrow_mut()))
    }

    /// Uniform draw in `[0, 1)`.
    pub fn uniform(&self) -> f64 {
        self.inner.borrow_mut().random::<f64>()
    }

    /// A single trial succeeding with probability `p` (clamped to `[0, 1]`).
    pub fn bernoulli(&self, p: f64) -> bool {
        self.uniform() < p.clamp(0.0, 1.0)
    }

    /// Pick `amount` distinct elements of `items` uniformly at random.
    pub fn choose_without_replacement<T: Copy>(
        &self,
        items: &[T],
        amount: usize,
    ) -> Result<Vec<T>, SamplingError> {
        if amount > items.len() {
            return Err(SamplingError::NotEnoughElements {
                amount,
                len: items.len(),
            });
        }
        let picked = rand::seq::index::sample(&mut *self.inner.borrow_mut(), items.len(), amount);
        Ok(picked.iter().filter_map(|i| items.get(i).copied()).collect())
    }
}
