/*!
Interfaces between the feature-allocation samplers and the model layer, plus the two
feature-allocation priors.

- [`FeatureParameters`]: a model's parameter bundle. It owns the allocation matrix and
  any feature-specific continuous parameters that must be resized when features are
  born or die.
- [`DataDistribution`]: the row log-likelihood the samplers target, with an optional
  collapsed variant.
- [`FeatureAllocationPrior`]: per-column inclusion probabilities, the singleton birth
  rate of a nonparametric prior, and draws of an initial allocation.

# Examples

```rust
use pgfa::distributions::{FeatureAllocationPrior, Ibp};
use pgfa::feature_matrix::FeatureAllocationMatrix;

let ibp = Ibp::new(2.0).unwrap();
let z = FeatureAllocationMatrix::from_rows(&[vec![1, 1], vec![1, 0], vec![0, 0]]).unwrap();

// Probabilities for row 2 are the column counts of the other rows over N.
let probs = ibp.feature_probs(&z, 2);
assert_eq!(probs, vec![2.0 / 3.0, 1.0 / 3.0]);
assert_eq!(ibp.singleton_rate(3), Some(2.0 / 3.0));
```
*/

use ndarray::Array2;
use rand::Rng;
use rand_distr::{Bernoulli, Beta, Distribution, Poisson};

use crate::error::{ConfigError, SamplerError};
use crate::feature_matrix::FeatureAllocationMatrix;

/// How the continuous parameters of newly created features are initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureInit {
    /// Drawn from the model's prior.
    Prior,
    /// Set to zero; used when the likelihood integrates them out.
    Zero,
}

/// A model's parameter bundle as seen by the feature-allocation samplers.
pub trait FeatureParameters: Clone {
    /// The current allocation matrix.
    fn feature_matrix(&self) -> &FeatureAllocationMatrix;

    /// Mutable access to the allocation matrix. Samplers only change entries through
    /// this; resizing goes through [`FeatureParameters::resize_features`].
    fn feature_matrix_mut(&mut self) -> &mut FeatureAllocationMatrix;

    /// Number of feature-specific parameter blocks currently held. Must equal the
    /// number of columns of the allocation matrix.
    fn num_feature_params(&self) -> usize;

    /// Rebuilds the feature-specific parameter blocks: the blocks of the `keep`
    /// features, in that order, followed by `num_new` fresh blocks initialized
    /// according to `init`. The allocation matrix itself is replaced by the caller.
    fn resize_features<R: Rng + ?Sized>(
        &mut self,
        keep: &[usize],
        num_new: usize,
        init: FeatureInit,
        rng: &mut R,
    );
}

/// The data likelihood of a latent feature model.
///
/// Missing observations are encoded as NaN in the data matrix and contribute zero to
/// every log-likelihood.
pub trait DataDistribution<P: FeatureParameters> {
    /// Log-likelihood of the observations tied to `row_idx` given all parameters.
    fn log_p_row(&self, data: &Array2<f64>, params: &P, row_idx: usize) -> f64;

    /// Like [`DataDistribution::log_p_row`] but with the continuous feature parameters
    /// integrated out. Only collapsed singleton moves call this.
    fn log_p_row_collapsed(
        &self,
        _data: &Array2<f64>,
        _params: &P,
        _row_idx: usize,
    ) -> Result<f64, SamplerError> {
        Err(SamplerError::CollapsedLikelihoodUnavailable)
    }

    /// Log-likelihood of the whole data set.
    fn log_p(&self, data: &Array2<f64>, params: &P) -> f64 {
        (0..params.feature_matrix().num_rows())
            .map(|row_idx| self.log_p_row(data, params, row_idx))
            .sum()
    }
}

/// A prior over feature-allocation matrices.
pub trait FeatureAllocationPrior {
    /// Probability that each column is active in `row_idx`, conditional on the other
    /// rows. One entry per column of `z`.
    fn feature_probs(&self, z: &FeatureAllocationMatrix, row_idx: usize) -> Vec<f64>;

    /// Poisson rate of new singleton features for a matrix with `num_rows` rows, or
    /// `None` for a prior with a fixed number of features.
    fn singleton_rate(&self, num_rows: usize) -> Option<f64>;

    /// Draws an allocation matrix with `num_rows` rows from the prior.
    fn sample<R: Rng + ?Sized>(
        &self,
        num_rows: usize,
        rng: &mut R,
    ) -> Result<FeatureAllocationMatrix, SamplerError>;

    fn is_nonparametric(&self) -> bool {
        self.singleton_rate(1).is_some()
    }
}

/**
Indian Buffet Process with mass parameter `alpha`.

Row `i` joins an existing feature `k` with probability `m_{-i,k} / N` and receives
`Poisson(alpha / N)` new features of its own.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ibp {
    pub alpha: f64,
}

impl Ibp {
    pub fn new(alpha: f64) -> Result<Self, ConfigError> {
        if !(alpha.is_finite() && alpha > 0.0) {
            return Err(ConfigError::InvalidPrior(format!(
                "IBP mass parameter must be positive and finite, got {alpha}"
            )));
        }
        Ok(Self { alpha })
    }
}

impl FeatureAllocationPrior for Ibp {
    fn feature_probs(&self, z: &FeatureAllocationMatrix, row_idx: usize) -> Vec<f64> {
        let n = z.num_rows() as f64;
        z.column_counts_excluding(row_idx)
            .into_iter()
            .map(|m| m as f64 / n)
            .collect()
    }

    fn singleton_rate(&self, num_rows: usize) -> Option<f64> {
        Some(self.alpha / num_rows as f64)
    }

    /// The sequential "restaurant" construction: customer `i` takes each existing dish
    /// with probability `m_k / i` and then `Poisson(alpha / i)` new dishes.
    fn sample<R: Rng + ?Sized>(
        &self,
        num_rows: usize,
        rng: &mut R,
    ) -> Result<FeatureAllocationMatrix, SamplerError> {
        let mut rows: Vec<Vec<u8>> = Vec::with_capacity(num_rows);
        let mut counts: Vec<usize> = Vec::new();
        for i in 1..=num_rows {
            let mut row: Vec<u8> = counts
                .iter()
                .map(|&m| u8::from(rng.gen::<f64>() < m as f64 / i as f64))
                .collect();
            for (m, &v) in counts.iter_mut().zip(row.iter()) {
                *m += v as usize;
            }
            let poisson = Poisson::new(self.alpha / i as f64)
                .map_err(|err| ConfigError::InvalidPrior(err.to_string()))?;
            let num_new = poisson.sample(rng) as usize;
            row.extend(std::iter::repeat(1).take(num_new));
            counts.extend(std::iter::repeat(1).take(num_new));
            rows.push(row);
        }

        let num_features = counts.len();
        let mut z = Array2::zeros((num_rows, num_features));
        for (i, row) in rows.iter().enumerate() {
            for (k, &v) in row.iter().enumerate() {
                z[(i, k)] = v;
            }
        }
        FeatureAllocationMatrix::from_array(z)
    }
}

/**
Finite Beta-Bernoulli prior: `pi_k ~ Beta(a, b)` and `z_ik ~ Bernoulli(pi_k)` for a fixed
number of features.

Integrating out `pi_k`, row `i` is active in column `k` with probability
`(m_{-i,k} + a) / (N - 1 + a + b)`.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaBernoulli {
    pub a: f64,
    pub b: f64,
    pub num_features: usize,
}

impl BetaBernoulli {
    pub fn new(a: f64, b: f64, num_features: usize) -> Result<Self, ConfigError> {
        if !(a.is_finite() && a > 0.0 && b.is_finite() && b > 0.0) {
            return Err(ConfigError::InvalidPrior(format!(
                "Beta-Bernoulli parameters must be positive and finite, got a = {a}, b = {b}"
            )));
        }
        Ok(Self { a, b, num_features })
    }
}

impl FeatureAllocationPrior for BetaBernoulli {
    fn feature_probs(&self, z: &FeatureAllocationMatrix, row_idx: usize) -> Vec<f64> {
        let denom = (z.num_rows() as f64 - 1.0) + self.a + self.b;
        z.column_counts_excluding(row_idx)
            .into_iter()
            .map(|m| (m as f64 + self.a) / denom)
            .collect()
    }

    fn singleton_rate(&self, _num_rows: usize) -> Option<f64> {
        None
    }

    fn sample<R: Rng + ?Sized>(
        &self,
        num_rows: usize,
        rng: &mut R,
    ) -> Result<FeatureAllocationMatrix, SamplerError> {
        let beta =
            Beta::new(self.a, self.b).map_err(|err| ConfigError::InvalidPrior(err.to_string()))?;
        let mut z = Array2::zeros((num_rows, self.num_features));
        for k in 0..self.num_features {
            let pi: f64 = beta.sample(rng);
            let bern = Bernoulli::new(pi.clamp(0.0, 1.0))
                .map_err(|err| ConfigError::InvalidPrior(err.to_string()))?;
            for i in 0..num_rows {
                z[(i, k)] = u8::from(bern.sample(rng));
            }
        }
        FeatureAllocationMatrix::from_array(z)
    }
}
