/*!
# Feature-allocation updates

One sweep of [`FeatureMatrixUpdater::update`] visits every row of the allocation matrix
in index order and, for each row,

1. optionally proposes a new set of singleton features for the row
   ([`SingletonsUpdater`]), then
2. resamples the row's entries in the columns other rows also use with one of the
   [`RowSampler`] strategies.

## Row samplers

- [`RowSampler::Gibbs`]: one column at a time, conditional on the rest of the row.
- [`RowSampler::RowGibbs`]: exact joint draw by enumerating all `2^m` configurations.
- [`RowSampler::ParticleGibbs`]: conditional sequential Monte Carlo over the columns,
  an approximation of the joint draw that scales to many columns.
- [`RowSampler::Mixture`]: a fair coin picks one of two samplers for every row update.

Under a finite prior there are no singleton moves and every column is resampled.

## Example

```rust
use pgfa::updates::{FeatureMatrixUpdater, ParticleGibbsConfig, RowSampler, SingletonsUpdater};

let sampler: RowSampler = "mixture[row_gibbs, particle_gibbs]".parse().unwrap();
let updater = FeatureMatrixUpdater::new(sampler, Some(SingletonsUpdater::Prior)).unwrap();
assert_eq!(updater.sampler().to_string(), "mixture[row_gibbs, particle_gibbs]");

// Zero particles is rejected when the updater is built.
let bad = RowSampler::ParticleGibbs(ParticleGibbsConfig {
    num_particles: 0,
    ..Default::default()
});
assert!(FeatureMatrixUpdater::new(bad, None).is_err());
```
*/

pub mod gibbs;
pub mod particle_gibbs;
pub mod row_gibbs;
pub mod singletons;

use std::{fmt, str::FromStr};

use log::{debug, trace};
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::distributions::{DataDistribution, FeatureAllocationPrior, FeatureParameters};
use crate::error::{ConfigError, SamplerError};

pub use particle_gibbs::ParticleGibbsConfig;
pub use singletons::{SingletonMove, SingletonsUpdater};

/// Largest number of columns [`RowSampler::RowGibbs`] will enumerate.
pub const MAX_ROW_GIBBS_COLUMNS: usize = 20;

/// Strategy used to resample the shared columns of one row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSampler {
    /// Single-site Gibbs
    Gibbs,
    /// Exhaustive enumeration of the row's configurations.
    ///
    /// The column count is only known per row, so more than [`MAX_ROW_GIBBS_COLUMNS`]
    /// columns fails with [`ConfigError::TooManyRowGibbsColumns`] during the sweep. Under
    /// a nonparametric prior a chain stops once a row shares more features than that.
    RowGibbs,
    /// Conditional sequential Monte Carlo
    ParticleGibbs(ParticleGibbsConfig),
    /// Uniform random choice between two samplers on every row update
    Mixture(Box<RowSampler>, Box<RowSampler>),
}

impl RowSampler {
    pub fn mixture(a: RowSampler, b: RowSampler) -> Self {
        Self::Mixture(Box::new(a), Box::new(b))
    }

    /// Checks the configuration, recursing into mixtures.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Gibbs | Self::RowGibbs => Ok(()),
            Self::ParticleGibbs(config) => config.validate(),
            Self::Mixture(a, b) => {
                a.validate()?;
                b.validate()
            }
        }
    }

    /**
    Resamples the entries of `row_idx` in `cols`.

    `feat_probs` holds one prior inclusion probability per column of the allocation
    matrix; only the entries of `cols` are read and they must lie in `(0, 1)`. On error
    the row is restored to the values it had on entry.
    */
    #[allow(clippy::too_many_arguments)]
    pub fn update_row<P, D, R>(
        &self,
        cols: &[usize],
        data: &Array2<f64>,
        dist: &D,
        feat_probs: &[f64],
        params: &mut P,
        row_idx: usize,
        rng: &mut R,
    ) -> Result<(), SamplerError>
    where
        P: FeatureParameters,
        D: DataDistribution<P>,
        R: Rng + ?Sized,
    {
        let z = params.feature_matrix();
        z.check_row(row_idx)?;
        z.check_columns(cols)?;
        if feat_probs.len() != z.num_features() {
            return Err(SamplerError::DimensionMismatch {
                what: "feature probabilities",
                expected: z.num_features(),
                found: feat_probs.len(),
            });
        }

        let snapshot = z.row_values(row_idx, cols);
        let res = self.update_row_unchecked(cols, data, dist, feat_probs, params, row_idx, rng);
        if res.is_err() {
            params
                .feature_matrix_mut()
                .set_row_values(row_idx, cols, &snapshot);
        }
        res
    }

    #[allow(clippy::too_many_arguments)]
    fn update_row_unchecked<P, D, R>(
        &self,
        cols: &[usize],
        data: &Array2<f64>,
        dist: &D,
        feat_probs: &[f64],
        params: &mut P,
        row_idx: usize,
        rng: &mut R,
    ) -> Result<(), SamplerError>
    where
        P: FeatureParameters,
        D: DataDistribution<P>,
        R: Rng + ?Sized,
    {
        match self {
            Self::Gibbs => {
                gibbs::do_gibbs_update(cols, data, dist, feat_probs, params, row_idx, rng)
            }
            Self::RowGibbs => {
                row_gibbs::do_row_gibbs_update(cols, data, dist, feat_probs, params, row_idx, rng)
            }
            Self::ParticleGibbs(config) => particle_gibbs::do_particle_gibbs_update(
                config, cols, data, dist, feat_probs, params, row_idx, rng,
            ),
            Self::Mixture(a, b) => {
                let chosen = if rng.gen::<bool>() { a } else { b };
                chosen.update_row_unchecked(cols, data, dist, feat_probs, params, row_idx, rng)
            }
        }
    }
}

impl fmt::Display for RowSampler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Gibbs => write!(f, "gibbs"),
            Self::RowGibbs => write!(f, "row_gibbs"),
            Self::ParticleGibbs(config) if config.annealed => write!(f, "annealed_particle_gibbs"),
            Self::ParticleGibbs(_) => write!(f, "particle_gibbs"),
            Self::Mixture(a, b) => write!(f, "mixture[{a}, {b}]"),
        }
    }
}

// The string form only names the strategy; particle settings take their defaults.
impl FromStr for RowSampler {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "gibbs" => Ok(Self::Gibbs),
            "row_gibbs" => Ok(Self::RowGibbs),
            "particle_gibbs" => Ok(Self::ParticleGibbs(ParticleGibbsConfig::default())),
            "annealed_particle_gibbs" => Ok(Self::ParticleGibbs(ParticleGibbsConfig {
                annealed: true,
                ..Default::default()
            })),
            name if name.starts_with("mixture[") && name.ends_with(']') => {
                let inner = &name["mixture[".len()..name.len() - 1];
                let (a, b) = split_top_level(inner)
                    .ok_or_else(|| ConfigError::UnknownSampler(s.to_string()))?;
                Ok(Self::mixture(a.parse()?, b.parse()?))
            }
            _ => Err(ConfigError::UnknownSampler(s.to_string())),
        }
    }
}

/// Splits `a, b` at the single comma that is not nested in brackets.
fn split_top_level(s: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    let mut split = None;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                if split.is_some() {
                    return None;
                }
                split = Some(i);
            }
            _ => (),
        }
    }
    split.map(|i| (&s[..i], &s[i + 1..]))
}

/// Per-sweep counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub num_rows: usize,
    pub features_before: usize,
    pub features_after: usize,
    pub singletons_accepted: usize,
    pub singletons_rejected: usize,
    pub singletons_skipped: usize,
}

impl SweepStats {
    fn record(&mut self, singleton_move: SingletonMove) {
        match singleton_move {
            SingletonMove::Skipped => self.singletons_skipped += 1,
            SingletonMove::Accepted { .. } => self.singletons_accepted += 1,
            SingletonMove::Rejected { .. } => self.singletons_rejected += 1,
        }
    }
}

/// A validated sweep configuration: the row sampler and the optional singleton move.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrixUpdater {
    sampler: RowSampler,
    singletons: Option<SingletonsUpdater>,
}

impl FeatureMatrixUpdater {
    pub fn new(
        sampler: RowSampler,
        singletons: Option<SingletonsUpdater>,
    ) -> Result<Self, ConfigError> {
        sampler.validate()?;
        Ok(Self {
            sampler,
            singletons,
        })
    }

    pub fn sampler(&self) -> &RowSampler {
        &self.sampler
    }

    pub fn singletons(&self) -> Option<SingletonsUpdater> {
        self.singletons
    }

    /**
    Performs one sweep over all rows of the allocation matrix held by `params`.

    Rows are visited in index order. A failing row aborts the sweep; rows visited
    before it keep their new values.
    */
    pub fn update<P, D, A, R>(
        &self,
        data: &Array2<f64>,
        dist: &D,
        prior: &A,
        params: &mut P,
        rng: &mut R,
    ) -> Result<SweepStats, SamplerError>
    where
        P: FeatureParameters,
        D: DataDistribution<P>,
        A: FeatureAllocationPrior,
        R: Rng + ?Sized,
    {
        let nonparametric = prior.is_nonparametric();
        if self.singletons.is_some() && !nonparametric {
            return Err(ConfigError::SingletonsRequireNonparametricPrior.into());
        }

        let num_rows = params.feature_matrix().num_rows();
        if data.nrows() != num_rows {
            return Err(SamplerError::DimensionMismatch {
                what: "data rows",
                expected: num_rows,
                found: data.nrows(),
            });
        }

        let mut stats = SweepStats {
            num_rows,
            features_before: params.feature_matrix().num_features(),
            ..Default::default()
        };

        for row_idx in 0..num_rows {
            if let Some(singletons) = self.singletons {
                let singleton_move = singletons.update_row(data, dist, prior, params, row_idx, rng)?;
                trace!("row {row_idx}: singleton move {singleton_move:?}");
                stats.record(singleton_move);
            }

            let z = params.feature_matrix();
            let cols: Vec<usize> = if nonparametric {
                z.non_singleton_idxs(row_idx)
            } else {
                (0..z.num_features()).collect()
            };
            let feat_probs = prior.feature_probs(z, row_idx);
            self.sampler
                .update_row(&cols, data, dist, &feat_probs, params, row_idx, rng)?;
        }

        stats.features_after = params.feature_matrix().num_features();
        debug!(
            "sweep with {}: K {} -> {}, singleton moves accepted {} rejected {} skipped {}",
            self.sampler,
            stats.features_before,
            stats.features_after,
            stats.singletons_accepted,
            stats.singletons_rejected,
            stats.singletons_skipped
        );
        Ok(stats)
    }
}

/// Log prior terms `ln p_k` and `ln(1 - p_k)` for each listed column, in list order.
pub(crate) fn log_feature_probs(
    feat_probs: &[f64],
    cols: &[usize],
) -> Result<(Vec<f64>, Vec<f64>), SamplerError> {
    let mut log_on = Vec::with_capacity(cols.len());
    let mut log_off = Vec::with_capacity(cols.len());
    for &col_idx in cols {
        let prob = feat_probs[col_idx];
        if !(prob > 0.0 && prob < 1.0) {
            return Err(SamplerError::InvalidFeatureProbability { col_idx, prob });
        }
        log_on.push(prob.ln());
        log_off.push((-prob).ln_1p());
    }
    Ok((log_on, log_off))
}

#[cfg(test)]
pub(crate) mod test_utils {
    use ndarray::Array2;
    use rand::Rng;

    use crate::distributions::{DataDistribution, FeatureInit, FeatureParameters};
    use crate::feature_matrix::FeatureAllocationMatrix;

    /// Parameters that are nothing but an allocation matrix plus one scalar weight per
    /// feature.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ToyParams {
        pub z: FeatureAllocationMatrix,
        pub weights: Vec<f64>,
    }

    impl ToyParams {
        pub fn new(z: FeatureAllocationMatrix) -> Self {
            let weights = vec![1.0; z.num_features()];
            Self { z, weights }
        }
    }

    impl FeatureParameters for ToyParams {
        fn feature_matrix(&self) -> &FeatureAllocationMatrix {
            &self.z
        }

        fn feature_matrix_mut(&mut self) -> &mut FeatureAllocationMatrix {
            &mut self.z
        }

        fn num_feature_params(&self) -> usize {
            self.weights.len()
        }

        fn resize_features<R: Rng + ?Sized>(
            &mut self,
            keep: &[usize],
            num_new: usize,
            init: FeatureInit,
            rng: &mut R,
        ) {
            let mut weights: Vec<f64> = keep.iter().map(|&k| self.weights[k]).collect();
            for _ in 0..num_new {
                weights.push(match init {
                    FeatureInit::Prior => rng.gen::<f64>(),
                    FeatureInit::Zero => 0.0,
                });
            }
            self.weights = weights;
        }
    }

    /// Row log-likelihood `-0.5 * (x_i0 - sum_k z_ik w_k)^2`: the first data column is
    /// explained by the sum of the active weights.
    #[derive(Debug, Clone, Copy)]
    pub struct SumLikelihood;

    impl DataDistribution<ToyParams> for SumLikelihood {
        fn log_p_row(&self, data: &Array2<f64>, params: &ToyParams, row_idx: usize) -> f64 {
            let mean: f64 = params
                .z
                .row(row_idx)
                .iter()
                .zip(params.weights.iter())
                .map(|(&z, &w)| z as f64 * w)
                .sum();
            -0.5 * (data[(row_idx, 0)] - mean).powi(2)
        }
    }

    /// A likelihood that ignores the data.
    #[derive(Debug, Clone, Copy)]
    pub struct FlatLikelihood;

    impl DataDistribution<ToyParams> for FlatLikelihood {
        fn log_p_row(&self, _data: &Array2<f64>, _params: &ToyParams, _row_idx: usize) -> f64 {
            0.0
        }
    }

    /// Exact conditional distribution over the `2^m` configurations of `cols` in row
    /// `row_idx`, in the enumeration order of the row Gibbs sampler.
    pub fn exact_conditional<D: DataDistribution<ToyParams>>(
        cols: &[usize],
        data: &Array2<f64>,
        dist: &D,
        feat_probs: &[f64],
        params: &ToyParams,
        row_idx: usize,
    ) -> Vec<f64> {
        let m = cols.len();
        let mut params = params.clone();
        let log_p: Vec<f64> = (0..1usize << m)
            .map(|c| {
                let mut lp = 0.0;
                for (j, &k) in cols.iter().enumerate() {
                    let v = ((c >> (m - 1 - j)) & 1) as u8;
                    params.z.set(row_idx, k, v);
                    lp += if v == 1 {
                        feat_probs[k].ln()
                    } else {
                        (1.0 - feat_probs[k]).ln()
                    };
                }
                lp + dist.log_p_row(data, &params, row_idx)
            })
            .collect();
        let lse = crate::math::log_sum_exp(&log_p);
        log_p.iter().map(|x| (x - lse).exp()).collect()
    }

    /// Index of the configuration of `cols` in row `row_idx`.
    pub fn config_index(z: &FeatureAllocationMatrix, row_idx: usize, cols: &[usize]) -> usize {
        cols.iter()
            .fold(0, |acc, &k| (acc << 1) | z.get(row_idx, k) as usize)
    }
}
