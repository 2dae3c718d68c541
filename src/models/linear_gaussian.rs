/*!
Linear-Gaussian latent feature model.

Each observation is a sum of the loadings of its active features plus isotropic noise:

\[
x_i = z_i V + \varepsilon_i, \qquad
V_{kd} \sim \mathcal{N}(0, \tau_a^{-1}), \qquad
\varepsilon_{id} \sim \mathcal{N}(0, \tau_x^{-1}).
\]

Missing observations (NaN) are skipped by the row likelihood. The collapsed likelihood
integrates `V` out and needs a fully observed data matrix.

# Examples

```rust
use pgfa::distributions::{DataDistribution, Ibp};
use pgfa::models::linear_gaussian::{LinearGaussianLikelihood, LinearGaussianParams};
use rand::rngs::SmallRng;
use rand::SeedableRng;

let mut rng = SmallRng::seed_from_u64(42);
let prior = Ibp::new(2.0).unwrap();
let params = LinearGaussianParams::from_prior(&prior, 10, 3, 1.0, 4.0, &mut rng).unwrap();
let data = params.sample_data(&mut rng);

let log_p = LinearGaussianLikelihood.log_p(&data, &params);
let log_marginal = LinearGaussianLikelihood
    .log_p_row_collapsed(&data, &params, 0)
    .unwrap();
assert!(log_p.is_finite() && log_marginal.is_finite());
```
*/

use nalgebra::DMatrix;
use ndarray::Array2;
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

use crate::distributions::{
    DataDistribution, FeatureAllocationPrior, FeatureInit, FeatureParameters,
};
use crate::error::SamplerError;
use crate::feature_matrix::FeatureAllocationMatrix;
use crate::models::check_precision;

/// Parameters of the linear-Gaussian model.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearGaussianParams {
    /// Precision of the feature loadings.
    pub tau_a: f64,
    /// Precision of the observation noise.
    pub tau_x: f64,
    /// Feature loadings, one row per feature (`K x D`).
    pub v: Array2<f64>,
    pub z: FeatureAllocationMatrix,
}

impl LinearGaussianParams {
    pub fn new(
        tau_a: f64,
        tau_x: f64,
        v: Array2<f64>,
        z: FeatureAllocationMatrix,
    ) -> Result<Self, SamplerError> {
        check_precision("tau_a", tau_a)?;
        check_precision("tau_x", tau_x)?;
        if v.nrows() != z.num_features() {
            return Err(SamplerError::DimensionMismatch {
                what: "loading rows",
                expected: z.num_features(),
                found: v.nrows(),
            });
        }
        Ok(Self { tau_a, tau_x, v, z })
    }

    /// Draws the allocation from `prior` and the loadings from their prior.
    pub fn from_prior<A, R>(
        prior: &A,
        num_rows: usize,
        num_dims: usize,
        tau_a: f64,
        tau_x: f64,
        rng: &mut R,
    ) -> Result<Self, SamplerError>
    where
        A: FeatureAllocationPrior,
        R: Rng + ?Sized,
    {
        check_precision("tau_a", tau_a)?;
        let z = prior.sample(num_rows, rng)?;
        let sd = tau_a.sqrt().recip();
        let v = Array2::from_shape_simple_fn((z.num_features(), num_dims), || {
            sd * rng.sample::<f64, _>(StandardNormal)
        });
        Self::new(tau_a, tau_x, v, z)
    }

    pub fn num_dims(&self) -> usize {
        self.v.ncols()
    }

    /// Noise-free reconstruction `Z V`.
    pub fn mean(&self) -> Array2<f64> {
        self.z.to_f64().dot(&self.v)
    }

    /// Simulates a data matrix from the model.
    pub fn sample_data<R: Rng + ?Sized>(&self, rng: &mut R) -> Array2<f64> {
        let sd = self.tau_x.sqrt().recip();
        let mut x = self.mean();
        x.mapv_inplace(|m| m + sd * rng.sample::<f64, _>(StandardNormal));
        x
    }
}

impl FeatureParameters for LinearGaussianParams {
    fn feature_matrix(&self) -> &FeatureAllocationMatrix {
        &self.z
    }

    fn feature_matrix_mut(&mut self) -> &mut FeatureAllocationMatrix {
        &mut self.z
    }

    fn num_feature_params(&self) -> usize {
        self.v.nrows()
    }

    fn resize_features<R: Rng + ?Sized>(
        &mut self,
        keep: &[usize],
        num_new: usize,
        init: FeatureInit,
        rng: &mut R,
    ) {
        let num_dims = self.num_dims();
        let mut v = Array2::zeros((keep.len() + num_new, num_dims));
        for (new_k, &old_k) in keep.iter().enumerate() {
            v.row_mut(new_k).assign(&self.v.row(old_k));
        }
        if init == FeatureInit::Prior {
            let sd = self.tau_a.sqrt().recip();
            for k in keep.len()..keep.len() + num_new {
                for d in 0..num_dims {
                    v[(k, d)] = sd * rng.sample::<f64, _>(StandardNormal);
                }
            }
        }
        self.v = v;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearGaussianLikelihood;

impl DataDistribution<LinearGaussianParams> for LinearGaussianLikelihood {
    fn log_p_row(&self, data: &Array2<f64>, params: &LinearGaussianParams, row_idx: usize) -> f64 {
        let tau_x = params.tau_x;
        let z = params.z.row(row_idx);
        let mut log_p = 0.0;
        let mut num_observed = 0;
        for (d, &x) in data.row(row_idx).iter().enumerate() {
            if x.is_nan() {
                continue;
            }
            let m: f64 = z
                .iter()
                .enumerate()
                .filter(|(_, z_k)| **z_k == 1)
                .map(|(k, _)| params.v[(k, d)])
                .sum();
            log_p -= 0.5 * tau_x * (x - m).powi(2);
            num_observed += 1;
        }
        log_p + 0.5 * num_observed as f64 * (tau_x.ln() - (2.0 * PI).ln())
    }

    /**
    Log marginal likelihood of the whole data matrix with the loadings integrated out:

    \[
    \log p(X \mid Z) = -\tfrac{ND}{2} \log 2\pi + \tfrac{(N - K) D}{2} \log \tau_x
        + \tfrac{KD}{2} \log \tau_a - \tfrac{D}{2} \log |M|
        - \tfrac{\tau_x}{2} \operatorname{tr}\left(X^\top X - X^\top Z M^{-1} Z^\top X\right),
    \]

    with `M = Z^T Z + (tau_a / tau_x) I`. Rows other than `row_idx` depend on row
    `row_idx` through `M`, so the full marginal is the row target.
    */
    fn log_p_row_collapsed(
        &self,
        data: &Array2<f64>,
        params: &LinearGaussianParams,
        _row_idx: usize,
    ) -> Result<f64, SamplerError> {
        if let Some(((missing_row, _), _)) = data.indexed_iter().find(|(_, x)| x.is_nan()) {
            return Err(SamplerError::MissingData(missing_row));
        }
        let (num_rows, num_dims) = data.dim();
        if num_rows != params.z.num_rows() {
            return Err(SamplerError::DimensionMismatch {
                what: "data rows",
                expected: params.z.num_rows(),
                found: num_rows,
            });
        }
        let num_features = params.z.num_features();
        let (n, d, k) = (num_rows as f64, num_dims as f64, num_features as f64);
        let (tau_a, tau_x) = (params.tau_a, params.tau_x);

        let trace_xtx: f64 = data.iter().map(|x| x * x).sum();
        let mut log_p = -0.5 * n * d * (2.0 * PI).ln() + 0.5 * (n - k) * d * tau_x.ln()
            + 0.5 * k * d * tau_a.ln();
        if num_features == 0 {
            return Ok(log_p - 0.5 * tau_x * trace_xtx);
        }

        let z = DMatrix::from_fn(num_rows, num_features, |i, j| {
            f64::from(params.z.get(i, j))
        });
        let x = DMatrix::from_fn(num_rows, num_dims, |i, j| data[(i, j)]);
        let m = z.transpose() * &z
            + DMatrix::identity(num_features, num_features) * (tau_a / tau_x);
        let chol = m.cholesky().ok_or_else(|| {
            SamplerError::NumericalDegeneracy(
                "Z^T Z + (tau_a / tau_x) I is not positive definite".to_string(),
            )
        })?;
        let log_det_m = 2.0 * chol.l().diagonal().iter().map(|l| l.ln()).sum::<f64>();
        let ztx = z.transpose() * &x;
        let m_inv_ztx = chol.solve(&ztx);
        let explained = ztx.component_mul(&m_inv_ztx).sum();

        log_p -= 0.5 * d * log_det_m;
        log_p -= 0.5 * tau_x * (trace_xtx - explained);
        Ok(log_p)
    }
}
