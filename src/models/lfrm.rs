/*!
Latent feature relational model.

The data is an `N x N` binary link matrix. A link between `i` and `j` is present with
probability `sigmoid(z_i V z_j^T)`, where `V` is a `K x K` feature interaction matrix with
`N(0, 1 / tau)` entries, symmetric for undirected graphs. NaN links are unobserved.
*/

use ndarray::Array2;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::distributions::{DataDistribution, FeatureInit, FeatureParameters};
use crate::error::SamplerError;
use crate::feature_matrix::FeatureAllocationMatrix;
use crate::models::check_precision;

#[derive(Debug, Clone, PartialEq)]
pub struct LfrmParams {
    /// Precision of the interaction weights.
    pub tau: f64,
    /// Feature interaction weights (`K x K`).
    pub v: Array2<f64>,
    pub z: FeatureAllocationMatrix,
    pub symmetric: bool,
}

impl LfrmParams {
    pub fn new(
        tau: f64,
        v: Array2<f64>,
        z: FeatureAllocationMatrix,
        symmetric: bool,
    ) -> Result<Self, SamplerError> {
        check_precision("tau", tau)?;
        let num_features = z.num_features();
        if v.dim() != (num_features, num_features) {
            return Err(SamplerError::DimensionMismatch {
                what: "interaction matrix size",
                expected: num_features,
                found: v.nrows().max(v.ncols()),
            });
        }
        Ok(Self {
            tau,
            v,
            z,
            symmetric,
        })
    }

    /// `z_i V z_j^T`
    fn interaction(&self, i: usize, j: usize) -> f64 {
        let z_i = self.z.row(i);
        let z_j = self.z.row(j);
        let mut m = 0.0;
        for (k, _) in z_i.iter().enumerate().filter(|(_, v)| **v == 1) {
            for (l, _) in z_j.iter().enumerate().filter(|(_, v)| **v == 1) {
                m += self.v[(k, l)];
            }
        }
        m
    }
}

impl FeatureParameters for LfrmParams {
    fn feature_matrix(&self) -> &FeatureAllocationMatrix {
        &self.z
    }

    fn feature_matrix_mut(&mut self) -> &mut FeatureAllocationMatrix {
        &mut self.z
    }

    fn num_feature_params(&self) -> usize {
        self.v.nrows()
    }

    /// Weights between kept features are carried over; every weight involving a new
    /// feature is drawn from the prior (mirrored when symmetric) or zeroed.
    fn resize_features<R: Rng + ?Sized>(
        &mut self,
        keep: &[usize],
        num_new: usize,
        init: FeatureInit,
        rng: &mut R,
    ) {
        let num_kept = keep.len();
        let num_features = num_kept + num_new;
        let mut v = Array2::zeros((num_features, num_features));
        for (i, &old_i) in keep.iter().enumerate() {
            for (j, &old_j) in keep.iter().enumerate() {
                v[(i, j)] = self.v[(old_i, old_j)];
            }
        }
        if init == FeatureInit::Prior {
            let sd = self.tau.sqrt().recip();
            for i in 0..num_features {
                for j in 0..num_features {
                    if i < num_kept && j < num_kept {
                        continue;
                    }
                    if self.symmetric && j < i {
                        v[(i, j)] = v[(j, i)];
                    } else {
                        v[(i, j)] = sd * rng.sample::<f64, _>(StandardNormal);
                    }
                }
            }
        }
        self.v = v;
    }
}

/// `ln(sigmoid(x))` without overflow.
fn log_sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        -(-x).exp().ln_1p()
    } else {
        x - x.exp().ln_1p()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LfrmLikelihood;

impl LfrmLikelihood {
    fn log_p_link(data: &Array2<f64>, params: &LfrmParams, i: usize, j: usize) -> f64 {
        let x = data[(i, j)];
        if x.is_nan() {
            return 0.0;
        }
        let m = params.interaction(i, j);
        if x == 0.0 {
            log_sigmoid(-m)
        } else {
            log_sigmoid(m)
        }
    }
}

impl DataDistribution<LfrmParams> for LfrmLikelihood {
    /// Log-likelihood of every link touching `row_idx`, in both directions. A model
    /// without features cannot explain any link and gets negative infinity.
    fn log_p_row(&self, data: &Array2<f64>, params: &LfrmParams, row_idx: usize) -> f64 {
        if params.z.num_features() == 0 {
            return f64::NEG_INFINITY;
        }
        let mut log_p = Self::log_p_link(data, params, row_idx, row_idx);
        for i in (0..data.nrows()).filter(|&i| i != row_idx) {
            log_p += Self::log_p_link(data, params, i, row_idx);
            log_p += Self::log_p_link(data, params, row_idx, i);
        }
        log_p
    }

    /// Every observed link counted once.
    fn log_p(&self, data: &Array2<f64>, params: &LfrmParams) -> f64 {
        if params.z.num_features() == 0 {
            return f64::NEG_INFINITY;
        }
        let num_rows = data.nrows();
        (0..num_rows)
            .flat_map(|i| (0..num_rows).map(move |j| (i, j)))
            .map(|(i, j)| Self::log_p_link(data, params, i, j))
            .sum()
    }
}
