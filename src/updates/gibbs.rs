//! Single-site Gibbs updates of one row.

use ndarray::Array2;
use rand::Rng;

use super::log_feature_probs;
use crate::distributions::{DataDistribution, FeatureParameters};
use crate::error::SamplerError;
use crate::math::sample_log_categorical;

/// Resamples each entry of `row_idx` in `cols`, in order, from its two-way conditional
/// given every other entry.
pub fn do_gibbs_update<P, D, R>(
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
    let (log_on, log_off) = log_feature_probs(feat_probs, cols)?;

    for (j, &col_idx) in cols.iter().enumerate() {
        let mut log_p = [0.0; 2];

        params.feature_matrix_mut().set(row_idx, col_idx, 0);
        log_p[0] = log_off[j] + dist.log_p_row(data, params, row_idx);

        params.feature_matrix_mut().set(row_idx, col_idx, 1);
        log_p[1] = log_on[j] + dist.log_p_row(data, params, row_idx);

        let (value, _) = sample_log_categorical(&log_p, rng).map_err(|_| {
            SamplerError::NumericalDegeneracy(format!(
                "both values of entry ({row_idx}, {col_idx}) have log density {log_p:?}"
            ))
        })?;
        params
            .feature_matrix_mut()
            .set(row_idx, col_idx, value as u8);
    }
    Ok(())
}
