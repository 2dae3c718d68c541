/*!
Exact joint update of one row by enumeration.

The `2^m` configurations of the `m` resampled columns are visited in lexicographic
order, with the first listed column as the most significant bit, so configuration `0`
is all zeros and configuration `2^m - 1` is all ones.
*/

use ndarray::Array2;
use rand::Rng;

use super::{log_feature_probs, MAX_ROW_GIBBS_COLUMNS};
use crate::distributions::{DataDistribution, FeatureParameters};
use crate::error::{ConfigError, SamplerError};
use crate::math::sample_log_categorical;

/// Values of configuration `config` for `num_cols` columns, first column most significant.
fn config_values(config: usize, num_cols: usize) -> Vec<u8> {
    (0..num_cols)
        .map(|j| ((config >> (num_cols - 1 - j)) & 1) as u8)
        .collect()
}

/// Draws the entries of `row_idx` in `cols` jointly from their exact conditional.
pub fn do_row_gibbs_update<P, D, R>(
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
    let num_cols = cols.len();
    if num_cols == 0 {
        return Ok(());
    }
    if num_cols > MAX_ROW_GIBBS_COLUMNS {
        return Err(ConfigError::TooManyRowGibbsColumns {
            num_cols,
            max_cols: MAX_ROW_GIBBS_COLUMNS,
        }
        .into());
    }
    let (log_on, log_off) = log_feature_probs(feat_probs, cols)?;

    let num_configs = 1usize << num_cols;
    let mut log_p = Vec::with_capacity(num_configs);
    for config in 0..num_configs {
        let values = config_values(config, num_cols);
        params
            .feature_matrix_mut()
            .set_row_values(row_idx, cols, &values);
        let log_prior: f64 = values
            .iter()
            .enumerate()
            .map(|(j, &v)| if v == 1 { log_on[j] } else { log_off[j] })
            .sum();
        log_p.push(log_prior + dist.log_p_row(data, params, row_idx));
    }

    let (config, _) = sample_log_categorical(&log_p, rng)?;
    params
        .feature_matrix_mut()
        .set_row_values(row_idx, cols, &config_values(config, num_cols));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_matrix::FeatureAllocationMatrix;
    use crate::updates::test_utils::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_configurations_are_msb_first() {
        assert_eq!(config_values(0, 3), vec![0, 0, 0]);
        assert_eq!(config_values(1, 3), vec![0, 0, 1]);
        assert_eq!(config_values(4, 3), vec![1, 0, 0]);
        assert_eq!(config_values(7, 3), vec![1, 1, 1]);
    }

    #[test]
    fn test_empty_column_list_is_a_no_op() {
        let data = array![[1.0]];
        let mut params = ToyParams::new(FeatureAllocationMatrix::from_rows(&[vec![1, 0]]).unwrap());
        let before = params.clone();
        let mut rng = SmallRng::seed_from_u64(0);
        do_row_gibbs_update(&[], &data, &SumLikelihood, &[0.5, 0.5], &mut params, 0, &mut rng)
            .unwrap();
        assert_eq!(params, before);
    }

    #[test]
    fn test_too_many_columns_is_a_config_error() {
        let num_cols = MAX_ROW_GIBBS_COLUMNS + 1;
        let data = Array2::zeros((1, 1));
        let mut params = ToyParams::new(FeatureAllocationMatrix::zeros(1, num_cols));
        let cols: Vec<usize> = (0..num_cols).collect();
        let feat_probs = vec![0.5; num_cols];
        let mut rng = SmallRng::seed_from_u64(0);
        let res = do_row_gibbs_update(
            &cols,
            &data,
            &FlatLikelihood,
            &feat_probs,
            &mut params,
            0,
            &mut rng,
        );
        assert_eq!(
            res,
            Err(SamplerError::Config(ConfigError::TooManyRowGibbsColumns {
                num_cols,
                max_cols: MAX_ROW_GIBBS_COLUMNS
            }))
        );
    }

    #[test]
    fn test_column_marginals_match_exact_conditional() {
        let data = array![[1.3], [0.0], [2.0]];
        let z = FeatureAllocationMatrix::from_rows(&[
            vec![0, 1, 0, 1],
            vec![1, 1, 0, 0],
            vec![0, 1, 1, 1],
        ])
        .unwrap();
        let mut params = ToyParams::new(z);
        params.weights = vec![0.9, -0.3, 0.5, 0.2];
        // Column 2 is left alone.
        let cols = [3, 0, 1];
        let feat_probs = [0.4, 0.7, 0.5, 0.2];
        let exact = exact_conditional(&cols, &data, &SumLikelihood, &feat_probs, &params, 0);
        let exact_marginals: Vec<f64> = (0..cols.len())
            .map(|j| {
                exact
                    .iter()
                    .enumerate()
                    .filter(|(c, _)| config_values(*c, cols.len())[j] == 1)
                    .map(|(_, p)| p)
                    .sum()
            })
            .collect();

        let mut rng = SmallRng::seed_from_u64(42);
        let n_iter = 40_000;
        let mut ones = vec![0usize; cols.len()];
        for _ in 0..n_iter {
            do_row_gibbs_update(
                &cols,
                &data,
                &SumLikelihood,
                &feat_probs,
                &mut params,
                0,
                &mut rng,
            )
            .unwrap();
            assert_eq!(params.z.get(0, 2), 0);
            for (j, &k) in cols.iter().enumerate() {
                ones[j] += params.z.get(0, k) as usize;
            }
        }
        for (count, p) in ones.iter().zip(exact_marginals.iter()) {
            assert_abs_diff_eq!(*count as f64 / n_iter as f64, *p, epsilon = 0.01);
        }
    }
}
