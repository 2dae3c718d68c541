//! Chi-square goodness-of-fit test for comparing sampler output with exact
//! distributions over a finite set of outcomes.

use special::Gamma;

use crate::error::ChiSquareError;

/// Outcome of a chi-square goodness-of-fit test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestResult {
    pub is_rejected: bool,
    pub statistic: f64,
    pub p_value: f64,
    pub level: f64,
    pub degrees_of_freedom: usize,
}

/// CDF of the chi-square distribution with `k` degrees of freedom.
pub fn chi_square_cdf(x: f64, k: f64) -> f64 {
    if x <= 0.0 {
        0.0
    } else {
        (x / 2.0).inc_gamma(k / 2.0)
    }
}

/// Pearson's statistic and its p-value for observed counts `freq_obs` against expected
/// counts `freq_exp`, with one degree of freedom fewer than the number of bins.
pub fn chi_square_statistic(
    freq_obs: &[f64],
    freq_exp: &[f64],
) -> Result<(f64, f64), ChiSquareError> {
    if freq_obs.len() != freq_exp.len() {
        return Err(ChiSquareError::LengthMismatch {
            expected: freq_exp.len(),
            found: freq_obs.len(),
        });
    }
    if freq_obs.len() < 2 {
        return Err(ChiSquareError::TooFewBins(freq_obs.len()));
    }
    if let Some(e) = freq_exp.iter().find(|&&e| !(e > 0.0)) {
        return Err(ChiSquareError::NonPositiveExpected(*e));
    }

    let stat: f64 = freq_obs
        .iter()
        .zip(freq_exp.iter())
        .fold(0.0, |acc, (o, e)| {
            let diff = o - e;
            acc + diff * diff / e
        });
    let k = freq_obs.len() - 1;
    let p = 1.0 - chi_square_cdf(stat, k as f64);
    Ok((stat, p))
}

/// Tests whether counts of sampled outcomes are consistent with the probabilities
/// `probs` (which must sum to one) at significance `level`.
pub fn chi_square_test(
    counts: &[usize],
    probs: &[f64],
    level: f64,
) -> Result<TestResult, ChiSquareError> {
    let n: usize = counts.iter().sum();
    let freq_obs: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    let freq_exp: Vec<f64> = probs.iter().map(|&p| p * n as f64).collect();
    let (statistic, p_value) = chi_square_statistic(&freq_obs, &freq_exp)?;
    Ok(TestResult {
        is_rejected: p_value < level,
        statistic,
        p_value,
        level,
        degrees_of_freedom: counts.len() - 1,
    })
}
