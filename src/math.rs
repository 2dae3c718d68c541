/*!
Small numerical helpers used by every sampler: log-domain normalization, categorical
and multinomial draws, the effective sample size of a weighted particle set, and the
Metropolis–Hastings accept/reject decision.

# Examples

```rust
use pgfa::math::{log_normalize, log_sum_exp};

let log_p = [0.0_f64.ln(), 1.0_f64.ln(), 3.0_f64.ln()];
let lse = log_sum_exp(&log_p);
assert!((lse - 4.0_f64.ln()).abs() < 1e-12);

let normalized = log_normalize(&log_p).unwrap();
assert!((normalized[2].exp() - 0.75).abs() < 1e-12);
```
*/

use num_traits::Float;
use rand::Rng;
use rand_distr::{Binomial, Distribution};

use crate::error::SamplerError;

/// Numerically stable `ln(sum(exp(xs)))`.
///
/// Returns negative infinity for an empty slice or when every entry is negative
/// infinity, and NaN when any entry is NaN.
pub fn log_sum_exp<T: Float>(xs: &[T]) -> T {
    let max = xs.iter().fold(T::neg_infinity(), |acc, &x| {
        if x.is_nan() || acc.is_nan() {
            T::nan()
        } else {
            acc.max(x)
        }
    });
    if max.is_nan() {
        return max;
    }
    if max == T::neg_infinity() {
        return T::neg_infinity();
    }
    if max == T::infinity() {
        return T::infinity();
    }
    let sum = xs.iter().fold(T::zero(), |acc, &x| acc + (x - max).exp());
    sum.ln() + max
}

/// Subtracts the log-sum-exp from every entry so that `exp` of the result sums to one.
///
/// Fails when the normalizer is not finite, i.e. when every entry is `-inf`, or some
/// entry is NaN or `+inf`.
pub fn log_normalize(log_p: &[f64]) -> Result<Vec<f64>, SamplerError> {
    let log_norm = log_sum_exp(log_p);
    if !log_norm.is_finite() {
        return Err(SamplerError::NumericalDegeneracy(format!(
            "cannot normalize log-probabilities {log_p:?} (log normalizer {log_norm})"
        )));
    }
    Ok(log_p.iter().map(|x| x - log_norm).collect())
}

/// Draws an index with probability proportional to `probs`.
///
/// The probabilities are assumed to sum to one; any rounding slack falls to the last
/// index.
pub fn discrete_rvs<R: Rng + ?Sized>(probs: &[f64], rng: &mut R) -> usize {
    let r: f64 = rng.gen();
    let mut cum = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cum += p;
        if r < cum {
            return i;
        }
    }
    probs.len() - 1
}

/// Normalizes unnormalized log-probabilities and draws one index from them.
///
/// Returns the drawn index together with the log normalizer.
pub fn sample_log_categorical<R: Rng + ?Sized>(
    log_p: &[f64],
    rng: &mut R,
) -> Result<(usize, f64), SamplerError> {
    let log_norm = log_sum_exp(log_p);
    if !log_norm.is_finite() {
        return Err(SamplerError::NumericalDegeneracy(format!(
            "every candidate has zero or undefined probability: {log_p:?}"
        )));
    }
    let probs: Vec<f64> = log_p.iter().map(|x| (x - log_norm).exp()).collect();
    Ok((discrete_rvs(&probs, rng), log_norm))
}

/// Effective sample size `1 / sum(w^2)` of normalized log-weights.
pub fn effective_sample_size(log_w: &[f64]) -> f64 {
    1.0 / log_w.iter().map(|x| (2.0 * x).exp()).sum::<f64>()
}

/// Draws multinomial counts of `n` trials over `probs` by a chain of conditional
/// binomials.
pub fn multinomial_counts<R: Rng + ?Sized>(
    n: usize,
    probs: &[f64],
    rng: &mut R,
) -> Result<Vec<usize>, SamplerError> {
    let mut counts = vec![0; probs.len()];
    let mut remaining_n = n as u64;
    let mut remaining_mass = 1.0;
    for (k, &p) in probs.iter().enumerate() {
        if remaining_n == 0 {
            break;
        }
        if k == probs.len() - 1 {
            counts[k] = remaining_n as usize;
            break;
        }
        let cond_p = if remaining_mass > 0.0 {
            (p / remaining_mass).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let binom = Binomial::new(remaining_n, cond_p).map_err(|err| {
            SamplerError::NumericalDegeneracy(format!("invalid multinomial weight {p}: {err}"))
        })?;
        let draw = binom.sample(rng);
        counts[k] = draw as usize;
        remaining_n -= draw;
        remaining_mass -= p;
    }
    Ok(counts)
}

/**
Metropolis–Hastings accept/reject in log space.

The proposal is accepted when

\[
\log u < \left[\log p(\text{new}) + \log q(\text{old} \mid \text{new})\right]
       - \left[\log p(\text{old}) + \log q(\text{new} \mid \text{old})\right],
\quad u \sim \text{Uniform}(0, 1).
\]

A NaN log ratio (for example `-inf - -inf`) is reported as a numerical degeneracy
rather than silently rejected.
*/
pub fn metropolis_hastings_accept_reject<R: Rng + ?Sized>(
    log_p_new: f64,
    log_p_old: f64,
    log_q_new: f64,
    log_q_old: f64,
    rng: &mut R,
) -> Result<bool, SamplerError> {
    let log_ratio = (log_p_new + log_q_old) - (log_p_old + log_q_new);
    if log_ratio.is_nan() {
        return Err(SamplerError::NumericalDegeneracy(format!(
            "Metropolis-Hastings ratio is NaN (log p new {log_p_new}, log p old {log_p_old})"
        )));
    }
    let u: f64 = rng.gen();
    Ok(log_ratio >= 0.0 || u.ln() < log_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_log_sum_exp_matches_naive_sum() {
        let xs = [-1.0_f64, 0.5, 2.0, -3.0];
        let naive = xs.iter().map(|x| x.exp()).sum::<f64>().ln();
        assert_abs_diff_eq!(log_sum_exp(&xs), naive, epsilon = 1e-12);
    }

    #[test]
    fn test_log_sum_exp_survives_large_magnitudes() {
        let xs = [-1000.0_f64, -1000.0];
        assert_abs_diff_eq!(log_sum_exp(&xs), -1000.0 + 2.0_f64.ln(), epsilon = 1e-9);
        let xs = [1000.0_f32, 1000.0];
        assert!((log_sum_exp(&xs) - (1000.0 + 2.0_f32.ln())).abs() < 1e-3);
    }

    #[test]
    fn test_log_sum_exp_edge_cases() {
        assert_eq!(log_sum_exp::<f64>(&[]), f64::NEG_INFINITY);
        assert_eq!(
            log_sum_exp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]),
            f64::NEG_INFINITY
        );
        assert_abs_diff_eq!(log_sum_exp(&[f64::NEG_INFINITY, 0.0]), 0.0);
        assert!(log_sum_exp(&[0.0, f64::NAN]).is_nan());
    }

    #[test]
    fn test_log_normalize_rejects_all_neg_inf() {
        let res = log_normalize(&[f64::NEG_INFINITY; 3]);
        assert!(
            matches!(res, Err(SamplerError::NumericalDegeneracy(_))),
            "Expected a degeneracy error, got {res:?}"
        );
        assert!(log_normalize(&[0.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_discrete_rvs_frequencies() {
        let mut rng = SmallRng::seed_from_u64(42);
        let probs = [0.2, 0.3, 0.5];
        let mut counts = [0usize; 3];
        let n = 50_000;
        for _ in 0..n {
            counts[discrete_rvs(&probs, &mut rng)] += 1;
        }
        for (c, p) in counts.iter().zip(probs.iter()) {
            assert_abs_diff_eq!(*c as f64 / n as f64, *p, epsilon = 0.01);
        }
    }

    #[test]
    fn test_sample_log_categorical_never_picks_impossible_index() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let (idx, log_norm) =
                sample_log_categorical(&[f64::NEG_INFINITY, 0.0], &mut rng).unwrap();
            assert_eq!(idx, 1);
            assert_abs_diff_eq!(log_norm, 0.0);
        }
    }

    #[test]
    fn test_ess_of_uniform_and_degenerate_weights() {
        let n = 8;
        let uniform = vec![-(n as f64).ln(); n];
        assert_abs_diff_eq!(effective_sample_size(&uniform), n as f64, epsilon = 1e-9);
        let mut degenerate = vec![f64::NEG_INFINITY; n];
        degenerate[3] = 0.0;
        assert_abs_diff_eq!(effective_sample_size(&degenerate), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_multinomial_counts_sum_to_n() {
        let mut rng = SmallRng::seed_from_u64(3);
        let probs = [0.1, 0.0, 0.6, 0.3];
        for _ in 0..100 {
            let counts = multinomial_counts(9, &probs, &mut rng).unwrap();
            assert_eq!(counts.iter().sum::<usize>(), 9);
            assert_eq!(counts[1], 0, "Zero-probability category was drawn: {counts:?}");
        }
    }

    #[test]
    fn test_mh_always_accepts_uphill_and_rejects_impossible() {
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..100 {
            assert!(metropolis_hastings_accept_reject(0.0, -1.0, 0.0, 0.0, &mut rng).unwrap());
            assert!(metropolis_hastings_accept_reject(
                0.0,
                f64::NEG_INFINITY,
                0.0,
                0.0,
                &mut rng
            )
            .unwrap());
            assert!(!metropolis_hastings_accept_reject(
                f64::NEG_INFINITY,
                0.0,
                0.0,
                0.0,
                &mut rng
            )
            .unwrap());
        }
        assert!(metropolis_hastings_accept_reject(
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
            0.0,
            0.0,
            &mut rng
        )
        .is_err());
    }
}
