/*!
Conditional sequential Monte Carlo update of one row.

The `T` resampled columns are visited in order. At step `t` every particle extends its
partial assignment of the first `t` columns by a value for column `t`, drawn from the
two-way conditional of the intermediate target

\[
\gamma_t(z_{1:t}) = \prod_{j \le t} p_j^{z_j} (1 - p_j)^{1 - z_j}
    \cdot p(x_i \mid z_{1:t}, 0, \ldots, 0)^{\beta_t},
\]

where columns not yet reached are held at zero and `beta_t` is the annealing temperature
(always 1 without annealing). Particle 0 is pinned to the current row and survives
every resampling step, which makes the update a valid Markov kernel for any number of
particles.

With annealing, and `t` counted from 1, the temperature is `(t - 1) / (T - 1)`: the
likelihood is ignored at the first column and enters in full at the last. A single
column gets temperature 1.
*/

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::log_feature_probs;
use crate::distributions::{DataDistribution, FeatureParameters};
use crate::error::{ConfigError, SamplerError};
use crate::math::{
    discrete_rvs, effective_sample_size, log_normalize, log_sum_exp, multinomial_counts,
    sample_log_categorical,
};

/// Settings of the particle Gibbs row sampler.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleGibbsConfig {
    pub num_particles: usize,
    /// Resample when the effective sample size divided by the number of particles
    /// drops to this value or below. Must lie in `(0, 1]`.
    pub resample_threshold: f64,
    /// Temper the likelihood along the columns.
    pub annealed: bool,
}

impl Default for ParticleGibbsConfig {
    fn default() -> Self {
        Self {
            num_particles: 10,
            resample_threshold: 0.5,
            annealed: false,
        }
    }
}

impl ParticleGibbsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_particles == 0 {
            return Err(ConfigError::ZeroParticles);
        }
        if !(self.resample_threshold > 0.0 && self.resample_threshold <= 1.0) {
            return Err(ConfigError::InvalidResampleThreshold(
                self.resample_threshold,
            ));
        }
        Ok(())
    }
}

/// Likelihood temperature at step `t` (1-based) of `num_steps`.
fn annealing_temperature(t: usize, num_steps: usize) -> f64 {
    if num_steps <= 1 {
        1.0
    } else {
        (t - 1) as f64 / (num_steps - 1) as f64
    }
}

/**
Conditional multinomial resampling.

When `ESS / P <= threshold`, particle 0 is kept in place and the remaining `P - 1` slots
are refilled by multinomial draws proportional to `exp(log_w)`. Each particle's previous
log-target travels with it and all weights are reset to `ln(1 / P)`. `log_w` must be
normalized. Returns whether resampling took place.
*/
pub(crate) fn resample_conditional<R: Rng + ?Sized>(
    particles: &mut Vec<Vec<u8>>,
    log_w: &mut [f64],
    log_p_prev: &mut Vec<f64>,
    threshold: f64,
    rng: &mut R,
) -> Result<bool, SamplerError> {
    let num_particles = particles.len();
    if effective_sample_size(log_w) / num_particles as f64 > threshold {
        return Ok(false);
    }

    let probs: Vec<f64> = log_w.iter().map(|x| x.exp()).collect();
    let counts = multinomial_counts(num_particles - 1, &probs, rng)?;

    let mut new_particles = Vec::with_capacity(num_particles);
    let mut new_log_p_prev = Vec::with_capacity(num_particles);
    new_particles.push(particles[0].clone());
    new_log_p_prev.push(log_p_prev[0]);
    for (k, &count) in counts.iter().enumerate() {
        for _ in 0..count {
            new_particles.push(particles[k].clone());
            new_log_p_prev.push(log_p_prev[k]);
        }
    }

    *particles = new_particles;
    *log_p_prev = new_log_p_prev;
    log_w.fill(-(num_particles as f64).ln());
    Ok(true)
}

fn normalize_weights(log_w: &[f64], t: usize) -> Result<Vec<f64>, SamplerError> {
    log_normalize(log_w).map_err(|_| {
        SamplerError::NumericalDegeneracy(format!(
            "particle weights are not finite at step {t}: {log_w:?}"
        ))
    })
}

/// Resamples the entries of `row_idx` in `cols` with conditional SMC.
#[allow(clippy::too_many_arguments)]
pub fn do_particle_gibbs_update<P, D, R>(
    config: &ParticleGibbsConfig,
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
    let num_steps = cols.len();
    if num_steps == 0 {
        return Ok(());
    }
    config.validate()?;
    let (log_on, log_off) = log_feature_probs(feat_probs, cols)?;
    let num_particles = config.num_particles;

    let pinned = params.feature_matrix().row_values(row_idx, cols);
    let mut particles = vec![vec![0u8; num_steps]; num_particles];
    let mut log_w = vec![0.0; num_particles];
    let mut log_p_prev = vec![0.0; num_particles];

    params
        .feature_matrix_mut()
        .set_row_values(row_idx, cols, &vec![0; num_steps]);

    for t in 0..num_steps {
        particles[0][t] = pinned[t];
        log_w = normalize_weights(&log_w, t)?;
        if t > 0 {
            resample_conditional(
                &mut particles,
                &mut log_w,
                &mut log_p_prev,
                config.resample_threshold,
                rng,
            )?;
        }

        let temperature = if config.annealed {
            annealing_temperature(t + 1, num_steps)
        } else {
            1.0
        };

        for i in 0..num_particles {
            let prefix = &particles[i][..t];
            params
                .feature_matrix_mut()
                .set_row_values(row_idx, &cols[..t], prefix);
            let log_prior: f64 = prefix
                .iter()
                .enumerate()
                .map(|(j, &v)| if v == 1 { log_on[j] } else { log_off[j] })
                .sum();

            let mut log_target = [log_prior + log_off[t], log_prior + log_on[t]];
            if temperature > 0.0 {
                for (value, lt) in log_target.iter_mut().enumerate() {
                    params
                        .feature_matrix_mut()
                        .set(row_idx, cols[t], value as u8);
                    *lt += temperature * dist.log_p_row(data, params, row_idx);
                }
            }

            let (value, log_norm) = if i == 0 {
                let log_norm = log_sum_exp(&log_target);
                if !log_norm.is_finite() {
                    return Err(SamplerError::NumericalDegeneracy(format!(
                        "reference particle has no finite target at column {}: {log_target:?}",
                        cols[t]
                    )));
                }
                (pinned[t] as usize, log_norm)
            } else {
                sample_log_categorical(&log_target, rng)?
            };

            particles[i][t] = value as u8;
            log_w[i] += log_norm - log_p_prev[i];
            log_p_prev[i] = log_target[value];
        }
    }

    let log_w = normalize_weights(&log_w, num_steps)?;
    let weights: Vec<f64> = log_w.iter().map(|x| x.exp()).collect();
    let idx = discrete_rvs(&weights, rng);
    params
        .feature_matrix_mut()
        .set_row_values(row_idx, cols, &particles[idx]);
    Ok(())
}
