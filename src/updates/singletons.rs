/*!
Birth/death moves for the features a row owns alone.

Under a nonparametric prior the columns no other row uses (the row's singletons) are
not touched by the row samplers. Instead, a reversible-jump Metropolis-Hastings move
replaces all of them at once: the number of new singletons is drawn from the prior's
`Poisson(alpha / N)` birth rate, their parameters from the prior (or set to zero when the
likelihood integrates them out), and the proposal is accepted with the likelihood ratio
of the row.
*/

use log::trace;
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use crate::distributions::{
    DataDistribution, FeatureAllocationPrior, FeatureInit, FeatureParameters,
};
use crate::error::{ConfigError, SamplerError};
use crate::math::metropolis_hastings_accept_reject;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingletonsUpdater {
    /// New feature parameters drawn from the prior, acceptance by the row likelihood
    Prior,
    /// New feature parameters zeroed, acceptance by the collapsed row likelihood
    Collapsed,
}

/// Outcome of one singleton move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SingletonMove {
    /// No singletons before and none proposed; nothing was built.
    Skipped,
    Accepted { k_old: usize, k_new: usize },
    Rejected { k_old: usize, k_new: usize },
}

impl SingletonsUpdater {
    fn feature_init(&self) -> FeatureInit {
        match self {
            Self::Prior => FeatureInit::Prior,
            Self::Collapsed => FeatureInit::Zero,
        }
    }

    fn log_p_row<P, D>(
        &self,
        data: &Array2<f64>,
        dist: &D,
        params: &P,
        row_idx: usize,
    ) -> Result<f64, SamplerError>
    where
        P: FeatureParameters,
        D: DataDistribution<P>,
    {
        match self {
            Self::Prior => Ok(dist.log_p_row(data, params, row_idx)),
            Self::Collapsed => dist.log_p_row_collapsed(data, params, row_idx),
        }
    }

    /**
    Proposes replacing the singleton columns of `row_idx` by a fresh set and accepts or
    rejects the proposal.

    The proposal keeps the other columns in their current order and appends the new
    singletons after them. A rejected proposal leaves `params` untouched.
    */
    pub fn update_row<P, D, A, R>(
        &self,
        data: &Array2<f64>,
        dist: &D,
        prior: &A,
        params: &mut P,
        row_idx: usize,
        rng: &mut R,
    ) -> Result<SingletonMove, SamplerError>
    where
        P: FeatureParameters,
        D: DataDistribution<P>,
        A: FeatureAllocationPrior,
        R: Rng + ?Sized,
    {
        let z = params.feature_matrix();
        z.check_row(row_idx)?;
        let rate = prior
            .singleton_rate(z.num_rows())
            .ok_or(ConfigError::SingletonsRequireNonparametricPrior)?;
        let poisson = Poisson::new(rate).map_err(|err| {
            ConfigError::InvalidPrior(format!("singleton rate {rate}: {err}"))
        })?;

        let k_old = z.singleton_idxs(row_idx).len();
        let k_new = poisson.sample(rng) as usize;
        if k_old == 0 && k_new == 0 {
            return Ok(SingletonMove::Skipped);
        }

        let keep = z.non_singleton_idxs(row_idx);
        let proposal = propose_singletons(params, &keep, row_idx, k_new, self.feature_init(), rng)?;

        let log_p_new = self.log_p_row(data, dist, &proposal, row_idx)?;
        let log_p_old = self.log_p_row(data, dist, params, row_idx)?;
        trace!(
            "row {row_idx}: singletons {k_old} -> {k_new}, log p {log_p_old:.3} -> {log_p_new:.3}"
        );

        if metropolis_hastings_accept_reject(log_p_new, log_p_old, 0.0, 0.0, rng)? {
            *params = proposal;
            Ok(SingletonMove::Accepted { k_old, k_new })
        } else {
            Ok(SingletonMove::Rejected { k_old, k_new })
        }
    }
}

/// A copy of `params` holding the `keep` columns followed by `num_new` columns active in
/// `row_idx` only, with feature parameters rebuilt to match.
pub fn propose_singletons<P, R>(
    params: &P,
    keep: &[usize],
    row_idx: usize,
    num_new: usize,
    init: FeatureInit,
    rng: &mut R,
) -> Result<P, SamplerError>
where
    P: FeatureParameters,
    R: Rng + ?Sized,
{
    let z_new = params
        .feature_matrix()
        .with_singletons(keep, row_idx, num_new);
    let num_features = z_new.num_features();

    let mut proposal = params.clone();
    proposal.resize_features(keep, num_new, init, rng);
    *proposal.feature_matrix_mut() = z_new;

    if proposal.num_feature_params() != num_features {
        return Err(SamplerError::DimensionMismatch {
            what: "feature parameter blocks",
            expected: num_features,
            found: proposal.num_feature_params(),
        });
    }
    Ok(proposal)
}
