//! End-to-end sweeps over the reference models.

use ndarray::{array, Array2};
use pgfa::core::{ChainRunner, FeatureAllocationSampler};
use pgfa::distributions::{BetaBernoulli, FeatureAllocationPrior, FeatureParameters, Ibp};
use pgfa::error::{ConfigError, SamplerError};
use pgfa::feature_matrix::FeatureAllocationMatrix;
use pgfa::models::lfrm::{LfrmLikelihood, LfrmParams};
use pgfa::models::linear_gaussian::{LinearGaussianLikelihood, LinearGaussianParams};
use pgfa::updates::{FeatureMatrixUpdater, RowSampler, SingletonsUpdater};
use rand::rngs::SmallRng;
use rand::SeedableRng;

#[cfg(test)]
mod tests {
    use super::*;

    fn simulated_data(seed: u64) -> (Array2<f64>, LinearGaussianParams) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let prior = Ibp::new(2.0).unwrap();
        let truth =
            LinearGaussianParams::from_prior(&prior, 20, 4, 0.5, 8.0, &mut rng).unwrap();
        (truth.sample_data(&mut rng), truth)
    }

    fn check_params<P: FeatureParameters>(params: &P) {
        let z = params.feature_matrix();
        assert!(z.as_array().iter().all(|&v| v <= 1));
        assert_eq!(params.num_feature_params(), z.num_features());
    }

    #[test]
    fn test_ibp_sweeps_never_leave_empty_columns() {
        let (data, _) = simulated_data(1);
        let prior = Ibp::new(2.0).unwrap();
        let mut rng = SmallRng::seed_from_u64(2);
        let samplers = [
            "gibbs",
            "row_gibbs",
            "particle_gibbs",
            "mixture[gibbs, annealed_particle_gibbs]",
        ];
        for name in samplers {
            for singletons in [SingletonsUpdater::Prior, SingletonsUpdater::Collapsed] {
                let updater =
                    FeatureMatrixUpdater::new(name.parse().unwrap(), Some(singletons)).unwrap();
                let mut params =
                    LinearGaussianParams::from_prior(&prior, 20, 4, 0.5, 8.0, &mut rng).unwrap();
                for _ in 0..10 {
                    let stats = updater
                        .update(&data, &LinearGaussianLikelihood, &prior, &mut params, &mut rng)
                        .unwrap();
                    check_params(&params);
                    assert_eq!(stats.num_rows, 20);
                    assert_eq!(stats.features_after, params.z.num_features());
                    assert!(
                        params.z.column_counts().iter().all(|&m| m > 0),
                        "{name} with {singletons:?} left an empty column"
                    );
                }
            }
        }
    }

    #[test]
    fn test_finite_prior_keeps_feature_count() {
        let (data, _) = simulated_data(3);
        let prior = BetaBernoulli::new(1.0, 1.0, 5).unwrap();
        let mut rng = SmallRng::seed_from_u64(4);
        let z = prior.sample(20, &mut rng).unwrap();
        let mut params = LinearGaussianParams::new(0.5, 8.0, Array2::zeros((5, 4)), z).unwrap();
        let updater = FeatureMatrixUpdater::new(RowSampler::RowGibbs, None).unwrap();
        for _ in 0..10 {
            let stats = updater
                .update(&data, &LinearGaussianLikelihood, &prior, &mut params, &mut rng)
                .unwrap();
            assert_eq!(stats.features_before, 5);
            assert_eq!(stats.features_after, 5);
            assert_eq!(stats.singletons_skipped, 0);
        }

        let with_singletons =
            FeatureMatrixUpdater::new(RowSampler::RowGibbs, Some(SingletonsUpdater::Prior))
                .unwrap();
        assert_eq!(
            with_singletons.update(&data, &LinearGaussianLikelihood, &prior, &mut params, &mut rng),
            Err(SamplerError::Config(
                ConfigError::SingletonsRequireNonparametricPrior
            ))
        );
    }

    #[test]
    fn test_collapsed_singletons_reject_missing_data() {
        let (mut data, truth) = simulated_data(5);
        data[(3, 1)] = f64::NAN;
        let prior = Ibp::new(2.0).unwrap();
        let mut params = truth.clone();
        let mut rng = SmallRng::seed_from_u64(6);

        // The uncollapsed model just skips the missing entry.
        let updater =
            FeatureMatrixUpdater::new(RowSampler::Gibbs, Some(SingletonsUpdater::Prior)).unwrap();
        for _ in 0..5 {
            updater
                .update(&data, &LinearGaussianLikelihood, &prior, &mut params, &mut rng)
                .unwrap();
        }

        let collapsed =
            FeatureMatrixUpdater::new(RowSampler::Gibbs, Some(SingletonsUpdater::Collapsed))
                .unwrap();
        let mut saw_error = false;
        for _ in 0..20 {
            match collapsed.update(&data, &LinearGaussianLikelihood, &prior, &mut params, &mut rng)
            {
                Ok(_) => {}
                Err(err) => {
                    assert_eq!(err, SamplerError::MissingData(3));
                    saw_error = true;
                    break;
                }
            }
        }
        assert!(saw_error);
    }

    #[test]
    fn test_lfrm_sweeps() {
        let data = array![
            [1.0, 1.0, 0.0, 0.0, 0.0],
            [1.0, 1.0, 0.0, f64::NAN, 0.0],
            [0.0, 0.0, 1.0, 1.0, 1.0],
            [0.0, f64::NAN, 1.0, 1.0, 1.0],
            [0.0, 0.0, 1.0, 1.0, 1.0]
        ];
        let z = FeatureAllocationMatrix::from_rows(&[
            vec![1, 0],
            vec![1, 0],
            vec![0, 1],
            vec![0, 1],
            vec![1, 1],
        ])
        .unwrap();
        let v = array![[2.0, -2.0], [-2.0, 2.0]];
        let prior = Ibp::new(1.0).unwrap();
        let mut rng = SmallRng::seed_from_u64(8);
        for symmetric in [true, false] {
            let mut params = LfrmParams::new(1.0, v.clone(), z.clone(), symmetric).unwrap();
            let sampler = RowSampler::mixture(
                RowSampler::RowGibbs,
                RowSampler::ParticleGibbs(Default::default()),
            );
            let updater =
                FeatureMatrixUpdater::new(sampler, Some(SingletonsUpdater::Prior)).unwrap();
            for _ in 0..20 {
                updater
                    .update(&data, &LfrmLikelihood, &prior, &mut params, &mut rng)
                    .unwrap();
                check_params(&params);
                assert_eq!(params.v.nrows(), params.v.ncols());
                if symmetric {
                    assert_eq!(params.v, params.v.t());
                }
            }
        }
    }

    #[test]
    fn test_parallel_chains_on_simulated_data() {
        let (data, truth) = simulated_data(10);
        let prior = Ibp::new(2.0).unwrap();
        let mut rng = SmallRng::seed_from_u64(11);
        let initial =
            LinearGaussianParams::from_prior(&prior, 20, 4, truth.tau_a, truth.tau_x, &mut rng)
                .unwrap();
        let updater = FeatureMatrixUpdater::new(
            "annealed_particle_gibbs".parse().unwrap(),
            Some(SingletonsUpdater::Prior),
        )
        .unwrap();
        let mut sampler = FeatureAllocationSampler::new(
            initial,
            data,
            LinearGaussianLikelihood,
            prior,
            updater,
            3,
        )
        .set_seed(42);
        let samples = sampler.run(40, 10).unwrap();
        assert_eq!(samples.len(), 3);
        for (chain, last) in samples.iter().zip(sampler.chains.iter()) {
            assert_eq!(chain.len(), 30);
            assert!(chain.iter().all(|z| z.num_rows() == 20));
            assert_eq!(chain.last(), Some(last.params.feature_matrix()));
            check_params(&last.params);
        }
    }
}
