//! Simulates linear-Gaussian data with a known feature allocation, then recovers the
//! allocation with an IBP feature-allocation sampler.
//!
//! Usage: `demo [row_sampler]`, e.g. `demo "mixture[gibbs, annealed_particle_gibbs]"`.
//! Set `RUST_LOG=debug` to see per-sweep statistics.

use log::info;
use pgfa::core::{ChainRunner, FeatureAllocationSampler};
use pgfa::distributions::Ibp;
use pgfa::models::linear_gaussian::{LinearGaussianLikelihood, LinearGaussianParams};
use pgfa::updates::{FeatureMatrixUpdater, RowSampler, SingletonsUpdater};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    const NUM_ROWS: usize = 50;
    const NUM_DIMS: usize = 6;
    const ITERATIONS: usize = 200;
    const BURNIN: usize = 50;
    const N_CHAINS: usize = 4;
    const SEED: u64 = 42;

    env_logger::init();

    let sampler: RowSampler = match std::env::args().nth(1) {
        Some(name) => name.parse()?,
        None => RowSampler::ParticleGibbs(Default::default()),
    };

    let mut rng = SmallRng::seed_from_u64(SEED);
    let prior = Ibp::new(2.0)?;
    let truth = LinearGaussianParams::from_prior(&prior, NUM_ROWS, NUM_DIMS, 0.25, 10.0, &mut rng)?;
    let data = truth.sample_data(&mut rng);
    info!(
        "simulated {NUM_ROWS} x {NUM_DIMS} data with {} true features",
        truth.z.num_features()
    );

    // Start from a fresh prior draw; the noise and loading precisions are held at
    // their true values.
    let initial = LinearGaussianParams::from_prior(&prior, NUM_ROWS, NUM_DIMS, 0.25, 10.0, &mut rng)?;
    let updater = FeatureMatrixUpdater::new(sampler, Some(SingletonsUpdater::Prior))?;
    info!("running {N_CHAINS} chains with {}", updater.sampler());

    let mut mcmc = FeatureAllocationSampler::new(
        initial,
        data,
        LinearGaussianLikelihood,
        prior,
        updater,
        N_CHAINS,
    )
    .set_seed(SEED);
    let samples = mcmc.run_with_progress(BURNIN + ITERATIONS, BURNIN)?;

    for (chain_idx, chain) in samples.iter().enumerate() {
        let mean_k =
            chain.iter().map(|z| z.num_features() as f64).sum::<f64>() / chain.len() as f64;
        println!(
            "Chain {chain_idx}: mean number of features {mean_k:.2} (truth {})",
            truth.z.num_features()
        );
    }
    for (chain_idx, chain) in mcmc.chains.iter().enumerate() {
        if let Some(stats) = chain.last_stats {
            println!(
                "Chain {chain_idx}: last sweep accepted {} of {} singleton proposals",
                stats.singletons_accepted,
                stats.singletons_accepted + stats.singletons_rejected
            );
        }
    }

    #[cfg(feature = "csv")]
    {
        pgfa::io::csv::save_num_features_csv(&samples, "/tmp/pgfa_num_features.csv")?;
        println!("Saved feature counts to /tmp/pgfa_num_features.csv");
    }

    Ok(())
}
