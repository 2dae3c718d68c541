/*!
Chain driver: runs one or more independent feature-allocation chains.

A [`FeatureAllocationChain`] owns a parameter bundle, the model collaborators, a shared
read-only data matrix and its own [`SmallRng`]. Each [`MarkovChain::step`] is one sweep
of its [`FeatureMatrixUpdater`]. [`FeatureAllocationSampler`] holds several chains and
[`ChainRunner`] runs them in parallel with rayon, optionally with indicatif progress
bars, keeping the allocation matrix after every step once burn-in is discarded.

# Examples

```rust
use ndarray::Array2;
use pgfa::core::{ChainRunner, FeatureAllocationSampler};
use pgfa::distributions::Ibp;
use pgfa::models::linear_gaussian::{LinearGaussianLikelihood, LinearGaussianParams};
use pgfa::updates::{FeatureMatrixUpdater, RowSampler, SingletonsUpdater};
use rand::rngs::SmallRng;
use rand::SeedableRng;

let mut rng = SmallRng::seed_from_u64(0);
let prior = Ibp::new(1.0).unwrap();
let params = LinearGaussianParams::from_prior(&prior, 8, 2, 1.0, 1.0, &mut rng).unwrap();
let data = params.sample_data(&mut rng);

let updater = FeatureMatrixUpdater::new(
    "particle_gibbs".parse().unwrap(),
    Some(SingletonsUpdater::Prior),
)
.unwrap();
let mut sampler =
    FeatureAllocationSampler::new(params, data, LinearGaussianLikelihood, prior, updater, 2)
        .set_seed(42);
let samples = sampler.run(20, 5).unwrap();
assert_eq!(samples.len(), 2);
assert_eq!(samples[0].len(), 15);
```
*/

use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::debug;
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};
use rayon::prelude::*;

use crate::distributions::{DataDistribution, FeatureAllocationPrior, FeatureParameters};
use crate::error::SamplerError;
use crate::feature_matrix::FeatureAllocationMatrix;
use crate::updates::{FeatureMatrixUpdater, SweepStats};

pub trait MarkovChain<S> {
    /// Does one iteration of the chain, returning the new current state.
    fn step(&mut self) -> Result<&S, SamplerError>;

    /// The current state without stepping.
    fn current_state(&self) -> &S;
}

pub fn run_chain<S, M>(chain: &mut M, n_steps: usize) -> Result<Vec<S>, SamplerError>
where
    M: MarkovChain<S>,
    S: Clone,
{
    let mut out = Vec::with_capacity(n_steps);
    for _ in 0..n_steps {
        out.push(chain.step()?.clone());
    }
    Ok(out)
}

pub fn run_chain_with_progress<S, M>(
    chain: &mut M,
    n_steps: usize,
    pb: &ProgressBar,
) -> Result<Vec<S>, SamplerError>
where
    M: MarkovChain<S>,
    S: Clone,
{
    let mut out = Vec::with_capacity(n_steps);
    pb.set_length(n_steps as u64);
    for _ in 0..n_steps {
        out.push(chain.step()?.clone());
        pb.inc(1);
    }
    Ok(out)
}

/// Anything that owns multiple Markov chains.
pub trait HasChains<S> {
    type Chain: MarkovChain<S> + std::marker::Send;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain>;
}

fn discard_burn_in<S>(mut samples: Vec<S>, discard: usize) -> Vec<S> {
    samples.drain(..discard.min(samples.len()));
    samples
}

pub trait ChainRunner<S>: HasChains<S>
where
    S: Clone + Send,
{
    /// Runs the chains in parallel, discarding burn-in. The first failing chain's error
    /// is returned.
    fn run(&mut self, n_steps: usize, discard: usize) -> Result<Vec<Vec<S>>, SamplerError> {
        let results: Vec<Vec<S>> = self
            .chains_mut()
            .par_iter_mut()
            .map(|chain| run_chain(chain, n_steps))
            .collect::<Result<_, _>>()?;

        Ok(results
            .into_iter()
            .map(|samples| discard_burn_in(samples, discard))
            .collect())
    }

    /// Like [`ChainRunner::run`], with one progress bar per chain.
    fn run_with_progress(
        &mut self,
        n_steps: usize,
        discard: usize,
    ) -> Result<Vec<Vec<S>>, SamplerError> {
        let multi = MultiProgress::new();
        let pb_style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        let results: Vec<Vec<S>> = self
            .chains_mut()
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| {
                let pb = multi.add(ProgressBar::new(n_steps as u64));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());

                let samples = run_chain_with_progress(chain, n_steps, &pb);
                match &samples {
                    Ok(_) => pb.finish_with_message("Done!"),
                    Err(err) => pb.abandon_with_message(format!("Failed: {err}")),
                }
                samples
            })
            .collect::<Result<_, _>>()?;

        Ok(results
            .into_par_iter()
            .map(|samples| discard_burn_in(samples, discard))
            .collect())
    }
}

impl<S: Clone + Send, T: HasChains<S>> ChainRunner<S> for T {}

/// One chain over feature allocations. Each step is one sweep of `updater`.
pub struct FeatureAllocationChain<P, D, A> {
    pub params: P,
    pub data: Arc<Array2<f64>>,
    pub dist: D,
    pub prior: A,
    pub updater: FeatureMatrixUpdater,

    /// Counters of the most recent sweep.
    pub last_stats: Option<SweepStats>,

    /// Random seed for reproducibility.
    pub seed: u64,

    /// RNG for this chain.
    pub rng: SmallRng,
}

impl<P, D, A> FeatureAllocationChain<P, D, A>
where
    P: FeatureParameters,
    D: DataDistribution<P>,
    A: FeatureAllocationPrior,
{
    pub fn new(
        params: P,
        data: Arc<Array2<f64>>,
        dist: D,
        prior: A,
        updater: FeatureMatrixUpdater,
    ) -> Self {
        let seed = thread_rng().gen::<u64>();
        Self {
            params,
            data,
            dist,
            prior,
            updater,
            last_stats: None,
            seed,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }
}

impl<P, D, A> MarkovChain<FeatureAllocationMatrix> for FeatureAllocationChain<P, D, A>
where
    P: FeatureParameters,
    D: DataDistribution<P>,
    A: FeatureAllocationPrior,
{
    fn step(&mut self) -> Result<&FeatureAllocationMatrix, SamplerError> {
        let stats = self.updater.update(
            &self.data,
            &self.dist,
            &self.prior,
            &mut self.params,
            &mut self.rng,
        )?;
        self.last_stats = Some(stats);
        Ok(self.params.feature_matrix())
    }

    fn current_state(&self) -> &FeatureAllocationMatrix {
        self.params.feature_matrix()
    }
}

/// Independent feature-allocation chains sharing one data matrix.
pub struct FeatureAllocationSampler<P, D, A> {
    pub chains: Vec<FeatureAllocationChain<P, D, A>>,
    pub seed: u64,
}

impl<P, D, A> FeatureAllocationSampler<P, D, A>
where
    P: FeatureParameters,
    D: DataDistribution<P> + Clone,
    A: FeatureAllocationPrior + Clone,
{
    /// Creates `n_chains` chains, all starting from `initial_params`.
    pub fn new(
        initial_params: P,
        data: Array2<f64>,
        dist: D,
        prior: A,
        updater: FeatureMatrixUpdater,
        n_chains: usize,
    ) -> Self {
        let data = Arc::new(data);
        let chains = (0..n_chains)
            .map(|_| {
                FeatureAllocationChain::new(
                    initial_params.clone(),
                    Arc::clone(&data),
                    dist.clone(),
                    prior.clone(),
                    updater.clone(),
                )
            })
            .collect();
        Self {
            chains,
            seed: thread_rng().gen::<u64>(),
        }
    }

    /// Sets a new seed, and updates the chains accordingly.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            let chain_seed = seed + i as u64;
            chain.seed = chain_seed;
            chain.rng = SmallRng::seed_from_u64(chain_seed);
        }
        debug!("seeded {} chains from {seed}", self.chains.len());
        self
    }
}

impl<P, D, A> HasChains<FeatureAllocationMatrix> for FeatureAllocationSampler<P, D, A>
where
    P: FeatureParameters + Send,
    D: DataDistribution<P> + Send,
    A: FeatureAllocationPrior + Send,
{
    type Chain = FeatureAllocationChain<P, D, A>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }
}
