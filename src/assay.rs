//! Simulated experiments producing expression datasets.
//!
//! An assay simulates one run per perturbation index and accumulates the results in dense
//! matrices (one column per state variable, i.e., mRNA levels followed by protein levels
//! when translation is modeled). Two assays are available:
//! - [`SteadyStateAssay`]: one row per run, the state at convergence (or at the time limit);
//! - [`TimeSeriesAssay`]: one matrix per run, the state at regularly spaced time points.
//!
//! Once simulated, a dataset can be corrupted by measurement noise ([`Assay::add_noise`])
//! and normalized ([`Assay::normalize`]), each at most once.
//!
//! The network is borrowed mutably during [`Assay::run`]: perturbations are applied to its
//! live parameters and the wild type is restored after every run, even when the run fails.
use derivative::Derivative;
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::GnwError;
use crate::network::GeneNetwork;
use crate::noise::NoiseModel;
use crate::settings::Settings;
use crate::solver::SolverMode;

pub mod steady_state;
pub mod time_series;

pub use steady_state::SteadyStateAssay;
pub use time_series::TimeSeriesAssay;

/// Minimum number of runs to consider parallel processing.
pub const MIN_PARALLEL_RUNS: usize = 4;

/// The initial condition of the runs of an assay.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialCondition {
    /// A state vector of the dimension of the simulated system.
    Supplied(Vec<f64>),
    /// The steady state of the network in the absence of regulation.
    Estimate,
}

impl InitialCondition {
    /// Returns the initial state of a run on the given network.
    pub fn resolve<N: GeneNetwork + ?Sized>(
        &self,
        network: &N,
        translation: bool,
    ) -> Result<Vec<f64>, GnwError> {
        match self {
            InitialCondition::Supplied(xy0) => {
                let dimension = network.state_dimension(translation);
                if xy0.len() != dimension {
                    return Err(GnwError::DimensionMismatch(format!(
                        "initial condition of dimension {} for {} state variables",
                        xy0.len(),
                        dimension
                    )));
                }
                Ok(xy0.clone())
            }
            InitialCondition::Estimate => Ok(network.unregulated_steady_state(translation)),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunOutcome {
    /// The deterministic run reached a steady state at the given time.
    Converged { time: f64 },
    /// The deterministic run reached its time limit without converging.
    TimedOut { time: f64 },
    /// The run was simulated for a fixed duration.
    Completed { time: f64 },
}

impl RunOutcome {
    pub fn time(&self) -> f64 {
        match *self {
            RunOutcome::Converged { time }
            | RunOutcome::TimedOut { time }
            | RunOutcome::Completed { time } => time,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, RunOutcome::Converged { .. })
    }
}

/// A flag shared with the caller to stop an assay between two runs.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    /// Request the cancellation of the assays holding this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns [`GnwError::Cancelled`] if the cancellation was requested.
    pub fn check(&self) -> Result<(), GnwError> {
        if self.is_cancelled() {
            Err(GnwError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A simulated experiment on a gene network.
pub trait Assay {
    /// Returns the label of the assay, used in logs and file names.
    fn label(&self) -> &str;

    /// Returns the kind of simulation of the assay.
    fn mode(&self) -> SolverMode;

    /// Simulate every run of the assay on the network.
    fn run<N: GeneNetwork + ?Sized>(
        &mut self,
        network: &mut N,
        initial_condition: &InitialCondition,
    ) -> Result<(), GnwError>;

    /// Add measurement noise to the whole dataset. Fails if noise was already added.
    fn add_noise(&mut self) -> Result<(), GnwError>;

    /// Divide the whole dataset, including protein levels, by `max`. Fails if the dataset
    /// was already normalized.
    fn normalize(&mut self, max: f64) -> Result<(), GnwError>;

    /// Returns the maximum mRNA concentration of the dataset.
    fn max_concentration(&self) -> f64;

    /// Returns true once noise has been added to the dataset.
    fn noise_added(&self) -> bool;
}

/// Stream of the generator an assay seeds for itself, distinct from the default stream of a
/// generator seeded by the caller with the same seed.
pub const ASSAY_STREAM: u64 = 1;

/// State shared by all assays: configuration, generator and post-processing flags.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct AssayCore {
    pub(crate) label: String,
    pub(crate) mode: SolverMode,
    pub(crate) settings: Settings,
    pub(crate) noise: NoiseModel,
    pub(crate) seed: u64,
    #[derivative(Debug = "ignore")]
    pub(crate) rng: ChaCha8Rng,
    pub(crate) cancellation: CancellationToken,
    noise_added: bool,
    normalized: bool,
}

impl AssayCore {
    pub(crate) fn new(mode: SolverMode, label: &str, settings: &Settings) -> Result<Self, GnwError> {
        settings.validate()?;
        let noise = NoiseModel::from_settings(settings)?;
        let seed = settings.random_seed.unwrap_or_else(rand::random);
        log::debug!("Assay {} seeded with {}", label, seed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(ASSAY_STREAM);

        Ok(AssayCore {
            label: label.to_string(),
            mode,
            settings: settings.clone(),
            noise,
            seed,
            rng,
            cancellation: CancellationToken::new(),
            noise_added: false,
            normalized: false,
        })
    }

    /// Continue drawing from a generator supplied by the caller. The seed of parallel runs
    /// is drawn from it.
    pub(crate) fn share_rng(&mut self, mut rng: ChaCha8Rng) {
        self.seed = rng.gen();
        self.rng = rng;
    }

    pub(crate) fn noise_added(&self) -> bool {
        self.noise_added
    }

    /// Apply the noise model to every entry of the matrices, then normalize if configured.
    pub(crate) fn add_noise(
        &mut self,
        matrices: &mut [&mut DMatrix<f64>],
        num_genes: usize,
    ) -> Result<(), GnwError> {
        if self.noise_added {
            return Err(GnwError::InvalidConfiguration(format!(
                "noise has already been added to {}",
                self.label
            )));
        }
        let noisy = matrices
            .iter()
            .map(|matrix| {
                matrix
                    .iter()
                    .map(|value| self.noise.apply(*value, &mut self.rng))
                    .collect::<Result<Vec<f64>, GnwError>>()
            })
            .collect::<Result<Vec<Vec<f64>>, GnwError>>()?;
        for (matrix, values) in matrices.iter_mut().zip(noisy) {
            matrix.copy_from_slice(&values);
        }
        self.noise_added = true;
        log::info!("Added measurement noise to {}", self.label);

        if self.settings.normalize_after_adding_noise {
            let max = max_mrna(matrices.iter().map(|m| &**m), num_genes);
            self.normalize(matrices, max)?;
        }
        Ok(())
    }

    pub(crate) fn normalize(&mut self, matrices: &mut [&mut DMatrix<f64>], max: f64) -> Result<(), GnwError> {
        if self.normalized {
            return Err(GnwError::InvalidConfiguration(format!(
                "{} has already been normalized",
                self.label
            )));
        }
        if !(max > 0.0) || !max.is_finite() {
            return Err(GnwError::InvalidParameter(format!(
                "cannot normalize by {}",
                max
            )));
        }
        for matrix in matrices.iter_mut() {
            **matrix /= max;
        }
        self.normalized = true;
        Ok(())
    }
}

/// Returns the maximum of the first `num_genes` columns of the matrices, i.e., the mRNA levels.
pub(crate) fn max_mrna<'a, I>(matrices: I, num_genes: usize) -> f64
where
    I: IntoIterator<Item = &'a DMatrix<f64>>,
{
    matrices
        .into_iter()
        .map(|matrix| {
            matrix
                .columns(0, num_genes.min(matrix.ncols()))
                .iter()
                .fold(0.0, |max: f64, x| x.max(max))
        })
        .fold(0.0, f64::max)
}
