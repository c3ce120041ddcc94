//! Steady-state assays: one simulated state per perturbation.
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::{max_mrna, Assay, AssayCore, CancellationToken, InitialCondition, RunOutcome, MIN_PARALLEL_RUNS};
use crate::error::GnwError;
use crate::network::GeneNetwork;
use crate::perturbation::Perturbation;
use crate::sde::GeneNetworkSystem;
use crate::settings::Settings;
use crate::solver::{Solver, SolverMode};
use crate::utils::{derive_seed, max_rate_of_change};

/// The result of a single steady-state run.
struct SteadyState {
    state: Vec<f64>,
    outcome: RunOutcome,
}

/// Simulates the steady state of the network after each perturbation.
///
/// Deterministic runs stop as soon as the solver reports convergence, or at
/// `max_time_steady_state_ode`. Stochastic runs are simulated for a fixed duration, either
/// `max_time_steady_state_sde` or the convergence time of the corresponding deterministic
/// run (see [`SteadyStateAssay::set_convergence_times`]).
#[derive(Debug)]
pub struct SteadyStateAssay {
    core: AssayCore,
    perturbation: Option<Perturbation>,
    num_genes: usize,
    steady_states: DMatrix<f64>,
    outcomes: Vec<RunOutcome>,
    convergence_times: Option<Vec<f64>>,
}

impl SteadyStateAssay {
    /// Create a steady-state assay. Without perturbation, a single wild-type run is simulated.
    pub fn new(
        mode: SolverMode,
        perturbation: Option<Perturbation>,
        label: &str,
        settings: &Settings,
    ) -> Result<Self, GnwError> {
        Ok(SteadyStateAssay {
            core: AssayCore::new(mode, label, settings)?,
            perturbation,
            num_genes: 0,
            steady_states: DMatrix::zeros(0, 0),
            outcomes: vec![],
            convergence_times: None,
        })
    }

    /// Share a cancellation token with the assay, checked before every run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.core.cancellation = token;
        self
    }

    /// Draw from the given generator instead of one seeded from the settings.
    pub fn with_rng(mut self, rng: ChaCha8Rng) -> Self {
        self.core.share_rng(rng);
        self
    }

    /// Returns the number of runs, i.e., the number of perturbations.
    pub fn num_runs(&self) -> usize {
        self.perturbation
            .as_ref()
            .map_or(1, |perturbation| perturbation.num_perturbations())
    }

    pub fn perturbation(&self) -> Option<&Perturbation> {
        self.perturbation.as_ref()
    }

    /// Returns the steady states, one row per run, mRNA levels followed by protein levels.
    pub fn steady_states(&self) -> &DMatrix<f64> {
        &self.steady_states
    }

    /// Returns the mRNA levels, one row per run.
    pub fn mrna(&self) -> DMatrix<f64> {
        self.steady_states.columns(0, self.num_genes).into_owned()
    }

    /// Returns the protein levels, one row per run, if translation is modeled.
    pub fn proteins(&self) -> Option<DMatrix<f64>> {
        (self.core.settings.model_translation && self.steady_states.ncols() == 2 * self.num_genes)
            .then(|| self.steady_states.columns(self.num_genes, self.num_genes).into_owned())
    }

    /// Returns how each run ended.
    pub fn outcomes(&self) -> &[RunOutcome] {
        &self.outcomes
    }

    /// Returns the duration of every run, i.e., the time of convergence of deterministic runs.
    pub fn convergence_times(&self) -> Vec<f64> {
        self.outcomes.iter().map(|outcome| outcome.time()).collect()
    }

    /// Set the duration of the stochastic runs, one entry per run. Used when
    /// `max_time_steady_state_sde` is not set, typically with the convergence times of a
    /// deterministic assay on the same perturbations.
    pub fn set_convergence_times(&mut self, times: Vec<f64>) -> Result<(), GnwError> {
        if times.len() != self.num_runs() {
            return Err(GnwError::DimensionMismatch(format!(
                "{} convergence times for {} runs",
                times.len(),
                self.num_runs()
            )));
        }
        self.convergence_times = Some(times);
        Ok(())
    }

    fn check_configuration<N: GeneNetwork + ?Sized>(&self, network: &N) -> Result<(), GnwError> {
        if let Some(perturbation) = &self.perturbation {
            if perturbation.num_genes() != network.num_genes() {
                return Err(GnwError::DimensionMismatch(format!(
                    "perturbation of {} genes for a network of {} genes",
                    perturbation.num_genes(),
                    network.num_genes()
                )));
            }
        }
        if self.core.mode == SolverMode::Stochastic
            && self.core.settings.max_time_steady_state_sde.is_none()
            && self.convergence_times.is_none()
        {
            return Err(GnwError::InvalidConfiguration(
                "stochastic steady states require either max_time_steady_state_sde or the convergence times of the deterministic runs".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the time limit of run k.
    fn max_time(&self, k: usize) -> f64 {
        match self.core.mode {
            SolverMode::Deterministic => self.core.settings.max_time_steady_state_ode,
            SolverMode::Stochastic => match (self.core.settings.max_time_steady_state_sde, &self.convergence_times) {
                (Some(maxt), _) => maxt,
                (None, Some(times)) => times[k],
                // ruled out by check_configuration
                (None, None) => self.core.settings.max_time_steady_state_ode,
            },
        }
    }

    fn log_start(&self) {
        log::info!(
            "Simulating steady-state {} using {} ({} runs)...",
            self.core.label,
            match self.core.mode {
                SolverMode::Deterministic => "ODEs",
                SolverMode::Stochastic => "SDEs",
            },
            self.num_runs()
        );
    }

    fn store(&mut self, results: Vec<SteadyState>, dimension: usize) {
        self.steady_states = DMatrix::from_fn(results.len(), dimension, |k, i| results[k].state[i]);
        self.outcomes = results.into_iter().map(|result| result.outcome).collect();

        if self.core.mode == SolverMode::Deterministic {
            let longest = self.outcomes.iter().map(|outcome| outcome.time()).fold(0.0, f64::max);
            log::info!("Duration of the longest steady-state run = {}", longest);
        }
    }

    /// Simulate the runs in parallel. Every run works on its own copy of the network and
    /// its own generator, derived from the seed of the assay and the run index. Results do
    /// not depend on the number of threads but differ from those of [`Assay::run`].
    pub fn run_par<N>(&mut self, network: &N, initial_condition: &InitialCondition) -> Result<(), GnwError>
    where
        N: GeneNetwork + Clone + Sync,
    {
        self.check_configuration(network)?;
        self.log_start();

        let simulate = |k: usize| -> Result<SteadyState, GnwError> {
            self.core.cancellation.check()?;
            let mut local = network.clone();
            if let Some(perturbation) = &self.perturbation {
                perturbation.apply(k, &mut local)?;
            }
            let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(self.core.seed, k as u64));
            simulate_steady_state(
                &local,
                initial_condition,
                self.max_time(k),
                self.core.mode,
                &self.core.settings,
                &mut rng,
            )
        };

        let results = if self.num_runs() >= MIN_PARALLEL_RUNS {
            (0..self.num_runs())
                .into_par_iter()
                .map(simulate)
                .collect::<Result<Vec<SteadyState>, GnwError>>()?
        } else {
            (0..self.num_runs())
                .map(simulate)
                .collect::<Result<Vec<SteadyState>, GnwError>>()?
        };

        self.num_genes = network.num_genes();
        self.store(results, network.state_dimension(self.core.settings.model_translation));
        Ok(())
    }
}

impl Assay for SteadyStateAssay {
    fn label(&self) -> &str {
        &self.core.label
    }

    fn mode(&self) -> SolverMode {
        self.core.mode
    }

    /// Simulate the runs one after the other on the network, applying perturbation k before
    /// run k and restoring the wild type after it.
    fn run<N: GeneNetwork + ?Sized>(
        &mut self,
        network: &mut N,
        initial_condition: &InitialCondition,
    ) -> Result<(), GnwError> {
        self.check_configuration(network)?;
        self.log_start();

        let mut results = Vec::with_capacity(self.num_runs());
        for k in 0..self.num_runs() {
            self.core.cancellation.check()?;
            log::debug!("Steady-state run {} of {}", k + 1, self.num_runs());

            let maxt = self.max_time(k);
            if let Some(perturbation) = &self.perturbation {
                perturbation.apply(k, network)?;
            }
            let result = simulate_steady_state(
                &*network,
                initial_condition,
                maxt,
                self.core.mode,
                &self.core.settings,
                &mut self.core.rng,
            );
            if let Some(perturbation) = &self.perturbation {
                perturbation.restore_wild_type(network)?;
            }
            results.push(result?);
        }

        self.num_genes = network.num_genes();
        self.store(results, network.state_dimension(self.core.settings.model_translation));
        Ok(())
    }

    fn add_noise(&mut self) -> Result<(), GnwError> {
        self.core.add_noise(&mut [&mut self.steady_states], self.num_genes)
    }

    fn normalize(&mut self, max: f64) -> Result<(), GnwError> {
        self.core.normalize(&mut [&mut self.steady_states], max)
    }

    fn max_concentration(&self) -> f64 {
        max_mrna([&self.steady_states], self.num_genes)
    }

    fn noise_added(&self) -> bool {
        self.core.noise_added()
    }
}

/// Integrate the network from the initial condition until convergence or `maxt`.
fn simulate_steady_state<N: GeneNetwork + ?Sized, R: Rng + ?Sized>(
    network: &N,
    initial_condition: &InitialCondition,
    maxt: f64,
    mode: SolverMode,
    settings: &Settings,
    rng: &mut R,
) -> Result<SteadyState, GnwError> {
    let system = GeneNetworkSystem::new(network, settings);
    let xy0 = initial_condition.resolve(network, settings.model_translation)?;
    let mut solver = Solver::new(mode, &system, xy0, settings)?;

    loop {
        solver.step(&system, rng)?;
        if solver.converged() || solver.time() >= maxt {
            break;
        }
    }

    let t = solver.time();
    let outcome = match mode {
        SolverMode::Deterministic if solver.converged() => RunOutcome::Converged { time: t },
        SolverMode::Deterministic => {
            log::warn!("Steady-state run timed out at t = {} without converging", t);
            RunOutcome::TimedOut { time: t }
        }
        SolverMode::Stochastic => RunOutcome::Completed { time: t },
    };

    let mut dxydt = vec![0.0; solver.state().len()];
    network.compute_dxydt(solver.state(), settings.model_translation, &mut dxydt);
    log::info!(
        "Saved state at t = {}, with maximum |dx_i/dt| = {}",
        t,
        max_rate_of_change(&dxydt)
    );
    if solver.negative_excursions() > 0 {
        log::info!(
            "SDE: {} times a concentration became negative due to noise and was set to 0",
            solver.negative_excursions()
        );
    }

    Ok(SteadyState {
        state: solver.into_state(),
        outcome,
    })
}
