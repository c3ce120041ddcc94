//! Unified stepping of deterministic and stochastic simulations.
//!
//! A [`Solver`] owns the state of one run and exactly one integrator, selected at
//! construction by a [`SolverMode`]:
//! - [`SolverMode::Deterministic`]: the drift is integrated by an [`AdaptiveIntegrator`] and
//!   convergence to a steady state is tested after every step;
//! - [`SolverMode::Stochastic`]: the equation is integrated by a [`StochasticIntegrator`];
//!   stochastic runs never converge.
//!
//! The system is passed to every call of [`Solver::step`] so that its parameters can be
//! modified between two steps.
//!
//! # Examples
//!
//! ```
//! use gnw_sim::sde::{LinearRelaxation, Scheme};
//! use gnw_sim::settings::Settings;
//! use gnw_sim::solver::{Solver, SolverMode};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let settings = Settings { time_step: 1.0, ..Settings::default() };
//! let system = LinearRelaxation::new(1, 0.0, Scheme::Ito);
//! let mut solver = Solver::new(SolverMode::Deterministic, &system, vec![1.0], &settings).unwrap();
//! let mut rng = ChaCha8Rng::seed_from_u64(42);
//!
//! while !solver.converged() {
//!     solver.step(&system, &mut rng).unwrap();
//! }
//! assert!((solver.state()[0] - 1.0 / 3.0).abs() < 1e-3);
//! ```
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::GnwError;
use crate::ode::AdaptiveIntegrator;
use crate::sde::{DifferentialSystem, StochasticIntegrator};
use crate::settings::Settings;

/// The kind of simulation performed by a [`Solver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverMode {
    Deterministic,
    Stochastic,
}

impl FromStr for SolverMode {
    type Err = GnwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ode" | "deterministic" => Ok(SolverMode::Deterministic),
            "sde" | "stochastic" => Ok(SolverMode::Stochastic),
            _ => Err(GnwError::InvalidArgument(format!("unknown solver mode {}", s))),
        }
    }
}

#[derive(Debug, Clone)]
enum Integrator {
    Deterministic(AdaptiveIntegrator),
    Stochastic(StochasticIntegrator),
    /// Leaves the state untouched and reports a fixed elapsed time.
    #[cfg(test)]
    Fixed(f64),
}

/// Integrates one run of a differential system by external steps of fixed length.
#[derive(Debug, Clone)]
pub struct Solver {
    integrator: Integrator,
    state: Vec<f64>,
    time: f64,
    external_step: f64,
    absolute_precision: f64,
    relative_precision: f64,
    converged: bool,
    rates: Vec<f64>,
}

impl Solver {
    /// Create a solver starting from `initial_state` at time 0, stepping by
    /// `settings.time_step`.
    pub fn new<S: DifferentialSystem + ?Sized>(
        mode: SolverMode,
        system: &S,
        initial_state: Vec<f64>,
        settings: &Settings,
    ) -> Result<Self, GnwError> {
        let dimension = system.dimension();
        if initial_state.len() != dimension {
            return Err(GnwError::DimensionMismatch(format!(
                "initial state of dimension {} for a system of dimension {}",
                initial_state.len(),
                dimension
            )));
        }

        let integrator = match mode {
            SolverMode::Deterministic => Integrator::Deterministic(AdaptiveIntegrator::new(
                settings.time_step,
                dimension,
                settings.absolute_precision,
                settings.relative_precision,
                settings.max_iterations,
                settings.non_negative,
            )?),
            SolverMode::Stochastic => Integrator::Stochastic(StochasticIntegrator::new(
                settings.stochastic_method,
                settings.scheme,
                settings.time_step_sde,
                settings.time_step,
                dimension,
                settings.non_negative,
            )?),
        };

        Ok(Solver {
            integrator,
            state: initial_state,
            time: 0.0,
            external_step: settings.time_step,
            absolute_precision: settings.absolute_precision,
            relative_precision: settings.relative_precision,
            converged: false,
            rates: vec![0.0; dimension],
        })
    }

    /// Advance the state by one external step and return the elapsed time.
    ///
    /// The elapsed time must be exactly the external step, otherwise the run is aborted
    /// with [`GnwError::StepMismatch`].
    pub fn step<S: DifferentialSystem + ?Sized, R: Rng + ?Sized>(
        &mut self,
        system: &S,
        rng: &mut R,
    ) -> Result<f64, GnwError> {
        let elapsed = match &mut self.integrator {
            Integrator::Deterministic(integrator) => {
                integrator.step(system, self.time, &mut self.state)?
            }
            Integrator::Stochastic(integrator) => {
                integrator.step(system, self.time, &mut self.state, rng)?
            }
            #[cfg(test)]
            Integrator::Fixed(elapsed) => *elapsed,
        };

        if elapsed != self.external_step {
            return Err(GnwError::StepMismatch {
                expected: self.external_step,
                obtained: elapsed,
            });
        }
        self.time += elapsed;

        if self.mode() == SolverMode::Deterministic {
            system.drift(self.time, &self.state, &mut self.rates);
            self.converged = self
                .rates
                .iter()
                .zip(self.state.iter())
                .all(|(dxdt, x)| dxdt.abs() < self.absolute_precision + self.relative_precision * x.abs());
        }

        Ok(elapsed)
    }

    pub fn mode(&self) -> SolverMode {
        match self.integrator {
            Integrator::Deterministic(_) => SolverMode::Deterministic,
            Integrator::Stochastic(_) => SolverMode::Stochastic,
            #[cfg(test)]
            Integrator::Fixed(_) => SolverMode::Deterministic,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> &[f64] {
        &self.state
    }

    /// Consume the solver and return its state.
    pub fn into_state(self) -> Vec<f64> {
        self.state
    }

    /// Returns the time elapsed since the beginning of the run.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn external_step(&self) -> f64 {
        self.external_step
    }

    /// Returns true if the last deterministic step reached a steady state.
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Returns the rates of change evaluated after the last deterministic step.
    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    /// Returns the number of clamped negative excursions of a stochastic run.
    pub fn negative_excursions(&self) -> usize {
        match &self.integrator {
            Integrator::Deterministic(_) => 0,
            Integrator::Stochastic(integrator) => integrator.negative_excursions(),
            #[cfg(test)]
            Integrator::Fixed(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sde::{LinearRelaxation, Scheme};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const SEED: u64 = 42;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("ode".parse::<SolverMode>(), Ok(SolverMode::Deterministic));
        assert_eq!("SDE".parse::<SolverMode>(), Ok(SolverMode::Stochastic));
        assert!(matches!(
            "gillespie".parse::<SolverMode>(),
            Err(GnwError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let system = LinearRelaxation::new(2, 0.0, Scheme::Ito);
        assert!(matches!(
            Solver::new(SolverMode::Deterministic, &system, vec![1.0], &Settings::default()),
            Err(GnwError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_stochastic_step_ratio() {
        let system = LinearRelaxation::new(1, 0.1, Scheme::Ito);
        let settings = Settings {
            time_step: 1.0,
            time_step_sde: 0.3,
            ..Settings::default()
        };
        assert!(matches!(
            Solver::new(SolverMode::Stochastic, &system, vec![1.0], &settings),
            Err(GnwError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_deterministic_convergence() {
        let system = LinearRelaxation::new(2, 0.0, Scheme::Ito);
        let settings = Settings {
            time_step: 0.5,
            ..Settings::default()
        };
        let mut solver =
            Solver::new(SolverMode::Deterministic, &system, vec![1.0, 0.0], &settings).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(SEED);

        assert!(!solver.converged());
        let mut num_steps = 0;
        while !solver.converged() {
            assert_eq!(solver.step(&system, &mut rng).unwrap(), 0.5);
            num_steps += 1;
        }
        assert_eq!(solver.time(), 0.5 * num_steps as f64);
        assert!(solver.rates().iter().all(|r| r.abs() < 1e-3));
        assert_eq!(solver.negative_excursions(), 0);
        assert_eq!(solver.mode(), SolverMode::Deterministic);
    }

    #[test]
    fn test_stochastic_never_converges() {
        let system = LinearRelaxation::new(1, 0.0, Scheme::Ito);
        let settings = Settings {
            time_step: 1.0,
            time_step_sde: 0.1,
            ..Settings::default()
        };
        let mut solver = Solver::new(SolverMode::Stochastic, &system, vec![1.0 / 3.0], &settings).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(SEED);
        for _ in 0..10 {
            solver.step(&system, &mut rng).unwrap();
        }
        assert!(!solver.converged());
        assert_eq!(solver.mode(), SolverMode::Stochastic);
        assert_eq!(solver.time(), 10.0);
    }

    #[test]
    fn test_step_mismatch_is_fatal() {
        let system = LinearRelaxation::new(1, 0.0, Scheme::Ito);
        let settings = Settings {
            time_step: 1.0,
            ..Settings::default()
        };
        let mut solver = Solver::new(SolverMode::Deterministic, &system, vec![1.0], &settings).unwrap();
        solver.integrator = Integrator::Fixed(1.0 - 1e-12);
        let mut rng = ChaCha8Rng::seed_from_u64(SEED);

        assert_eq!(
            solver.step(&system, &mut rng),
            Err(GnwError::StepMismatch {
                expected: 1.0,
                obtained: 1.0 - 1e-12,
            })
        );
        assert_eq!(solver.time(), 0.0);
        assert!(!solver.converged());

        solver.integrator = Integrator::Fixed(1.0);
        assert_eq!(solver.step(&system, &mut rng), Ok(1.0));
        assert_eq!(solver.time(), 1.0);
    }
}
