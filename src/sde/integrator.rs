//! Fixed-step stochastic integration over external steps.
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::system::{DifferentialSystem, Scheme};
use super::{euler, milstein, Workspace};
use crate::error::GnwError;

/// Tolerance on the ratio between the external and the internal step.
pub const STEP_RATIO_TOLERANCE: f64 = 1e-9;

/// The one-step algorithm used by a [`StochasticIntegrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StochasticMethod {
    /// Euler-Maruyama (Itô) or Euler-Heun (Stratonovich).
    #[serde(rename = "euler")]
    EulerMaruyama,
    #[serde(rename = "milstein")]
    Milstein,
}

impl FromStr for StochasticMethod {
    type Err = GnwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "euler" | "euler-maruyama" | "euler-heun" => Ok(StochasticMethod::EulerMaruyama),
            "milstein" => Ok(StochasticMethod::Milstein),
            _ => Err(GnwError::UnknownScheme(s.to_string())),
        }
    }
}

/// Integrates a [`DifferentialSystem`] over external steps made of a whole number of
/// internal steps.
#[derive(Debug, Clone)]
pub struct StochasticIntegrator {
    method: StochasticMethod,
    scheme: Scheme,
    h: f64,
    external_step: f64,
    num_internal_steps: usize,
    non_negative: bool,
    negative_excursions: usize,
    dw: Vec<f64>,
    workspace: Workspace,
}

impl StochasticIntegrator {
    /// Create an integrator advancing states of the given dimension by `external_step`
    /// in internal steps of `h`. The external step must be a multiple of `h`.
    pub fn new(
        method: StochasticMethod,
        scheme: Scheme,
        h: f64,
        external_step: f64,
        dimension: usize,
        non_negative: bool,
    ) -> Result<Self, GnwError> {
        if !(h > 0.0) || !(external_step > 0.0) {
            return Err(GnwError::InvalidConfiguration(format!(
                "steps must be positive, got internal {} and external {}",
                h, external_step
            )));
        }
        let ratio = external_step / h;
        let num_internal_steps = ratio.round();
        if num_internal_steps < 1.0
            || (ratio - num_internal_steps).abs() > STEP_RATIO_TOLERANCE * num_internal_steps
        {
            return Err(GnwError::InvalidConfiguration(format!(
                "the internal step {} does not divide the external step {}",
                h, external_step
            )));
        }

        Ok(StochasticIntegrator {
            method,
            scheme,
            h,
            external_step,
            num_internal_steps: num_internal_steps as usize,
            non_negative,
            negative_excursions: 0,
            dw: vec![0.0; dimension],
            workspace: Workspace::new(dimension),
        })
    }

    pub fn method(&self) -> StochasticMethod {
        self.method
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns the internal step.
    pub fn internal_step(&self) -> f64 {
        self.h
    }

    pub fn external_step(&self) -> f64 {
        self.external_step
    }

    /// Returns the number of internal steps after which at least one variable was clamped.
    pub fn negative_excursions(&self) -> usize {
        self.negative_excursions
    }

    /// Advance `x` from time `t` by one external step and return the elapsed time.
    ///
    /// Every internal step draws a fresh increment ΔW_i ~ N(0, h) for each variable.
    pub fn step<S: DifferentialSystem + ?Sized, R: Rng + ?Sized>(
        &mut self,
        system: &S,
        t: f64,
        x: &mut [f64],
        rng: &mut R,
    ) -> Result<f64, GnwError> {
        if x.len() != self.workspace.dimension() || system.dimension() != x.len() {
            return Err(GnwError::DimensionMismatch(format!(
                "state of dimension {} for a system of dimension {}",
                x.len(),
                system.dimension()
            )));
        }

        let sqrt_h = self.h.sqrt();
        for k in 0..self.num_internal_steps {
            let tk = t + k as f64 * self.h;
            for dwi in self.dw.iter_mut() {
                let z: f64 = StandardNormal.sample(rng);
                *dwi = sqrt_h * z;
            }

            match self.method {
                StochasticMethod::EulerMaruyama => {
                    euler::step(system, self.scheme, tk, x, self.h, &self.dw, &mut self.workspace)
                }
                StochasticMethod::Milstein => {
                    milstein::step(system, self.scheme, tk, x, self.h, &self.dw, &mut self.workspace)
                }
            }

            if x.iter().any(|xi| !xi.is_finite()) {
                return Err(GnwError::IntegrationFailure(format!(
                    "non-finite state at time {}",
                    tk + self.h
                )));
            }

            if self.non_negative && x.iter().any(|xi| *xi < 0.0) {
                x.iter_mut().for_each(|xi| *xi = xi.max(0.0));
                self.negative_excursions += 1;
            }
        }

        Ok(self.external_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sde::LinearRelaxation;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const SEED: u64 = 42;

    #[test]
    fn test_method_from_str() {
        assert_eq!("milstein".parse::<StochasticMethod>(), Ok(StochasticMethod::Milstein));
        assert_eq!("Euler-Heun".parse::<StochasticMethod>(), Ok(StochasticMethod::EulerMaruyama));
        assert!(matches!(
            "runge-kutta".parse::<StochasticMethod>(),
            Err(GnwError::UnknownScheme(_))
        ));
    }

    #[test]
    fn test_step_ratio() {
        assert!(StochasticIntegrator::new(StochasticMethod::Milstein, Scheme::Ito, 0.01, 1.0, 1, true).is_ok());
        assert!(StochasticIntegrator::new(StochasticMethod::Milstein, Scheme::Ito, 1.0, 50.0, 1, true).is_ok());
        assert!(matches!(
            StochasticIntegrator::new(StochasticMethod::Milstein, Scheme::Ito, 0.3, 1.0, 1, true),
            Err(GnwError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            StochasticIntegrator::new(StochasticMethod::EulerMaruyama, Scheme::Ito, 2.0, 1.0, 1, true),
            Err(GnwError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_step_returns_external_step() {
        let system = LinearRelaxation::new(3, 0.2, Scheme::Ito);
        let mut integrator =
            StochasticIntegrator::new(StochasticMethod::EulerMaruyama, Scheme::Ito, 0.1, 0.7, 3, false).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(SEED);
        let mut x = vec![1.0; 3];
        for _ in 0..10 {
            assert_eq!(integrator.step(&system, 0.0, &mut x, &mut rng).unwrap(), 0.7);
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let system = LinearRelaxation::new(2, 0.2, Scheme::Ito);
        let mut integrator =
            StochasticIntegrator::new(StochasticMethod::Milstein, Scheme::Ito, 0.1, 0.1, 3, false).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(SEED);
        let mut x = vec![1.0; 3];
        assert!(matches!(
            integrator.step(&system, 0.0, &mut x, &mut rng),
            Err(GnwError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_non_negative() {
        // Relaxation towards 1/3 with strong noise around zero
        let system = LinearRelaxation::new(4, 2.0, Scheme::Ito);
        let mut integrator =
            StochasticIntegrator::new(StochasticMethod::EulerMaruyama, Scheme::Ito, 0.1, 10.0, 4, true).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(SEED);
        let mut x = vec![0.0; 4];
        integrator.step(&system, 0.0, &mut x, &mut rng).unwrap();

        assert!(x.iter().all(|xi| *xi >= 0.0));
        assert!(integrator.negative_excursions() > 0);
        assert!(integrator.negative_excursions() <= 100);
    }

    #[test]
    fn test_seeded_replay() {
        let system = LinearRelaxation::new(2, 0.2, Scheme::Stratonovich);
        let run = || {
            let mut integrator = StochasticIntegrator::new(
                StochasticMethod::Milstein,
                Scheme::Stratonovich,
                0.01,
                1.0,
                2,
                false,
            )
            .unwrap();
            let mut rng = ChaCha8Rng::seed_from_u64(SEED);
            let mut x = vec![1.0, 1.0];
            integrator.step(&system, 0.0, &mut x, &mut rng).unwrap();
            x
        };
        assert_eq!(run(), run());
    }
}
