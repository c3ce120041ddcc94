//! Deterministic integration of the drift with the Dormand-Prince 5(4) pair of `ode_solvers`.
//!
//! The solver advances the state by external steps of fixed length. Long external steps
//! destabilize the convergence test and may produce negative concentrations, hence an
//! external step of length H ≥ 10 is split into ceil(10·log10(H)) sub-calls of equal
//! length. Each sub-call is a separate adaptive integration whose last internal step lands
//! exactly on the end of the sub-call.
use nalgebra::DVector;
use ode_solvers::dop_shared::OutputType;
use ode_solvers::{Dopri5, System};

use crate::error::GnwError;
use crate::sde::DifferentialSystem;

/// External steps of at least this length are subdivided.
pub const SUBDIVISION_THRESHOLD: f64 = 10.0;

// step size control of the Dormand-Prince stepper
const SAFETY_FACTOR: f64 = 0.9;
const BETA: f64 = 0.04;
const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 10.0;
const STIFFNESS_CHECK: u32 = 1000;

/// Returns the number of sub-calls used to realize an external step.
pub fn num_sub_steps(external_step: f64) -> usize {
    if external_step < SUBDIVISION_THRESHOLD {
        1
    } else {
        (10.0 * external_step.log10()).ceil() as usize
    }
}

/// The drift of a system seen from the start of a sub-call.
struct Drift<'a, S: DifferentialSystem + ?Sized> {
    system: &'a S,
    t0: f64,
}

impl<'a, S: DifferentialSystem + ?Sized> System<f64, DVector<f64>> for Drift<'a, S> {
    fn system(&self, x: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
        self.system.drift(self.t0 + x, y.as_slice(), dy.as_mut_slice());
    }
}

/// Adaptive integrator realizing external steps of fixed length exactly.
#[derive(Debug, Clone)]
pub struct AdaptiveIntegrator {
    external_step: f64,
    num_sub_steps: usize,
    dimension: usize,
    atol: f64,
    rtol: f64,
    max_iterations: u32,
    non_negative: bool,
}

impl AdaptiveIntegrator {
    /// Create an integrator for states of the given dimension.
    ///
    /// # Parameters
    /// - `external_step`: length of the steps requested by [`AdaptiveIntegrator::step`]
    /// - `atol`, `rtol`: absolute and relative tolerances of the local error
    /// - `max_iterations`: maximum number of internal steps per sub-call
    /// - `non_negative`: clamp negative variables to zero at the end of every sub-call
    pub fn new(
        external_step: f64,
        dimension: usize,
        atol: f64,
        rtol: f64,
        max_iterations: usize,
        non_negative: bool,
    ) -> Result<Self, GnwError> {
        if !(external_step > 0.0) || !external_step.is_finite() {
            return Err(GnwError::InvalidConfiguration(format!(
                "the integration step must be positive, got {}",
                external_step
            )));
        }
        if !(atol > 0.0 && rtol > 0.0) {
            return Err(GnwError::InvalidConfiguration(
                "tolerances must be positive".to_string(),
            ));
        }
        if max_iterations == 0 {
            return Err(GnwError::InvalidConfiguration(
                "the maximum number of iterations must be positive".to_string(),
            ));
        }

        Ok(AdaptiveIntegrator {
            external_step,
            num_sub_steps: num_sub_steps(external_step),
            dimension,
            atol,
            rtol,
            max_iterations: u32::try_from(max_iterations).unwrap_or(u32::MAX),
            non_negative,
        })
    }

    pub fn external_step(&self) -> f64 {
        self.external_step
    }

    pub fn num_sub_steps(&self) -> usize {
        self.num_sub_steps
    }

    /// Advance `x` from time `t` by one external step and return the elapsed time, which is
    /// exactly the external step.
    pub fn step<S: DifferentialSystem + ?Sized>(
        &mut self,
        system: &S,
        t: f64,
        x: &mut [f64],
    ) -> Result<f64, GnwError> {
        if x.len() != self.dimension || system.dimension() != x.len() {
            return Err(GnwError::DimensionMismatch(format!(
                "state of dimension {} for a system of dimension {}",
                x.len(),
                system.dimension()
            )));
        }

        let mut local = 0.0;
        for i in 0..self.num_sub_steps {
            let target = if i + 1 == self.num_sub_steps {
                self.external_step
            } else {
                self.external_step * (i + 1) as f64 / self.num_sub_steps as f64
            };
            local = self.integrate(system, t, local, target, x)?;
        }
        Ok(local)
    }

    /// Integrate from `t0 + from` to `t0 + to` and return `to`.
    fn integrate<S: DifferentialSystem + ?Sized>(
        &self,
        system: &S,
        t0: f64,
        from: f64,
        to: f64,
        y: &mut [f64],
    ) -> Result<f64, GnwError> {
        let span = to - from;
        let mut stepper = Dopri5::from_param(
            Drift { system, t0 },
            from,
            to,
            span,
            DVector::from_column_slice(y),
            self.rtol,
            self.atol,
            SAFETY_FACTOR,
            BETA,
            FAC_MIN,
            FAC_MAX,
            span,
            0.0,
            self.max_iterations,
            STIFFNESS_CHECK,
            OutputType::Sparse,
        );

        let stats = stepper.integrate().map_err(|e| {
            GnwError::IntegrationFailure(format!("{:?} between times {} and {}", e, t0 + from, t0 + to))
        })?;
        log::trace!(
            "sub-call to time {}: {} accepted and {} rejected steps",
            t0 + to,
            stats.accepted_steps,
            stats.rejected_steps
        );

        let last = stepper.y_out().last().ok_or_else(|| {
            GnwError::IntegrationFailure(format!("no output at time {}", t0 + to))
        })?;
        y.copy_from_slice(last.as_slice());
        if self.non_negative {
            y.iter_mut().for_each(|yi| *yi = yi.max(0.0));
        }

        Ok(to)
    }
}
