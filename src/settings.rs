//! Simulation settings shared by the solvers and the assays.
//!
//! A [`Settings`] value is created once (usually from a JSON file) and passed by reference
//! to every solver and assay constructor. Defaults reproduce the values commonly used to
//! generate benchmark datasets.
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::GnwError;
use crate::sde::{Scheme, StochasticMethod};

/// Numerical and noise parameters of a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seed of the random number generator, drawn from the OS entropy if `None`.
    pub random_seed: Option<u64>,
    /// Whether proteins are simulated in addition to mRNA.
    pub model_translation: bool,
    /// External integration step, i.e., the interval between two saved states.
    pub time_step: f64,
    /// Duration of the time series.
    pub duration_time_series: f64,
    /// Number of time series generated when no perturbation is given.
    pub num_time_series: usize,
    /// Maximum duration of a deterministic steady-state run.
    pub max_time_steady_state_ode: f64,
    /// Duration of a stochastic steady-state run. If `None`, the convergence times of the
    /// deterministic runs are used instead.
    pub max_time_steady_state_sde: Option<f64>,
    /// Absolute precision of the convergence test.
    pub absolute_precision: f64,
    /// Relative precision of the convergence test and tolerance of the adaptive integrator.
    pub relative_precision: f64,
    /// Maximum number of internal steps per call of the adaptive integrator.
    pub max_iterations: usize,
    /// Internal step of the stochastic integrators.
    pub time_step_sde: f64,
    /// Scaling of the diffusion term.
    pub noise_coefficient_sde: f64,
    /// Interpretation of the stochastic differential equations.
    pub scheme: Scheme,
    /// Stochastic integration method.
    pub stochastic_method: StochasticMethod,
    /// Clamp negative concentrations to zero after each stochastic step.
    pub non_negative: bool,
    /// Coefficient of variation of multifactorial perturbations.
    pub multifactorial_stdev: f64,
    /// Probability for a gene to be perturbed in a time-series perturbation.
    pub perturbation_probability: f64,
    /// Multiplicative factor applied to the maximum transcription rate in knockdowns.
    pub knockdown_factor: f64,
    pub add_normal_noise: bool,
    pub add_lognormal_noise: bool,
    pub add_microarray_noise: bool,
    pub normal_stdev: f64,
    pub lognormal_stdev: f64,
    /// Normalize the dataset by its maximum mRNA concentration after adding noise.
    pub normalize_after_adding_noise: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            random_seed: None,
            model_translation: true,
            time_step: 50.0,
            duration_time_series: 1000.0,
            num_time_series: 10,
            max_time_steady_state_ode: 2000.0,
            max_time_steady_state_sde: None,
            absolute_precision: 1e-5,
            relative_precision: 1e-3,
            max_iterations: 1000,
            time_step_sde: 1.0,
            noise_coefficient_sde: 0.05,
            scheme: Scheme::Stratonovich,
            stochastic_method: StochasticMethod::Milstein,
            non_negative: true,
            multifactorial_stdev: 0.33,
            perturbation_probability: 0.33,
            knockdown_factor: 0.5,
            add_normal_noise: false,
            add_lognormal_noise: false,
            add_microarray_noise: true,
            normal_stdev: 0.025,
            lognormal_stdev: 0.075,
            normalize_after_adding_noise: false,
        }
    }
}

impl Settings {
    /// Check the consistency of the settings.
    pub fn validate(&self) -> Result<(), GnwError> {
        let positives = [
            ("time_step", self.time_step),
            ("duration_time_series", self.duration_time_series),
            ("max_time_steady_state_ode", self.max_time_steady_state_ode),
            ("absolute_precision", self.absolute_precision),
            ("relative_precision", self.relative_precision),
            ("time_step_sde", self.time_step_sde),
        ];
        for (name, value) in positives {
            if !(value > 0.0) || !value.is_finite() {
                return Err(GnwError::InvalidConfiguration(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }

        if let Some(maxt) = self.max_time_steady_state_sde {
            if !(maxt > 0.0) {
                return Err(GnwError::InvalidConfiguration(format!(
                    "max_time_steady_state_sde must be positive, got {}",
                    maxt
                )));
            }
        }

        let nonnegatives = [
            ("noise_coefficient_sde", self.noise_coefficient_sde),
            ("multifactorial_stdev", self.multifactorial_stdev),
            ("knockdown_factor", self.knockdown_factor),
            ("normal_stdev", self.normal_stdev),
            ("lognormal_stdev", self.lognormal_stdev),
        ];
        for (name, value) in nonnegatives {
            if !(value >= 0.0) {
                return Err(GnwError::InvalidConfiguration(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.perturbation_probability) {
            return Err(GnwError::InvalidConfiguration(format!(
                "perturbation_probability must be in [0, 1], got {}",
                self.perturbation_probability
            )));
        }

        if self.max_iterations == 0 {
            return Err(GnwError::InvalidConfiguration(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        if self.add_microarray_noise && (self.add_normal_noise || self.add_lognormal_noise) {
            return Err(GnwError::InvalidConfiguration(
                "microarray noise cannot be combined with normal or lognormal noise".to_string(),
            ));
        }

        Ok(())
    }

    /// Save the settings to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), GnwError> {
        let file = File::create(path).map_err(|e| GnwError::IOError(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| GnwError::IOError(e.to_string()))?;
        writer.flush().map_err(|e| GnwError::IOError(e.to_string()))
    }

    /// Load the settings from a file. Missing fields take their default value.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, GnwError> {
        let file = File::open(path).map_err(|e| GnwError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        let settings: Settings =
            serde_json::from_reader(reader).map_err(|e| GnwError::IOError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}
