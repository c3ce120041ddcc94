//! Measurement noise applied to simulated concentrations.
//!
//! Three scalar transforms are provided:
//! - [`additive_gaussian`]: x + N(0, σ²);
//! - [`multiplicative_lognormal`]: 10^N(log10(x), σ²);
//! - [`microarray`]: the two-parameter model of Tu et al. (2002), where the variance of the
//!   log-ratio decreases with the concentration.
//!
//! [`NoiseModel`] combines them as configured in [`Settings`] and clamps the result at zero.
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::GnwError;
use crate::settings::Settings;

/// Variance of the microarray noise at high concentrations.
pub const MICROARRAY_ALPHA: f64 = 0.001;
/// Variance of the microarray noise at low concentrations.
pub const MICROARRAY_BETA: f64 = 0.69;
/// Concentration at which the microarray variance is halfway between beta and alpha.
pub const MICROARRAY_K: f64 = 0.01;

fn normal(mean: f64, stdev: f64) -> Result<Normal<f64>, GnwError> {
    Normal::new(mean, stdev).map_err(|e| GnwError::InvalidParameter(e.to_string()))
}

/// Returns x plus a centered Gaussian sample of standard deviation `stdev`.
pub fn additive_gaussian<R: Rng + ?Sized>(x: f64, stdev: f64, rng: &mut R) -> Result<f64, GnwError> {
    Ok(x + normal(0.0, stdev)?.sample(rng))
}

/// Returns x perturbed by a log-normal factor, i.e., log10 of the result is Gaussian around log10(x).
/// Zero is left unchanged.
pub fn multiplicative_lognormal<R: Rng + ?Sized>(
    x: f64,
    stdev: f64,
    rng: &mut R,
) -> Result<f64, GnwError> {
    if x == 0.0 {
        return Ok(0.0);
    }
    let exponent = normal(x.log10(), stdev)?.sample(rng);
    Ok(10_f64.powf(exponent))
}

/// Returns x perturbed by the microarray noise model. Zero is left unchanged.
pub fn microarray<R: Rng + ?Sized>(x: f64, rng: &mut R) -> Result<f64, GnwError> {
    if x == 0.0 {
        return Ok(0.0);
    }
    let variance = MICROARRAY_ALPHA + (MICROARRAY_BETA - MICROARRAY_ALPHA) / (1.0 + x / MICROARRAY_K);
    let epsilon = normal(0.0, variance.sqrt())?.sample(rng);
    Ok(x * epsilon.exp())
}

/// The combination of noise transforms applied to every entry of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseModel {
    normal_stdev: Option<f64>,
    lognormal_stdev: Option<f64>,
    microarray: bool,
}

impl NoiseModel {
    /// Create a noise model. The microarray model cannot be combined with the other two.
    pub fn new(
        normal_stdev: Option<f64>,
        lognormal_stdev: Option<f64>,
        microarray: bool,
    ) -> Result<Self, GnwError> {
        if microarray && (normal_stdev.is_some() || lognormal_stdev.is_some()) {
            return Err(GnwError::InvalidConfiguration(
                "microarray noise cannot be combined with normal or lognormal noise".to_string(),
            ));
        }
        for stdev in normal_stdev.iter().chain(lognormal_stdev.iter()) {
            if !(*stdev >= 0.0) {
                return Err(GnwError::InvalidParameter(format!(
                    "noise standard deviation must be non-negative, got {}",
                    stdev
                )));
            }
        }
        Ok(NoiseModel {
            normal_stdev,
            lognormal_stdev,
            microarray,
        })
    }

    /// Create the noise model described by the settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, GnwError> {
        NoiseModel::new(
            settings.add_normal_noise.then_some(settings.normal_stdev),
            settings.add_lognormal_noise.then_some(settings.lognormal_stdev),
            settings.add_microarray_noise,
        )
    }

    /// Returns true if the model does not alter any value.
    pub fn is_identity(&self) -> bool {
        self.normal_stdev.is_none() && self.lognormal_stdev.is_none() && !self.microarray
    }

    /// Returns a noisy version of the concentration x, which must be non-negative.
    /// The result is clamped at zero.
    pub fn apply<R: Rng + ?Sized>(&self, x: f64, rng: &mut R) -> Result<f64, GnwError> {
        if !(x >= 0.0) {
            return Err(GnwError::InvalidParameter(format!(
                "concentrations must be non-negative, got {}",
                x
            )));
        }

        let mut y = x;
        if let Some(stdev) = self.lognormal_stdev {
            y = multiplicative_lognormal(y, stdev, rng)?;
        }
        if let Some(stdev) = self.normal_stdev {
            y = additive_gaussian(y, stdev, rng)?;
        }
        if self.microarray {
            y = microarray(y, rng)?;
        }

        Ok(y.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SEED: u64 = 42;

    #[test]
    fn test_microarray_zero() {
        let mut rng = StdRng::seed_from_u64(SEED);
        for _ in 0..100 {
            assert_eq!(microarray(0.0, &mut rng).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_microarray_high_concentration() {
        // At high concentration the variance tends to alpha, i.e., a standard deviation of ~3%.
        let mut rng = StdRng::seed_from_u64(SEED);
        let n = 10_000;
        let mean_log = (0..n)
            .map(|_| (microarray(100.0, &mut rng).unwrap() / 100.0).ln())
            .sum::<f64>()
            / n as f64;
        assert_relative_eq!(mean_log, 0.0, epsilon = 5e-3);
    }

    #[test]
    fn test_lognormal_zero_and_positive() {
        let mut rng = StdRng::seed_from_u64(SEED);
        assert_eq!(multiplicative_lognormal(0.0, 0.075, &mut rng).unwrap(), 0.0);
        let y = multiplicative_lognormal(0.5, 0.075, &mut rng).unwrap();
        assert!(y > 0.0);
    }

    #[test]
    fn test_incompatible_models() {
        assert!(matches!(
            NoiseModel::new(Some(0.025), None, true),
            Err(GnwError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_apply() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let model = NoiseModel::new(Some(0.5), Some(0.075), false).unwrap();

        assert!(matches!(
            model.apply(-1.0, &mut rng),
            Err(GnwError::InvalidParameter(_))
        ));
        for _ in 0..1000 {
            assert!(model.apply(0.01, &mut rng).unwrap() >= 0.0);
        }

        let identity = NoiseModel::new(None, None, false).unwrap();
        assert!(identity.is_identity());
        assert_eq!(identity.apply(0.3, &mut rng).unwrap(), 0.3);
    }

    #[test]
    fn test_zero_stdev() {
        let mut rng = StdRng::seed_from_u64(SEED);
        assert_eq!(additive_gaussian(0.2, 0.0, &mut rng).unwrap(), 0.2);
    }
}
