//! Differential systems and their stochastic interpretation.
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::Workspace;
use crate::error::GnwError;
use crate::network::GeneNetwork;
use crate::settings::Settings;

/// Relative step of the central finite differences used for the scheme conversion.
pub const FINITE_DIFFERENCE_STEP: f64 = 1e-6;

/// Interpretation of the stochastic integral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Ito,
    Stratonovich,
}

impl FromStr for Scheme {
    type Err = GnwError;

    /// Returns the scheme from a string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ito" | "itô" => Ok(Scheme::Ito),
            "stratonovich" => Ok(Scheme::Stratonovich),
            _ => Err(GnwError::UnknownScheme(s.to_string())),
        }
    }
}

/// A system dX = F(t, X) dt + G(t, X) dW with diagonal diffusion.
pub trait DifferentialSystem {
    /// Returns the dimension of the state.
    fn dimension(&self) -> usize;

    /// Returns the interpretation in which drift and diffusion are defined.
    fn scheme(&self) -> Scheme;

    /// Evaluate the drift F(t, x) into `f`.
    fn drift(&self, t: f64, x: &[f64], f: &mut [f64]);

    /// Evaluate the diagonal of the diffusion G(t, x) into `g`.
    fn diffusion(&self, t: f64, x: &[f64], g: &mut [f64]);

    /// Evaluate drift and diffusion at once.
    fn drift_and_diffusion(&self, t: f64, x: &[f64], f: &mut [f64], g: &mut [f64]) {
        self.drift(t, x, f);
        self.diffusion(t, x, g);
    }

    /// Evaluate the drift of the equivalent equation in the `target` interpretation into
    /// `ws.drift`, and the diffusion into `ws.diffusion`.
    ///
    /// For diagonal noise the conversion only involves the diagonal of the Jacobian of G:
    /// ```text
    /// F_strat = F_ito - ½ G_ii ∂G_ii/∂x_i
    /// ```
    /// The derivatives are obtained by central finite differences.
    fn drift_in(&self, target: Scheme, t: f64, x: &[f64], ws: &mut Workspace) {
        self.drift(t, x, &mut ws.drift);
        self.diffusion(t, x, &mut ws.diffusion);
        let sign = match (self.scheme(), target) {
            (Scheme::Ito, Scheme::Stratonovich) => -1.0,
            (Scheme::Stratonovich, Scheme::Ito) => 1.0,
            _ => return,
        };

        ws.shifted.copy_from_slice(x);
        for i in 0..x.len() {
            let orig = x[i];
            let h = FINITE_DIFFERENCE_STEP * (1.0 + orig.abs());
            ws.shifted[i] = orig + h;
            self.diffusion(t, &ws.shifted, &mut ws.diffusion_plus);
            ws.shifted[i] = orig - h;
            self.diffusion(t, &ws.shifted, &mut ws.diffusion_minus);
            ws.shifted[i] = orig;

            let dg = (ws.diffusion_plus[i] - ws.diffusion_minus[i]) / (2.0 * h);
            ws.drift[i] += sign * 0.5 * ws.diffusion[i] * dg;
        }
    }
}

/// The chemical Langevin equation of a gene network.
///
/// The drift is the deterministic rate of change of the network. Production and
/// degradation fluxes of every variable are merged into one Wiener term:
/// ```text
/// G_ii = c * sqrt(production_i + degradation_i)
/// ```
/// The equation is defined in the Itô sense.
pub struct GeneNetworkSystem<'a, N: GeneNetwork + ?Sized> {
    network: &'a N,
    translation: bool,
    noise_coefficient: f64,
    scheme: Scheme,
}

impl<'a, N: GeneNetwork + ?Sized> GeneNetworkSystem<'a, N> {
    /// Create the system of a network with the noise coefficient and translation flag of
    /// the settings.
    pub fn new(network: &'a N, settings: &Settings) -> Self {
        GeneNetworkSystem {
            network,
            translation: settings.model_translation,
            noise_coefficient: settings.noise_coefficient_sde,
            scheme: Scheme::Ito,
        }
    }

    /// Returns the network of the system.
    pub fn network(&self) -> &N {
        self.network
    }

    /// Returns true if protein concentrations are part of the state.
    pub fn translation(&self) -> bool {
        self.translation
    }
}

impl<'a, N: GeneNetwork + ?Sized> DifferentialSystem for GeneNetworkSystem<'a, N> {
    fn dimension(&self) -> usize {
        self.network.state_dimension(self.translation)
    }

    fn scheme(&self) -> Scheme {
        self.scheme
    }

    fn drift(&self, _t: f64, x: &[f64], f: &mut [f64]) {
        self.network.compute_dxydt(x, self.translation, f);
    }

    fn diffusion(&self, _t: f64, x: &[f64], g: &mut [f64]) {
        for (variable, gi) in g.iter_mut().enumerate() {
            let (production, degradation) = self.network.fluxes(x, self.translation, variable);
            *gi = self.noise_coefficient * (production + degradation).max(0.0).sqrt();
        }
    }
}

/// Linear relaxation towards 1/3 with additive noise, dX = (1 - 3X) dt + σ dW.
///
/// Starting from X(0) = 1, the mean trajectory is 2/3 exp(-3t) + 1/3 whatever the scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRelaxation {
    dimension: usize,
    sigma: f64,
    scheme: Scheme,
}

impl LinearRelaxation {
    pub fn new(dimension: usize, sigma: f64, scheme: Scheme) -> Self {
        LinearRelaxation {
            dimension,
            sigma,
            scheme,
        }
    }

    /// Returns the expected value at time t when starting from x0.
    pub fn mean(&self, x0: f64, t: f64) -> f64 {
        (x0 - 1.0 / 3.0) * (-3.0 * t).exp() + 1.0 / 3.0
    }
}

impl DifferentialSystem for LinearRelaxation {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn scheme(&self) -> Scheme {
        self.scheme
    }

    fn drift(&self, _t: f64, x: &[f64], f: &mut [f64]) {
        for (fi, xi) in f.iter_mut().zip(x.iter()) {
            *fi = 1.0 - 3.0 * xi;
        }
    }

    fn diffusion(&self, _t: f64, _x: &[f64], g: &mut [f64]) {
        g.fill(self.sigma);
    }
}
