//! Stochastic differential equations with diagonal noise.
//!
//! A [`DifferentialSystem`] describes
//!
//! ```text
//! dX = F(t, X) dt + G(t, X) dW
//! ```
//!
//! where G is diagonal, i.e., every state variable receives its own independent Wiener
//! process. The same equation can be read in the Itô or in the Stratonovich sense; both
//! readings coincide for additive noise and otherwise differ by the drift correction
//! ½ G_ii ∂G_ii/∂X_i (see [`DifferentialSystem::drift_in`]).
//!
//! Two one-step algorithms are available through [`StochasticIntegrator`]:
//! - [`StochasticMethod::EulerMaruyama`]: Euler-Maruyama (Itô) or Euler-Heun (Stratonovich),
//!   strong order 0.5;
//! - [`StochasticMethod::Milstein`]: derivative-free Milstein, strong order 1.0.
//!
//! # Examples
//!
//! ```
//! use gnw_sim::sde::{LinearRelaxation, Scheme, StochasticIntegrator, StochasticMethod};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let system = LinearRelaxation::new(1, 0.2, Scheme::Stratonovich);
//! let mut integrator =
//!     StochasticIntegrator::new(StochasticMethod::Milstein, Scheme::Stratonovich, 0.01, 0.1, 1, false)
//!         .unwrap();
//!
//! let mut rng = ChaCha8Rng::seed_from_u64(42);
//! let mut x = vec![1.0];
//! let elapsed = integrator.step(&system, 0.0, &mut x, &mut rng).unwrap();
//! assert_eq!(elapsed, 0.1);
//! ```
pub mod euler;
pub mod integrator;
pub mod milstein;
pub mod system;

pub use integrator::{StochasticIntegrator, StochasticMethod};
pub use system::{DifferentialSystem, GeneNetworkSystem, LinearRelaxation, Scheme};

/// Buffers shared by the one-step algorithms to avoid allocations in the integration loop.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub(crate) drift: Vec<f64>,
    pub(crate) diffusion: Vec<f64>,
    pub(crate) support: Vec<f64>,
    pub(crate) support_diffusion: Vec<f64>,
    pub(crate) shifted: Vec<f64>,
    pub(crate) diffusion_plus: Vec<f64>,
    pub(crate) diffusion_minus: Vec<f64>,
}

impl Workspace {
    pub fn new(dimension: usize) -> Self {
        Workspace {
            drift: vec![0.0; dimension],
            diffusion: vec![0.0; dimension],
            support: vec![0.0; dimension],
            support_diffusion: vec![0.0; dimension],
            shifted: vec![0.0; dimension],
            diffusion_plus: vec![0.0; dimension],
            diffusion_minus: vec![0.0; dimension],
        }
    }

    pub fn dimension(&self) -> usize {
        self.drift.len()
    }

    /// Returns the drift evaluated by the last call to [`DifferentialSystem::drift_in`].
    pub fn drift(&self) -> &[f64] {
        &self.drift
    }

    /// Returns the diffusion evaluated by the last call to [`DifferentialSystem::drift_in`].
    pub fn diffusion(&self) -> &[f64] {
        &self.diffusion
    }
}
