//! Derivative-free Milstein scheme (strong order 1.0).
//!
//! The derivative of the diffusion is replaced by a difference quotient evaluated at the
//! support point X̄ = X_n + F(X_n) h + G(X_n) √h:
//! ```text
//! X_{n+1} = X_n + F h + G ΔW + (G(X̄) - G) / (2√h) * (ΔW² - h)    (Itô)
//! X_{n+1} = X_n + F h + G ΔW + (G(X̄) - G) / (2√h) * ΔW²          (Stratonovich)
//! ```
use super::system::{DifferentialSystem, Scheme};
use super::Workspace;

/// Advance the state by one internal step `h` given the Wiener increments `dw ~ N(0, h)`.
pub fn step<S: DifferentialSystem + ?Sized>(
    system: &S,
    scheme: Scheme,
    t: f64,
    x: &mut [f64],
    h: f64,
    dw: &[f64],
    ws: &mut Workspace,
) {
    let sqrt_h = h.sqrt();
    system.drift_in(scheme, t, x, ws);

    for i in 0..x.len() {
        ws.support[i] = x[i] + ws.drift[i] * h + ws.diffusion[i] * sqrt_h;
    }
    system.diffusion(t, &ws.support, &mut ws.support_diffusion);

    for i in 0..x.len() {
        let dw2 = dw[i] * dw[i];
        let increment = match scheme {
            Scheme::Ito => dw2 - h,
            Scheme::Stratonovich => dw2,
        };
        let correction = (ws.support_diffusion[i] - ws.diffusion[i]) / (2.0 * sqrt_h) * increment;
        x[i] += ws.drift[i] * h + ws.diffusion[i] * dw[i] + correction;
    }
}
