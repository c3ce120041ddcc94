//! Euler scheme for SDE integration.
//!
//! Itô interpretation (Euler-Maruyama):
//! ```text
//! X_{n+1} = X_n + F(X_n) h + G(X_n) ΔW_n
//! ```
//!
//! Stratonovich interpretation (Euler-Heun), with the auxiliary point X̄ = X_n + G(X_n) ΔW_n:
//! ```text
//! X_{n+1} = X_n + F(X_n) h + ½ (G(X_n) + G(X̄)) ΔW_n
//! ```
//!
//! Both have strong order 0.5 and weak order 1.0.
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
    system.drift_in(scheme, t, x, ws);

    match scheme {
        Scheme::Ito => {
            for i in 0..x.len() {
                x[i] += ws.drift[i] * h + ws.diffusion[i] * dw[i];
            }
        }
        Scheme::Stratonovich => {
            for i in 0..x.len() {
                ws.support[i] = x[i] + ws.diffusion[i] * dw[i];
            }
            system.diffusion(t, &ws.support, &mut ws.support_diffusion);
            for i in 0..x.len() {
                x[i] += ws.drift[i] * h + 0.5 * (ws.diffusion[i] + ws.support_diffusion[i]) * dw[i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sde::LinearRelaxation;
    use approx::assert_relative_eq;

    #[test]
    fn test_step_ito() {
        let system = LinearRelaxation::new(2, 0.2, Scheme::Ito);
        let mut ws = Workspace::new(2);
        let mut x = vec![1.0, 0.0];
        step(&system, Scheme::Ito, 0.0, &mut x, 0.1, &[0.5, -0.5], &mut ws);
        assert_relative_eq!(x[0], 0.9, epsilon = 1e-12);
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_step_heun_additive() {
        // With additive noise Euler-Heun reduces to Euler-Maruyama
        let system = LinearRelaxation::new(1, 0.2, Scheme::Stratonovich);
        let mut ws = Workspace::new(1);
        let mut x_heun = vec![1.0];
        let mut x_maruyama = vec![1.0];
        step(&system, Scheme::Stratonovich, 0.0, &mut x_heun, 0.1, &[0.3], &mut ws);
        step(&system, Scheme::Ito, 0.0, &mut x_maruyama, 0.1, &[0.3], &mut ws);
        assert_relative_eq!(x_heun[0], x_maruyama[0], epsilon = 1e-12);
    }
}
