use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use gnw_sim::ode::AdaptiveIntegrator;
use gnw_sim::sde::{LinearRelaxation, Scheme, StochasticIntegrator, StochasticMethod};
use gnw_sim::utils::derive_seed;

const SEED: u64 = 42;
const NUM_RUNS: usize = 1000;
const NUM_STEPS: usize = 100;

/// Returns the sample mean trajectory of dX = (1 - 3X) dt + 0.2 dW over [0, 1], from X(0) = 1.
fn mean_trajectory(method: StochasticMethod, scheme: Scheme) -> Vec<f64> {
    let system = LinearRelaxation::new(1, 0.2, scheme);
    let mut mean = vec![0.0; NUM_STEPS + 1];

    for run in 0..NUM_RUNS {
        let mut integrator = StochasticIntegrator::new(method, scheme, 0.01, 0.01, 1, false).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(SEED, run as u64));
        let mut x = vec![1.0];
        let mut t = 0.0;
        mean[0] += x[0];
        for point in mean.iter_mut().skip(1) {
            t += integrator.step(&system, t, &mut x, &mut rng).unwrap();
            *point += x[0];
        }
        assert_eq!(integrator.negative_excursions(), 0);
    }

    mean.iter().map(|sum| sum / NUM_RUNS as f64).collect()
}

fn assert_close_to_expected(mean: &[f64]) {
    let system = LinearRelaxation::new(1, 0.2, Scheme::Stratonovich);
    // stationary standard deviation 0.2 / sqrt(6), over sqrt(1000) runs, with some margin
    // for the discretization bias
    let tolerance = 0.02;
    for (i, sample) in mean.iter().enumerate() {
        let expected = system.mean(1.0, i as f64 * 0.01);
        assert!(
            (sample - expected).abs() < tolerance,
            "at point {}: sample mean {} vs expected {}",
            i,
            sample,
            expected
        );
    }
}

#[test]
fn test_milstein_stratonovich_mean() {
    let mean = mean_trajectory(StochasticMethod::Milstein, Scheme::Stratonovich);
    assert_eq!(mean.len(), 101);
    assert_eq!(mean[0], 1.0);
    assert_close_to_expected(&mean);
}

#[test]
fn test_heun_mean() {
    let mean = mean_trajectory(StochasticMethod::EulerMaruyama, Scheme::Stratonovich);
    assert_close_to_expected(&mean);
}

#[test]
fn test_milstein_ito_mean() {
    let mean = mean_trajectory(StochasticMethod::Milstein, Scheme::Ito);
    assert_close_to_expected(&mean);
}

#[test]
fn test_runs_are_reproducible() {
    let system = LinearRelaxation::new(3, 0.2, Scheme::Stratonovich);
    let simulate = || {
        let mut integrator =
            StochasticIntegrator::new(StochasticMethod::Milstein, Scheme::Stratonovich, 0.01, 0.5, 3, true).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(SEED);
        let mut x = vec![1.0, 0.0, 0.5];
        let mut t = 0.0;
        for _ in 0..10 {
            t += integrator.step(&system, t, &mut x, &mut rng).unwrap();
        }
        (t, x)
    };

    let (t, x) = simulate();
    assert_eq!(t, 5.0);
    assert_eq!(simulate(), (t, x));
}

#[test]
fn test_deterministic_limit() {
    let system = LinearRelaxation::new(1, 0.0, Scheme::Stratonovich);
    let mut stochastic =
        StochasticIntegrator::new(StochasticMethod::Milstein, Scheme::Stratonovich, 0.001, 1.0, 1, false).unwrap();
    let mut adaptive = AdaptiveIntegrator::new(1.0, 1, 1e-8, 1e-8, 1000, false).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);

    let mut x = vec![1.0];
    let mut y = vec![1.0];
    assert_eq!(stochastic.step(&system, 0.0, &mut x, &mut rng).unwrap(), 1.0);
    assert_eq!(adaptive.step(&system, 0.0, &mut y).unwrap(), 1.0);

    let expected = system.mean(1.0, 1.0);
    assert!((y[0] - expected).abs() < 1e-6);
    assert!((x[0] - expected).abs() < 1e-2);
}
