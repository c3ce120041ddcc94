//! Time-series assays: one trajectory per perturbation.
use nalgebra::DMatrix;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::{max_mrna, Assay, AssayCore, CancellationToken, InitialCondition};
use crate::error::GnwError;
use crate::network::GeneNetwork;
use crate::perturbation::Perturbation;
use crate::sde::GeneNetworkSystem;
use crate::settings::Settings;
use crate::solver::{Solver, SolverMode};

/// Offset of the halftime, so that the wild type is restored at the step reaching it.
const HALFTIME_TOLERANCE: f64 = 1e-12;
/// Slack on the number of steps covering the burn-in.
const STEP_COUNT_TOLERANCE: f64 = 1e-9;

/// Simulates the response of the network to each perturbation over a fixed duration.
///
/// The perturbation is applied at time 0 and optionally removed at half the duration.
/// Stochastic runs first simulate the unperturbed network for a tenth of the duration,
/// so that every trajectory starts from a new sample of the wild-type state.
#[derive(Debug)]
pub struct TimeSeriesAssay {
    core: AssayCore,
    perturbation: Option<Perturbation>,
    restore_at_halftime: bool,
    duration: f64,
    num_time_points: usize,
    num_genes: usize,
    trajectories: Vec<DMatrix<f64>>,
}

/// The parameters of a single trajectory.
struct Replicate<'a> {
    index: usize,
    perturbation: Option<&'a Perturbation>,
    restore_at_halftime: bool,
    duration: f64,
    num_time_points: usize,
    mode: SolverMode,
    settings: &'a Settings,
}

impl TimeSeriesAssay {
    /// Create a time-series assay of duration `settings.duration_time_series`, sampled every
    /// `settings.time_step`. The step must divide the duration.
    ///
    /// Without perturbation, `settings.num_time_series` wild-type trajectories are simulated.
    pub fn new(
        mode: SolverMode,
        perturbation: Option<Perturbation>,
        restore_at_halftime: bool,
        label: &str,
        settings: &Settings,
    ) -> Result<Self, GnwError> {
        let core = AssayCore::new(mode, label, settings)?;
        let duration = settings.duration_time_series;
        let dt = settings.time_step;
        let num_time_points = (duration / dt).round() as usize + 1;
        if dt * (num_time_points - 1) as f64 != duration {
            return Err(GnwError::InvalidConfiguration(format!(
                "the duration {} is not a multiple of the time step {}",
                duration, dt
            )));
        }

        Ok(TimeSeriesAssay {
            core,
            perturbation,
            restore_at_halftime,
            duration,
            num_time_points,
            num_genes: 0,
            trajectories: vec![],
        })
    }

    /// Share a cancellation token with the assay, checked before every trajectory.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.core.cancellation = token;
        self
    }

    /// Draw from the given generator instead of one seeded from the settings.
    pub fn with_rng(mut self, rng: ChaCha8Rng) -> Self {
        self.core.share_rng(rng);
        self
    }

    /// Returns the number of trajectories.
    pub fn num_replicates(&self) -> usize {
        self.perturbation
            .as_ref()
            .map_or(self.core.settings.num_time_series, |perturbation| {
                perturbation.num_perturbations()
            })
    }

    pub fn num_time_points(&self) -> usize {
        self.num_time_points
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Returns the sampling times.
    pub fn time_points(&self) -> Vec<f64> {
        (0..self.num_time_points)
            .map(|i| i as f64 * self.core.settings.time_step)
            .collect()
    }

    /// Returns the trajectories, one matrix per replicate with one row per time point,
    /// mRNA levels followed by protein levels.
    pub fn trajectories(&self) -> &[DMatrix<f64>] {
        &self.trajectories
    }

    /// Returns the protein trajectories, if translation is modeled.
    pub fn protein_trajectories(&self) -> Option<Vec<DMatrix<f64>>> {
        self.core.settings.model_translation.then(|| {
            self.trajectories
                .iter()
                .map(|trajectory| trajectory.columns(self.num_genes, self.num_genes).into_owned())
                .collect()
        })
    }
}

impl Assay for TimeSeriesAssay {
    fn label(&self) -> &str {
        &self.core.label
    }

    fn mode(&self) -> SolverMode {
        self.core.mode
    }

    fn run<N: GeneNetwork + ?Sized>(
        &mut self,
        network: &mut N,
        initial_condition: &InitialCondition,
    ) -> Result<(), GnwError> {
        if let Some(perturbation) = &self.perturbation {
            if perturbation.num_genes() != network.num_genes() {
                return Err(GnwError::DimensionMismatch(format!(
                    "perturbation of {} genes for a network of {} genes",
                    perturbation.num_genes(),
                    network.num_genes()
                )));
            }
        }

        log::info!(
            "Simulating time-series {} using {}...",
            self.core.label,
            match self.core.mode {
                SolverMode::Deterministic => "ODEs",
                SolverMode::Stochastic => "SDEs",
            }
        );

        let mut xy0 = initial_condition.resolve(&*network, self.core.settings.model_translation)?;
        let mut trajectories = Vec::with_capacity(self.num_replicates());
        for k in 0..self.num_replicates() {
            self.core.cancellation.check()?;
            log::info!("Simulating time-series number {} ...", k + 1);

            let replicate = Replicate {
                index: k,
                perturbation: self.perturbation.as_ref(),
                restore_at_halftime: self.restore_at_halftime,
                duration: self.duration,
                num_time_points: self.num_time_points,
                mode: self.core.mode,
                settings: &self.core.settings,
            };
            let result = simulate_trajectory(&replicate, network, &mut xy0, &mut self.core.rng);
            if let Some(perturbation) = &self.perturbation {
                perturbation.restore_wild_type(network)?;
            }
            trajectories.push(result?);
        }

        self.num_genes = network.num_genes();
        self.trajectories = trajectories;
        Ok(())
    }

    fn add_noise(&mut self) -> Result<(), GnwError> {
        let mut matrices: Vec<&mut DMatrix<f64>> = self.trajectories.iter_mut().collect();
        self.core.add_noise(&mut matrices, self.num_genes)
    }

    fn normalize(&mut self, max: f64) -> Result<(), GnwError> {
        let mut matrices: Vec<&mut DMatrix<f64>> = self.trajectories.iter_mut().collect();
        self.core.normalize(&mut matrices, max)
    }

    fn max_concentration(&self) -> f64 {
        max_mrna(&self.trajectories, self.num_genes)
    }

    fn noise_added(&self) -> bool {
        self.core.noise_added()
    }
}

/// Simulate one trajectory. For stochastic runs, `xy0` is replaced by the state reached
/// after the burn-in. The perturbation is left applied unless it was removed at halftime.
fn simulate_trajectory<N: GeneNetwork + ?Sized, R: Rng + ?Sized>(
    replicate: &Replicate,
    network: &mut N,
    xy0: &mut [f64],
    rng: &mut R,
) -> Result<DMatrix<f64>, GnwError> {
    let settings = replicate.settings;
    let mut solver = Solver::new(
        replicate.mode,
        &GeneNetworkSystem::new(&*network, settings),
        xy0.to_vec(),
        settings,
    )?;

    if replicate.mode == SolverMode::Stochastic {
        let system = GeneNetworkSystem::new(&*network, settings);
        let burn_in = replicate.duration / 10.0;
        let num_steps = (burn_in / solver.external_step() - STEP_COUNT_TOLERANCE).ceil().max(1.0) as usize;
        for _ in 0..num_steps {
            solver.step(&system, rng)?;
        }
        xy0.copy_from_slice(solver.state());
    }

    let mut trajectory = DMatrix::zeros(replicate.num_time_points, xy0.len());
    trajectory.row_mut(0).iter_mut().zip(xy0.iter()).for_each(|(entry, x)| *entry = *x);

    if let Some(perturbation) = replicate.perturbation {
        perturbation.apply(replicate.index, network)?;
    }

    let halftime = replicate.duration / 2.0 - HALFTIME_TOLERANCE;
    let mut restored = false;
    for point in 1..replicate.num_time_points {
        solver.step(&GeneNetworkSystem::new(&*network, settings), rng)?;

        if replicate.restore_at_halftime && !restored && point as f64 * solver.external_step() >= halftime {
            if let Some(perturbation) = replicate.perturbation {
                perturbation.restore_wild_type(network)?;
            }
            restored = true;
        }

        trajectory
            .row_mut(point)
            .iter_mut()
            .zip(solver.state().iter())
            .for_each(|(entry, x)| *entry = *x);
    }

    if solver.negative_excursions() > 0 {
        log::info!(
            "SDE: {} times a concentration became negative due to noise and was set to 0",
            solver.negative_excursions()
        );
    }

    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{HillGene, HillInput, HillNetwork, Kinetics};
    use approx::assert_relative_eq;

    fn network() -> HillNetwork {
        HillNetwork::new(vec![
            HillGene::new(Kinetics::new(1.0, 0.5, 1.0, 1.0), 1.0, vec![]),
            HillGene::new(
                Kinetics::new(1.0, 0.5, 1.0, 1.0),
                0.1,
                vec![HillInput::repression(0, 1.0, 2.0)],
            ),
        ])
        .unwrap()
    }

    fn settings() -> Settings {
        Settings {
            random_seed: Some(42),
            model_translation: false,
            time_step: 10.0,
            duration_time_series: 100.0,
            time_step_sde: 0.5,
            num_time_series: 2,
            ..Settings::default()
        }
    }

    #[test]
    fn test_invalid_duration() {
        let settings = Settings {
            time_step: 30.0,
            ..settings()
        };
        assert!(matches!(
            TimeSeriesAssay::new(SolverMode::Deterministic, None, false, "ts", &settings),
            Err(GnwError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_time_points() {
        let assay = TimeSeriesAssay::new(SolverMode::Deterministic, None, false, "ts", &settings()).unwrap();
        assert_eq!(assay.num_time_points(), 11);
        assert_eq!(assay.time_points()[10], 100.0);
        assert_eq!(assay.num_replicates(), 2);
    }

    #[test]
    fn test_fractional_step() {
        let mut network = network();
        let settings = Settings {
            time_step: 0.1,
            time_step_sde: 0.05,
            duration_time_series: 1.0,
            ..settings()
        };
        let xy0 = network.unregulated_steady_state(false);

        for mode in [SolverMode::Deterministic, SolverMode::Stochastic] {
            let mut assay = TimeSeriesAssay::new(mode, None, false, "ts", &settings).unwrap();
            assert_eq!(assay.num_time_points(), 11);
            assay.run(&mut network, &InitialCondition::Supplied(xy0.clone())).unwrap();
            assert!(assay.trajectories().iter().all(|trajectory| trajectory.shape() == (11, 2)));
        }
    }

    #[test]
    fn test_halftime_restore() {
        let mut network = network();
        let perturbation = Perturbation::knockouts(&network);
        let mut assay =
            TimeSeriesAssay::new(SolverMode::Deterministic, Some(perturbation), true, "ts", &settings()).unwrap();
        // wild-type steady state: gene 1 is repressed to 0.1 + 0.9 / (1 + 2^2)
        let wild_type = vec![2.0, 0.56];
        assay.run(&mut network, &InitialCondition::Supplied(wild_type)).unwrap();

        let trajectories = assay.trajectories();
        assert_eq!(trajectories.len(), 2);
        let gene1 = trajectories[0].column(1);
        assert_eq!(gene1[0], 0.56);
        assert!(gene1[5] > 1.5);
        assert_relative_eq!(gene1[10], 0.56, epsilon = 1e-3);
        assert_eq!(network.max_transcription_rates(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_stochastic_burn_in() {
        let mut network = network();
        let mut assay = TimeSeriesAssay::new(SolverMode::Stochastic, None, false, "ts", &settings()).unwrap();
        let xy0 = network.unregulated_steady_state(false);
        assay.run(&mut network, &InitialCondition::Supplied(xy0.clone())).unwrap();

        let trajectories = assay.trajectories();
        assert_eq!(trajectories.len(), 2);
        assert_eq!(trajectories[0].shape(), (11, 2));
        // the first sample comes from the burn-in, not from the supplied state
        assert_ne!(trajectories[0][(0, 0)], xy0[0]);
        assert_ne!(trajectories[1][(0, 0)], trajectories[0][(0, 0)]);
        assert!(trajectories.iter().all(|trajectory| trajectory.iter().all(|x| *x >= 0.0)));
    }
}
