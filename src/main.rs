use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use gnw_sim::assay::{Assay, InitialCondition, SteadyStateAssay, TimeSeriesAssay};
use gnw_sim::error::GnwError;
use gnw_sim::network::{GeneNetwork, HillNetwork};
use gnw_sim::perturbation::Perturbation;
use gnw_sim::settings::Settings;
use gnw_sim::solver::SolverMode;

#[derive(Parser, Debug)]
struct Args {
    /// The network file (JSON)
    #[arg(long)]
    network: PathBuf,
    /// The settings file (JSON), default settings if omitted
    #[arg(long)]
    settings: Option<PathBuf>,
    /// The seed of the experiment, overrides the one of the settings
    #[arg(long)]
    seed: Option<u64>,
    /// The experiment, must be one of: steady-state, time-series
    #[arg(long, default_value = "steady-state")]
    experiment: String,
    /// The perturbations, must be one of: none, knockout, knockdown, dual-knockout, multifactorial, time-series
    #[arg(long, default_value = "none")]
    perturbation: String,
    /// The number of random perturbations (dual knockouts, multifactorial and time-series perturbations)
    #[arg(long, default_value = "10")]
    num_perturbations: usize,
    /// The solver, must be one of: ode, sde
    #[arg(long, default_value = "ode")]
    mode: String,
    /// Remove the perturbations at half the duration of the time series
    #[arg(long)]
    restore_at_halftime: bool,
    /// Add measurement noise to the dataset
    #[arg(long)]
    noise: bool,
    /// Simulate the steady states in parallel
    #[arg(long)]
    parallel: bool,
    /// The output file (JSON)
    #[arg(short, long, default_value = "dataset.json")]
    output: PathBuf,
}

/// A simulated dataset, one matrix per run (steady-state assays have a single matrix).
#[derive(Serialize, Debug)]
struct Dataset {
    label: String,
    num_genes: usize,
    translation: bool,
    noise_added: bool,
    time_points: Option<Vec<f64>>,
    data: Vec<Vec<Vec<f64>>>,
}

fn rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    matrix
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

fn build_perturbation(
    args: &Args,
    network: &HillNetwork,
    settings: &Settings,
    rng: &mut ChaCha8Rng,
) -> Result<Option<Perturbation>, GnwError> {
    let perturbation = match args.perturbation.as_str() {
        "none" => None,
        "knockout" => Some(Perturbation::knockouts(network)),
        "knockdown" => Some(Perturbation::knockdowns(network, settings.knockdown_factor)),
        "dual-knockout" => Some(Perturbation::dual_knockouts_from_network(
            network,
            args.num_perturbations,
            rng,
        )?),
        "multifactorial" => Some(Perturbation::multifactorial(
            network,
            args.num_perturbations,
            settings.multifactorial_stdev,
            rng,
        )?),
        "time-series" => Some(Perturbation::time_series(
            network,
            args.num_perturbations,
            settings.perturbation_probability,
            settings.multifactorial_stdev,
            rng,
        )?),
        other => {
            return Err(GnwError::InvalidArgument(format!(
                "unknown perturbation {}",
                other
            )))
        }
    };
    Ok(perturbation)
}

fn run_steady_state(
    args: &Args,
    mode: SolverMode,
    perturbation: Option<Perturbation>,
    network: &mut HillNetwork,
    settings: &Settings,
    rng: ChaCha8Rng,
) -> Result<Dataset, GnwError> {
    let mut assay =
        SteadyStateAssay::new(mode, perturbation.clone(), &args.perturbation, settings)?.with_rng(rng);

    // Stochastic runs last as long as the deterministic ones took to converge
    if mode == SolverMode::Stochastic && settings.max_time_steady_state_sde.is_none() {
        let mut deterministic =
            SteadyStateAssay::new(SolverMode::Deterministic, perturbation, &args.perturbation, settings)?;
        deterministic.run(network, &InitialCondition::Estimate)?;
        assay.set_convergence_times(deterministic.convergence_times())?;
    }

    if args.parallel {
        assay.run_par(&*network, &InitialCondition::Estimate)?;
    } else {
        assay.run(network, &InitialCondition::Estimate)?;
    }
    if args.noise {
        assay.add_noise()?;
    }

    Ok(Dataset {
        label: assay.label().to_string(),
        num_genes: network.num_genes(),
        translation: settings.model_translation,
        noise_added: assay.noise_added(),
        time_points: None,
        data: vec![rows(assay.steady_states())],
    })
}

fn run_time_series(
    args: &Args,
    mode: SolverMode,
    perturbation: Option<Perturbation>,
    network: &mut HillNetwork,
    settings: &Settings,
    rng: ChaCha8Rng,
) -> Result<Dataset, GnwError> {
    let mut assay = TimeSeriesAssay::new(
        mode,
        perturbation,
        args.restore_at_halftime,
        &args.perturbation,
        settings,
    )?
    .with_rng(rng);
    assay.run(network, &InitialCondition::Estimate)?;
    if args.noise {
        assay.add_noise()?;
    }

    Ok(Dataset {
        label: assay.label().to_string(),
        num_genes: network.num_genes(),
        translation: settings.model_translation,
        noise_added: assay.noise_added(),
        time_points: Some(assay.time_points()),
        data: assay.trajectories().iter().map(rows).collect(),
    })
}

fn main() -> Result<(), GnwError> {
    let args = Args::parse();

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {l} - {m}\n")))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .map_err(|e| GnwError::IOError(e.to_string()))?;

    log4rs::init_config(config).map_err(|e| GnwError::IOError(e.to_string()))?;

    log::info!("{:?}", args);

    let mut settings = match &args.settings {
        Some(path) => Settings::load_from(path)?,
        None => Settings::default(),
    };
    if args.seed.is_some() {
        settings.random_seed = args.seed;
    }
    settings.validate()?;

    let mut network = HillNetwork::load_from(&args.network)?;
    log::info!("Network loading: done! {} genes", network.num_genes());

    let mode: SolverMode = args.mode.parse()?;
    // perturbations are sampled first, the assay then continues with the same generator
    let mut rng = ChaCha8Rng::seed_from_u64(settings.random_seed.unwrap_or_else(rand::random));
    let perturbation = build_perturbation(&args, &network, &settings, &mut rng)?;

    let dataset = match args.experiment.as_str() {
        "steady-state" => run_steady_state(&args, mode, perturbation, &mut network, &settings, rng)?,
        "time-series" => run_time_series(&args, mode, perturbation, &mut network, &settings, rng)?,
        other => {
            return Err(GnwError::InvalidArgument(format!(
                "unknown experiment {}",
                other
            )))
        }
    };
    log::info!("Simulation: done!");

    let file = File::create(&args.output).map_err(|e| GnwError::IOError(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &dataset).map_err(|e| GnwError::IOError(e.to_string()))?;
    writer.flush().map_err(|e| GnwError::IOError(e.to_string()))?;
    log::info!("Dataset saving: done! Saved to {}", args.output.display());

    Ok(())
}
