//! This crate provides tools for simulating gene regulatory networks in Rust, and for generating
//! synthetic expression datasets from them.
//!
//! # Creating Networks
//!
//! ```rust
//! use gnw_sim::network::{GeneNetwork, HillGene, HillInput, HillNetwork, Kinetics};
//!
//! // Gene 0 represses gene 1, which activates gene 2
//! let kinetics = Kinetics::new(1.0, 1.0, 1.0, 1.0);
//! let network = HillNetwork::new(vec![
//!     HillGene::new(kinetics.clone(), 1.0, vec![]),
//!     HillGene::new(kinetics.clone(), 0.2, vec![HillInput::repression(0, 0.5, 2.0)]),
//!     HillGene::new(kinetics, 0.0, vec![HillInput::activation(1, 0.5, 2.0)]),
//! ]).unwrap();
//!
//! assert_eq!(network.num_genes(), 3);
//! ```
//!
//! # Simulating Experiments
//!
//! ```rust
//! use gnw_sim::assay::{Assay, InitialCondition, SteadyStateAssay};
//! use gnw_sim::network::{HillGene, HillInput, HillNetwork, Kinetics};
//! use gnw_sim::perturbation::Perturbation;
//! use gnw_sim::settings::Settings;
//! use gnw_sim::solver::SolverMode;
//!
//! let kinetics = Kinetics::new(1.0, 1.0, 1.0, 1.0);
//! let mut network = HillNetwork::new(vec![
//!     HillGene::new(kinetics.clone(), 1.0, vec![]),
//!     HillGene::new(kinetics, 0.2, vec![HillInput::repression(0, 0.5, 2.0)]),
//! ]).unwrap();
//! let settings = Settings { random_seed: Some(42), time_step: 1.0, ..Settings::default() };
//!
//! // Knock out every gene in turn and record the steady states
//! let knockouts = Perturbation::knockouts(&network);
//! let mut assay = SteadyStateAssay::new(SolverMode::Deterministic, Some(knockouts), "knockouts", &settings).unwrap();
//! assay.run(&mut network, &InitialCondition::Estimate).unwrap();
//!
//! assert_eq!(assay.steady_states().nrows(), 2);
//! assert!(assay.outcomes().iter().all(|outcome| outcome.is_converged()));
//! ```

pub mod assay;
pub mod error;
pub mod network;
pub mod noise;
pub mod ode;
pub mod perturbation;
pub mod sde;
pub mod settings;
pub mod solver;
pub mod utils;
