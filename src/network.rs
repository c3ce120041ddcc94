//! Gene network models consumed by the simulation engine.
//!
//! The engine only needs the kinetic parameters of each gene and a rate function, which are
//! exposed by the [`GeneNetwork`] trait. The dynamics are
//!
//! ```text
//! dx_i/dt = m_i f_i(r) - δ_i x_i
//! dy_i/dt = t_i x_i - δp_i y_i
//! ```
//!
//! where x is the mRNA concentration, y the protein concentration, r = y if translation is
//! modeled and r = x otherwise.
//!
//! # Examples
//!
//! ```
//! use gnw_sim::network::{GeneNetwork, HillGene, HillInput, HillNetwork, Kinetics};
//!
//! // Gene 0 activates gene 1
//! let kinetics = Kinetics::new(1.0, 1.0, 1.0, 1.0);
//! let network = HillNetwork::new(vec![
//!     HillGene::new(kinetics.clone(), 1.0, vec![]),
//!     HillGene::new(kinetics, 0.1, vec![HillInput::activation(0, 0.5, 2.0)]),
//! ]).unwrap();
//!
//! assert_eq!(network.num_genes(), 2);
//! assert_eq!(network.regulators(1), vec![0]);
//! assert!(network.is_regulator(0));
//! ```
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::GnwError;

/// Kinetic parameters of a gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kinetics {
    /// Maximum transcription rate, the parameter targeted by perturbations.
    pub max_transcription: f64,
    /// mRNA degradation rate.
    pub delta: f64,
    /// Maximum translation rate.
    pub max_translation: f64,
    /// Protein degradation rate.
    pub delta_protein: f64,
}

impl Kinetics {
    pub fn new(max_transcription: f64, delta: f64, max_translation: f64, delta_protein: f64) -> Self {
        Kinetics {
            max_transcription,
            delta,
            max_translation,
            delta_protein,
        }
    }

    fn validate(&self) -> Result<(), GnwError> {
        if !(self.max_transcription >= 0.0 && self.max_translation >= 0.0) {
            return Err(GnwError::InvalidParameter(
                "production rates must be non-negative".to_string(),
            ));
        }
        if !(self.delta > 0.0 && self.delta_protein > 0.0) {
            return Err(GnwError::InvalidParameter(
                "degradation rates must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A gene network as seen by the simulation engine.
pub trait GeneNetwork {
    /// Returns the number of genes in the network.
    fn num_genes(&self) -> usize;

    /// Returns the kinetic parameters of a gene.
    fn kinetics(&self, gene: usize) -> &Kinetics;

    /// Returns a mutable reference to the kinetic parameters of a gene.
    fn kinetics_mut(&mut self, gene: usize) -> &mut Kinetics;

    /// Returns the ids of the genes regulating the given gene.
    fn regulators(&self, gene: usize) -> Vec<usize>;

    /// Returns the relative activation f_i in [0, 1] of a gene, given the levels of all
    /// regulators (one entry per gene).
    fn activation(&self, gene: usize, levels: &[f64]) -> f64;

    /// Returns the dimension of the state vector.
    fn state_dimension(&self, translation: bool) -> usize {
        if translation {
            2 * self.num_genes()
        } else {
            self.num_genes()
        }
    }

    /// Returns true if the gene regulates at least one gene of the network.
    fn is_regulator(&self, gene: usize) -> bool {
        (0..self.num_genes()).any(|target| self.regulators(target).contains(&gene))
    }

    /// Returns the production and the degradation terms of one state variable, mRNA levels
    /// first and protein levels after them.
    fn fluxes(&self, xy: &[f64], translation: bool, variable: usize) -> (f64, f64) {
        let n = self.num_genes();
        let (x, y) = xy.split_at(n);
        if variable < n {
            let kinetics = self.kinetics(variable);
            let levels = if translation { y } else { x };
            (
                kinetics.max_transcription * self.activation(variable, levels),
                kinetics.delta * x[variable],
            )
        } else {
            let gene = variable - n;
            let kinetics = self.kinetics(gene);
            (kinetics.max_translation * x[gene], kinetics.delta_protein * y[gene])
        }
    }

    /// Compute the production and the degradation terms of every state variable.
    fn rates(&self, xy: &[f64], translation: bool, production: &mut [f64], degradation: &mut [f64]) {
        for (variable, (p, d)) in production.iter_mut().zip(degradation.iter_mut()).enumerate() {
            (*p, *d) = self.fluxes(xy, translation, variable);
        }
    }

    /// Compute the time derivative of the state.
    fn compute_dxydt(&self, xy: &[f64], translation: bool, dxydt: &mut [f64]) {
        for (variable, rate) in dxydt.iter_mut().enumerate() {
            let (production, degradation) = self.fluxes(xy, translation, variable);
            *rate = production - degradation;
        }
    }

    /// Returns the maximum transcription rates of all genes.
    fn max_transcription_rates(&self) -> Vec<f64> {
        (0..self.num_genes())
            .map(|i| self.kinetics(i).max_transcription)
            .collect()
    }

    /// Overwrite the maximum transcription rates of all genes.
    fn set_max_transcription_rates(&mut self, rates: &[f64]) -> Result<(), GnwError> {
        if rates.len() != self.num_genes() {
            return Err(GnwError::DimensionMismatch(format!(
                "expected {} transcription rates, got {}",
                self.num_genes(),
                rates.len()
            )));
        }
        for (i, rate) in rates.iter().enumerate() {
            self.kinetics_mut(i).max_transcription = *rate;
        }
        Ok(())
    }

    /// Returns the steady state of the unregulated network, i.e., the fixed point obtained
    /// when every rate function is evaluated at the zero vector.
    fn unregulated_steady_state(&self, translation: bool) -> Vec<f64> {
        let n = self.num_genes();
        let zeros = vec![0.0; n];
        let mut xy = vec![0.0; self.state_dimension(translation)];

        for i in 0..n {
            let kinetics = self.kinetics(i);
            xy[i] = kinetics.max_transcription * self.activation(i, &zeros) / kinetics.delta;
        }
        if translation {
            for i in 0..n {
                let kinetics = self.kinetics(i);
                xy[n + i] = kinetics.max_translation * xy[i] / kinetics.delta_protein;
            }
        }

        xy
    }
}

/// The effect of a regulator on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regulation {
    Activation,
    Repression,
}

/// A regulatory input described by a Hill function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HillInput {
    pub source: usize,
    /// Dissociation constant, i.e., the level at which the Hill function is 1/2.
    pub k: f64,
    /// Hill coefficient.
    pub n: f64,
    pub regulation: Regulation,
}

impl HillInput {
    pub fn activation(source: usize, k: f64, n: f64) -> Self {
        HillInput {
            source,
            k,
            n,
            regulation: Regulation::Activation,
        }
    }

    pub fn repression(source: usize, k: f64, n: f64) -> Self {
        HillInput {
            source,
            k,
            n,
            regulation: Regulation::Repression,
        }
    }

    fn occupancy(&self, level: f64) -> f64 {
        let a = (level.max(0.0) / self.k).powf(self.n);
        match self.regulation {
            Regulation::Activation => a / (1.0 + a),
            Regulation::Repression => 1.0 / (1.0 + a),
        }
    }
}

/// A gene of a [`HillNetwork`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HillGene {
    pub kinetics: Kinetics,
    /// Activation in the absence of activators.
    pub basal: f64,
    pub inputs: Vec<HillInput>,
}

impl HillGene {
    pub fn new(kinetics: Kinetics, basal: f64, inputs: Vec<HillInput>) -> Self {
        HillGene {
            kinetics,
            basal,
            inputs,
        }
    }
}

/// A network whose regulatory inputs act independently through Hill functions:
/// f = basal + (1 - basal) * Π h_j(r_j).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HillNetwork {
    genes: Vec<HillGene>,
}

impl HillNetwork {
    /// Create a network from its genes, checking that all parameters are valid.
    pub fn new(genes: Vec<HillGene>) -> Result<Self, GnwError> {
        let num_genes = genes.len();
        for (id, gene) in genes.iter().enumerate() {
            gene.kinetics.validate()?;
            if !(0.0..=1.0).contains(&gene.basal) {
                return Err(GnwError::InvalidParameter(format!(
                    "basal activation of gene {} must be in [0, 1]",
                    id
                )));
            }
            for input in gene.inputs.iter() {
                if input.source >= num_genes {
                    return Err(GnwError::InvalidParameter(format!(
                        "gene {} is regulated by unknown gene {}",
                        id, input.source
                    )));
                }
                if !(input.k > 0.0 && input.n > 0.0) {
                    return Err(GnwError::InvalidParameter(format!(
                        "Hill parameters of input {} -> {} must be positive",
                        input.source, id
                    )));
                }
            }
        }
        Ok(HillNetwork { genes })
    }

    /// Returns the genes of the network.
    pub fn genes(&self) -> &[HillGene] {
        &self.genes
    }

    /// Save the network to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), GnwError> {
        let file = File::create(path).map_err(|e| GnwError::IOError(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| GnwError::IOError(e.to_string()))?;
        writer.flush().map_err(|e| GnwError::IOError(e.to_string()))
    }

    /// Load a network from a file, checking its parameters.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, GnwError> {
        let file = File::open(path).map_err(|e| GnwError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        let network: HillNetwork =
            serde_json::from_reader(reader).map_err(|e| GnwError::IOError(e.to_string()))?;
        HillNetwork::new(network.genes)
    }
}

impl GeneNetwork for HillNetwork {
    fn num_genes(&self) -> usize {
        self.genes.len()
    }

    fn kinetics(&self, gene: usize) -> &Kinetics {
        &self.genes[gene].kinetics
    }

    fn kinetics_mut(&mut self, gene: usize) -> &mut Kinetics {
        &mut self.genes[gene].kinetics
    }

    fn regulators(&self, gene: usize) -> Vec<usize> {
        self.genes[gene].inputs.iter().map(|input| input.source).collect()
    }

    fn activation(&self, gene: usize, levels: &[f64]) -> f64 {
        let gene = &self.genes[gene];
        let product: f64 = gene
            .inputs
            .iter()
            .map(|input| input.occupancy(levels[input.source]))
            .product();
        gene.basal + (1.0 - gene.basal) * product
    }
}
