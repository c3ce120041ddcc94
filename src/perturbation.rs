//! Perturbations of the maximum transcription rates of a network.
//!
//! A [`Perturbation`] stores the wild-type transcription rates of a network and one row of
//! perturbed rates per run index. Applying perturbation k overwrites the rates of the live
//! network with row k, restoring writes the wild-type snapshot back. Since only stored
//! values are ever written, the wild type is recovered bit for bit whatever the order of
//! the calls.
//!
//! # Examples
//!
//! ```
//! use gnw_sim::network::{GeneNetwork, HillGene, HillNetwork, Kinetics};
//! use gnw_sim::perturbation::Perturbation;
//!
//! let kinetics = Kinetics::new(1.0, 1.0, 1.0, 1.0);
//! let mut network = HillNetwork::new(vec![
//!     HillGene::new(kinetics.clone(), 1.0, vec![]),
//!     HillGene::new(kinetics, 1.0, vec![]),
//! ]).unwrap();
//!
//! let knockouts = Perturbation::knockouts(&network);
//! knockouts.apply(1, &mut network).unwrap();
//! assert_eq!(network.max_transcription_rates(), vec![1.0, 0.0]);
//!
//! knockouts.restore_wild_type(&mut network).unwrap();
//! assert_eq!(network.max_transcription_rates(), vec![1.0, 1.0]);
//! ```
use itertools::Itertools;
use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::GnwError;
use crate::network::GeneNetwork;

/// The class of a perturbation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerturbationKind {
    /// One gene per run, transcription rate set to zero.
    Knockout,
    /// One gene per run, transcription rate multiplied by a factor.
    Knockdown,
    /// Two genes per run, both transcription rates set to zero.
    DualKnockout,
    /// Every regulator perturbed at once by Gaussian noise.
    Multifactorial,
    /// A random subset of genes perturbed at once, used for time series.
    TimeSeries,
}

/// On-disk representation, one row per run index and one column per gene.
#[derive(Serialize, Deserialize)]
struct PerturbationRecord {
    kind: PerturbationKind,
    rows: Vec<Vec<f64>>,
}

/// A set of perturbations of a network together with its wild-type snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Perturbation {
    kind: PerturbationKind,
    wild_type: Vec<f64>,
    perturbations: DMatrix<f64>,
}

impl Perturbation {
    fn from_rows<N: GeneNetwork + ?Sized>(network: &N, kind: PerturbationKind, rows: Vec<Vec<f64>>) -> Self {
        let wild_type = network.max_transcription_rates();
        let perturbations = DMatrix::from_fn(rows.len(), wild_type.len(), |k, i| rows[k][i]);
        Perturbation {
            kind,
            wild_type,
            perturbations,
        }
    }

    /// Single-gene knockouts: run k sets the transcription rate of gene k to zero.
    pub fn knockouts<N: GeneNetwork + ?Sized>(network: &N) -> Self {
        Perturbation::single_gene(network, PerturbationKind::Knockout, 0.0)
    }

    /// Single-gene knockdowns: run k multiplies the transcription rate of gene k by `factor`.
    pub fn knockdowns<N: GeneNetwork + ?Sized>(network: &N, factor: f64) -> Self {
        Perturbation::single_gene(network, PerturbationKind::Knockdown, factor)
    }

    fn single_gene<N: GeneNetwork + ?Sized>(network: &N, kind: PerturbationKind, factor: f64) -> Self {
        let wild_type = network.max_transcription_rates();
        let rows = (0..wild_type.len())
            .map(|k| {
                let mut row = wild_type.clone();
                row[k] *= factor;
                row
            })
            .collect();
        Perturbation::from_rows(network, kind, rows)
    }

    /// Dual knockouts of the given pairs of genes.
    pub fn dual_knockouts<N: GeneNetwork + ?Sized>(
        network: &N,
        pairs: &[(usize, usize)],
    ) -> Result<Self, GnwError> {
        let num_genes = network.num_genes();
        let wild_type = network.max_transcription_rates();
        let mut rows = Vec::with_capacity(pairs.len());
        for &(i, j) in pairs {
            if i >= num_genes || j >= num_genes || i == j {
                return Err(GnwError::InvalidArgument(format!(
                    "invalid dual knockout ({}, {}) in a network of {} genes",
                    i, j, num_genes
                )));
            }
            let mut row = wild_type.clone();
            row[i] = 0.0;
            row[j] = 0.0;
            rows.push(row);
        }
        Ok(Perturbation::from_rows(network, PerturbationKind::DualKnockout, rows))
    }

    /// Dual knockouts of pairs of genes co-regulating a common target.
    ///
    /// At most `count` distinct pairs are drawn at random; fewer are returned if the network
    /// does not have enough of them.
    pub fn dual_knockouts_from_network<N: GeneNetwork + ?Sized, R: Rng + ?Sized>(
        network: &N,
        count: usize,
        rng: &mut R,
    ) -> Result<Self, GnwError> {
        let candidates: Vec<(usize, usize)> = (0..network.num_genes())
            .flat_map(|target| {
                network
                    .regulators(target)
                    .into_iter()
                    .filter(|&source| source != target)
                    .sorted()
                    .dedup()
                    .tuple_combinations()
                    .collect::<Vec<(usize, usize)>>()
            })
            .collect::<BTreeSet<(usize, usize)>>()
            .into_iter()
            .collect();

        if candidates.len() < count {
            log::warn!(
                "Only {} pairs of co-regulators available for {} dual knockouts",
                candidates.len(),
                count
            );
        }

        let pairs: Vec<(usize, usize)> = candidates.choose_multiple(rng, count).cloned().collect();
        Perturbation::dual_knockouts(network, &pairs)
    }

    /// Multifactorial perturbations: in every run the transcription rate m_i of every
    /// regulator is resampled from N(m_i, (stdev m_i)²), truncated at zero.
    pub fn multifactorial<N: GeneNetwork + ?Sized, R: Rng + ?Sized>(
        network: &N,
        count: usize,
        stdev: f64,
        rng: &mut R,
    ) -> Result<Self, GnwError> {
        let regulators: Vec<bool> = (0..network.num_genes())
            .map(|gene| network.is_regulator(gene))
            .collect();
        Perturbation::gaussian(network, PerturbationKind::Multifactorial, count, stdev, rng, |gene, _| {
            regulators[gene]
        })
    }

    /// Time-series perturbations: in every run each gene is perturbed with the given
    /// probability, its transcription rate being resampled as for multifactorial
    /// perturbations.
    pub fn time_series<N: GeneNetwork + ?Sized, R: Rng + ?Sized>(
        network: &N,
        count: usize,
        probability: f64,
        stdev: f64,
        rng: &mut R,
    ) -> Result<Self, GnwError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(GnwError::InvalidParameter(format!(
                "perturbation probability must be in [0, 1], got {}",
                probability
            )));
        }
        Perturbation::gaussian(network, PerturbationKind::TimeSeries, count, stdev, rng, |_, rng| {
            rng.gen_bool(probability)
        })
    }

    fn gaussian<N, R, F>(
        network: &N,
        kind: PerturbationKind,
        count: usize,
        stdev: f64,
        rng: &mut R,
        mut selected: F,
    ) -> Result<Self, GnwError>
    where
        N: GeneNetwork + ?Sized,
        R: Rng + ?Sized,
        F: FnMut(usize, &mut R) -> bool,
    {
        let wild_type = network.max_transcription_rates();
        let mut rows = Vec::with_capacity(count);
        for _ in 0..count {
            let mut row = wild_type.clone();
            for (gene, rate) in row.iter_mut().enumerate() {
                if selected(gene, rng) {
                    let normal = Normal::new(*rate, stdev * *rate)
                        .map_err(|e| GnwError::InvalidParameter(e.to_string()))?;
                    *rate = normal.sample(rng).max(0.0);
                }
            }
            rows.push(row);
        }
        Ok(Perturbation::from_rows(network, kind, rows))
    }

    /// Create a perturbation from a matrix with one row per run and one column per gene.
    pub fn from_matrix<N: GeneNetwork + ?Sized>(
        network: &N,
        kind: PerturbationKind,
        perturbations: DMatrix<f64>,
    ) -> Result<Self, GnwError> {
        if perturbations.ncols() != network.num_genes() {
            return Err(GnwError::DimensionMismatch(format!(
                "perturbation matrix has {} columns for a network of {} genes",
                perturbations.ncols(),
                network.num_genes()
            )));
        }
        Ok(Perturbation {
            kind,
            wild_type: network.max_transcription_rates(),
            perturbations,
        })
    }

    pub fn kind(&self) -> PerturbationKind {
        self.kind
    }

    /// Returns the number of runs, i.e., the number of perturbations.
    pub fn num_perturbations(&self) -> usize {
        self.perturbations.nrows()
    }

    pub fn num_genes(&self) -> usize {
        self.wild_type.len()
    }

    /// Returns the wild-type transcription rates.
    pub fn wild_type(&self) -> &[f64] {
        &self.wild_type
    }

    /// Returns the matrix of perturbed transcription rates.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.perturbations
    }

    /// Returns the transcription rates of run k.
    pub fn row(&self, k: usize) -> Option<Vec<f64>> {
        (k < self.num_perturbations())
            .then(|| self.perturbations.row(k).iter().copied().collect())
    }

    /// Overwrite the transcription rates of the network with those of run k.
    pub fn apply<N: GeneNetwork + ?Sized>(&self, k: usize, network: &mut N) -> Result<(), GnwError> {
        let row = self.row(k).ok_or_else(|| {
            GnwError::InvalidArgument(format!(
                "perturbation {} out of range (0..{})",
                k,
                self.num_perturbations()
            ))
        })?;
        network.set_max_transcription_rates(&row)
    }

    /// Write the wild-type transcription rates back into the network.
    pub fn restore_wild_type<N: GeneNetwork + ?Sized>(&self, network: &mut N) -> Result<(), GnwError> {
        network.set_max_transcription_rates(&self.wild_type)
    }

    /// Save the perturbation matrix to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), GnwError> {
        let record = PerturbationRecord {
            kind: self.kind,
            rows: self
                .perturbations
                .row_iter()
                .map(|row| row.iter().copied().collect())
                .collect(),
        };
        let file = File::create(path).map_err(|e| GnwError::IOError(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &record)
            .map_err(|e| GnwError::IOError(e.to_string()))?;
        writer.flush().map_err(|e| GnwError::IOError(e.to_string()))
    }

    /// Load a perturbation matrix from a file. The wild type is taken from the network,
    /// whose number of genes must match the number of columns of the matrix.
    pub fn load_from<P: AsRef<Path>, N: GeneNetwork + ?Sized>(
        path: P,
        network: &N,
    ) -> Result<Self, GnwError> {
        let file = File::open(path).map_err(|e| GnwError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        let record: PerturbationRecord =
            serde_json::from_reader(reader).map_err(|e| GnwError::IOError(e.to_string()))?;

        let num_genes = network.num_genes();
        if let Some((k, row)) = record.rows.iter().find_position(|row| row.len() != num_genes) {
            return Err(GnwError::DimensionMismatch(format!(
                "perturbation {} has {} entries for a network of {} genes",
                k,
                row.len(),
                num_genes
            )));
        }
        Ok(Perturbation::from_rows(network, record.kind, record.rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{HillGene, HillInput, HillNetwork, Kinetics};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SEED: u64 = 42;

    /// Genes 0 and 1 both regulate gene 2, gene 2 regulates gene 3.
    fn network() -> HillNetwork {
        let genes = (0..4)
            .map(|i| {
                let inputs = match i {
                    2 => vec![HillInput::activation(0, 0.5, 2.0), HillInput::repression(1, 0.5, 1.0)],
                    3 => vec![HillInput::activation(2, 0.5, 2.0)],
                    _ => vec![],
                };
                HillGene::new(Kinetics::new(1.0 + i as f64 * 0.1, 1.0, 1.0, 1.0), 0.1, inputs)
            })
            .collect();
        HillNetwork::new(genes).unwrap()
    }

    #[test]
    fn test_knockouts_knockdowns() {
        let mut network = network();
        let wild_type = network.max_transcription_rates();

        let knockouts = Perturbation::knockouts(&network);
        assert_eq!(knockouts.num_perturbations(), 4);
        knockouts.apply(2, &mut network).unwrap();
        assert_eq!(network.kinetics(2).max_transcription, 0.0);
        assert_eq!(network.kinetics(1).max_transcription, wild_type[1]);

        let knockdowns = Perturbation::knockdowns(&network, 0.5);
        knockdowns.apply(1, &mut network).unwrap();
        // the snapshot of the knockdowns was taken on the knocked-out network
        assert_eq!(network.kinetics(2).max_transcription, 0.0);
        assert_eq!(network.kinetics(1).max_transcription, 0.5 * wild_type[1]);

        knockouts.restore_wild_type(&mut network).unwrap();
        assert_eq!(network.max_transcription_rates(), wild_type);
    }

    #[test]
    fn test_apply_out_of_range() {
        let mut network = network();
        let knockouts = Perturbation::knockouts(&network);
        assert!(matches!(
            knockouts.apply(4, &mut network),
            Err(GnwError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_dual_knockouts() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut network = network();

        let dual = Perturbation::dual_knockouts_from_network(&network, 5, &mut rng).unwrap();
        assert_eq!(dual.kind(), PerturbationKind::DualKnockout);
        assert_eq!(dual.num_perturbations(), 1);
        dual.apply(0, &mut network).unwrap();
        let rates = network.max_transcription_rates();
        assert_eq!(rates[0], 0.0);
        assert_eq!(rates[1], 0.0);
        assert!(rates[2] > 0.0);

        assert!(Perturbation::dual_knockouts(&network, &[(1, 1)]).is_err());
        assert!(Perturbation::dual_knockouts(&network, &[(0, 4)]).is_err());
    }

    #[test]
    fn test_multifactorial() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let network = network();
        let wild_type = network.max_transcription_rates();

        let multifactorial = Perturbation::multifactorial(&network, 10, 0.33, &mut rng).unwrap();
        assert_eq!(multifactorial.num_perturbations(), 10);
        for k in 0..10 {
            let row = multifactorial.row(k).unwrap();
            assert!(row.iter().all(|rate| *rate >= 0.0));
            // gene 3 regulates nothing
            assert_eq!(row[3], wild_type[3]);
        }
        assert!((0..10).any(|k| multifactorial.row(k).unwrap()[0] != wild_type[0]));
    }

    #[test]
    fn test_time_series() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let network = network();
        let wild_type = network.max_transcription_rates();

        let none = Perturbation::time_series(&network, 3, 0.0, 0.33, &mut rng).unwrap();
        for k in 0..3 {
            assert_eq!(none.row(k).unwrap(), wild_type);
        }

        let all = Perturbation::time_series(&network, 3, 1.0, 0.33, &mut rng).unwrap();
        assert!((0..3).all(|k| all.row(k).unwrap() != wild_type));

        assert!(Perturbation::time_series(&network, 3, 1.5, 0.33, &mut rng).is_err());
    }

    #[test]
    fn test_from_matrix() {
        let network = network();
        assert!(matches!(
            Perturbation::from_matrix(&network, PerturbationKind::Knockout, DMatrix::zeros(2, 3)),
            Err(GnwError::DimensionMismatch(_))
        ));
        let perturbation =
            Perturbation::from_matrix(&network, PerturbationKind::Knockout, DMatrix::zeros(2, 4)).unwrap();
        assert_eq!(perturbation.num_perturbations(), 2);
        assert_eq!(perturbation.num_genes(), 4);
    }
}
