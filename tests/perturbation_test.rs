use approx::assert_relative_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use gnw_sim::error::GnwError;
use gnw_sim::network::{GeneNetwork, HillGene, HillInput, HillNetwork, Kinetics};
use gnw_sim::perturbation::{Perturbation, PerturbationKind};

const SEED: u64 = 42;

fn network(num_genes: usize) -> HillNetwork {
    let genes = (0..num_genes)
        .map(|gene| {
            let kinetics = Kinetics::new(1.0 + gene as f64, 0.5, 1.0, 0.25);
            let inputs = match gene {
                0 => vec![],
                _ => vec![
                    HillInput::activation(0, 0.5, 2.0),
                    HillInput::repression(gene - 1, 0.3, 1.5),
                ],
            };
            HillGene::new(kinetics, 0.05, inputs)
        })
        .collect();
    HillNetwork::new(genes).unwrap()
}

#[test]
fn test_restore_is_exact() {
    let mut network = network(6);
    let wild_type = network.clone();
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);

    let perturbations = vec![
        Perturbation::knockouts(&network),
        Perturbation::knockdowns(&network, 0.3),
        Perturbation::multifactorial(&network, 20, 0.33, &mut rng).unwrap(),
        Perturbation::time_series(&network, 20, 0.5, 0.33, &mut rng).unwrap(),
        Perturbation::dual_knockouts_from_network(&network, 5, &mut rng).unwrap(),
    ];

    for perturbation in perturbations.iter() {
        for k in 0..perturbation.num_perturbations() {
            perturbation.apply(k, &mut network).unwrap();
            assert_eq!(Some(network.max_transcription_rates()), perturbation.row(k));
            perturbation.restore_wild_type(&mut network).unwrap();
            assert_eq!(network, wild_type);
        }
    }
}

#[test]
fn test_save_load() {
    let network = network(4);
    let dir = tempfile::tempdir().unwrap();

    let knockdowns = Perturbation::knockdowns(&network, 0.5);
    let path = dir.path().join("knockdowns.json");
    knockdowns.save_to(&path).unwrap();
    assert_eq!(Perturbation::load_from(&path, &network).unwrap(), knockdowns);

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let multifactorial = Perturbation::multifactorial(&network, 10, 0.33, &mut rng).unwrap();
    let path = dir.path().join("multifactorial.json");
    multifactorial.save_to(&path).unwrap();
    let loaded = Perturbation::load_from(&path, &network).unwrap();
    assert_eq!(loaded.kind(), PerturbationKind::Multifactorial);
    assert_eq!(loaded.wild_type(), multifactorial.wild_type());
    assert_eq!(loaded.matrix().shape(), (10, 4));
    for (a, b) in loaded.matrix().iter().zip(multifactorial.matrix().iter()) {
        assert_relative_eq!(*a, *b, max_relative = 1e-15);
    }
}

#[test]
fn test_load_dimension_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knockouts.json");
    Perturbation::knockouts(&network(4)).save_to(&path).unwrap();

    assert!(matches!(
        Perturbation::load_from(&path, &network(5)),
        Err(GnwError::DimensionMismatch(_))
    ));
    assert!(matches!(
        Perturbation::load_from(dir.path().join("missing.json"), &network(4)),
        Err(GnwError::IOError(_))
    ));
}
