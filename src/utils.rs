//! Small helpers shared by the assays.

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Derive the seed of the generator of run `index` from the seed of an assay (SplitMix64).
pub fn derive_seed(seed: u64, index: u64) -> u64 {
    let mut z = (seed ^ index.wrapping_mul(GOLDEN_GAMMA)).wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Returns the largest rate of change in magnitude, or zero for an empty slice.
pub fn max_rate_of_change(rates: &[f64]) -> f64 {
    rates.iter().fold(0.0, |max, rate| rate.abs().max(max))
}
