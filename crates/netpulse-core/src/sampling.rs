//! Probabilistic host sampling and batch partitioning.

use rand::Rng;

/// Retain each value independently with probability `ratio`.
///
/// A ratio >= 1.0 returns the input unchanged without consuming any
/// randomness; <= 0.0 returns nothing. Order is preserved. Deterministic
/// only when `rng` is seeded.
pub fn sample<R: Rng>(values: &[u32], ratio: f64, rng: &mut R) -> Vec<u32> {
    if ratio >= 1.0 {
        return values.to_vec();
    }
    if ratio <= 0.0 {
        return Vec::new();
    }
    values
        .iter()
        .copied()
        .filter(|_| rng.r#gen::<f64>() <= ratio)
        .collect()
}

/// Partition `values` into order-preserving batches of at most `size`.
///
/// `size` is clamped to a minimum of 1. Empty input yields no batches.
pub fn chunk(values: &[u32], size: usize) -> Vec<Vec<u32>> {
    if values.is_empty() {
        return Vec::new();
    }
    values.chunks(size.max(1)).map(<[u32]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn full_ratio_is_identity() {
        let values = vec![1, 2, 3, 4];
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(sample(&values, 1.0, &mut rng), values);
        assert_eq!(sample(&values, 1.5, &mut rng), values);
    }

    #[test]
    fn zero_ratio_is_empty() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(sample(&[1, 2, 3], 0.0, &mut rng).is_empty());
        assert!(sample(&[1, 2, 3], -0.2, &mut rng).is_empty());
    }

    #[test]
    fn seeded_sampling_is_a_deterministic_ordered_subset() {
        let values: Vec<u32> = (0..1000).collect();
        let first = sample(&values, 0.3, &mut StdRng::seed_from_u64(42));
        let second = sample(&values, 0.3, &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(first, sorted, "sampling must preserve input order");
        assert!(first.iter().all(|v| values.contains(v)));
        assert!(first.len() < values.len());
    }

    #[test]
    fn chunks_concatenate_back_to_the_input() {
        let values: Vec<u32> = (0..10).collect();
        let batches = chunk(&values, 3);
        assert_eq!(batches.len(), 4);
        assert_eq!(batches[3], vec![9]);
        let rejoined: Vec<u32> = batches.into_iter().flatten().collect();
        assert_eq!(rejoined, values);
    }

    #[test]
    fn chunk_size_is_clamped_to_one() {
        let batches = chunk(&[1, 2, 3], 0);
        assert_eq!(batches, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn empty_input_has_no_batches() {
        assert!(chunk(&[], 16).is_empty());
    }
}
