//! Weighted discrete selection.
//!
//! [`Weighted`] holds a non-empty list of `(item, weight)` pairs and draws one
//! item per call with probability `weight / total`. It knows nothing about
//! what the items are; the shopping catalog is one user of it.

use rand::Rng;

/// Errors produced by [`Weighted::new`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// No entries were supplied.
    #[error("Weighted selection requires at least one entry")]
    Empty,
    /// An entry's weight is zero, negative, NaN or infinite.
    #[error("Entry {index} has weight {weight}, weights must be finite and positive")]
    InvalidWeight {
        /// Position of the offending entry
        index: usize,
        /// The offending weight
        weight: f64,
    },
    /// The weights are individually valid but their sum is not finite.
    #[error("Sum of weights overflows")]
    TotalOverflow,
}

/// A fixed collection of items sampled in proportion to their weight.
#[derive(Debug, Clone)]
pub struct Weighted<T> {
    entries: Vec<(T, f64)>,
    total: f64,
}

impl<T> Weighted<T> {
    /// Create a new [`Weighted`] from `(item, weight)` pairs.
    ///
    /// # Errors
    ///
    /// Function will return an error if `entries` is empty or any weight is
    /// not strictly positive and finite.
    pub fn new(entries: Vec<(T, f64)>) -> Result<Self, Error> {
        if entries.is_empty() {
            return Err(Error::Empty);
        }
        for (index, (_, weight)) in entries.iter().enumerate() {
            if !(weight.is_finite() && *weight > 0.0) {
                return Err(Error::InvalidWeight {
                    index,
                    weight: *weight,
                });
            }
        }
        let total: f64 = entries.iter().map(|(_, weight)| weight).sum();
        if !total.is_finite() {
            return Err(Error::TotalOverflow);
        }

        Ok(Self { entries, total })
    }

    /// Draw one item, consuming a single value from `rng`.
    pub fn sample<R>(&self, rng: &mut R) -> &T
    where
        R: Rng + ?Sized,
    {
        let draw: f64 = rng.random();
        self.select(draw * self.total)
    }

    /// Walk the entries with the pre-drawn value `r`, nominally in `[0,
    /// total)`, and return the first entry whose cumulative weight exceeds it.
    ///
    /// If floating point error walks `r` off the end the first entry is
    /// returned; selection never fails.
    #[must_use]
    pub fn select(&self, mut r: f64) -> &T {
        for (item, weight) in &self.entries {
            if r < *weight {
                return item;
            }
            r -= weight;
        }
        &self.entries[0].0
    }

    /// Sum of all weights.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Number of entries, always at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false, a [`Weighted`] cannot be constructed empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate `(item, weight)` pairs in the order supplied.
    pub fn iter(&self) -> impl Iterator<Item = (&T, f64)> {
        self.entries.iter().map(|(item, weight)| (item, *weight))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    use super::{Error, Weighted};

    #[test]
    fn empty_is_rejected() {
        assert_eq!(
            Weighted::<u8>::new(Vec::new()).unwrap_err(),
            Error::Empty
        );
    }

    #[test]
    fn non_positive_weights_are_rejected() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = Weighted::new(vec![('a', 1.0), ('b', bad)]).unwrap_err();
            assert!(matches!(err, Error::InvalidWeight { index: 1, .. }));
        }
    }

    #[test]
    fn overflowing_total_is_rejected() {
        let err = Weighted::new(vec![('a', f64::MAX), ('b', f64::MAX)]).unwrap_err();
        assert_eq!(err, Error::TotalOverflow);
    }

    #[test]
    fn select_walks_cumulative_weights() {
        let weighted = Weighted::new(vec![('a', 1.0), ('b', 2.0), ('c', 3.0)]).unwrap();
        assert_eq!(*weighted.select(0.0), 'a');
        assert_eq!(*weighted.select(0.999), 'a');
        assert_eq!(*weighted.select(1.0), 'b');
        assert_eq!(*weighted.select(2.999), 'b');
        assert_eq!(*weighted.select(3.0), 'c');
        assert_eq!(*weighted.select(5.999), 'c');
    }

    #[test]
    fn select_falls_back_to_first_entry() {
        let weighted = Weighted::new(vec![('a', 1.0), ('b', 2.0)]).unwrap();
        assert_eq!(*weighted.select(weighted.total()), 'a');
        assert_eq!(*weighted.select(1_000.0), 'a');
    }

    proptest! {
        #[test]
        fn frequencies_converge_to_weights(
            seed: u64,
            weights in prop::collection::vec(0.1f64..10.0, 1..8),
        ) {
            const DRAWS: usize = 20_000;

            let entries: Vec<(usize, f64)> = weights.iter().copied().enumerate().collect();
            let weighted = Weighted::new(entries).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);

            let mut counts = vec![0usize; weights.len()];
            for _ in 0..DRAWS {
                counts[*weighted.sample(&mut rng)] += 1;
            }

            for (idx, weight) in weights.iter().enumerate() {
                let expected = weight / weighted.total();
                let observed = counts[idx] as f64 / DRAWS as f64;
                prop_assert!(
                    (expected - observed).abs() < 0.03,
                    "entry {idx}: expected {expected}, observed {observed}"
                );
            }
        }

        #[test]
        fn sample_always_returns_a_member(
            seed: u64,
            weights in prop::collection::vec(1e-6f64..1e6, 1..16),
        ) {
            let entries: Vec<(usize, f64)> = weights.iter().copied().enumerate().collect();
            let weighted = Weighted::new(entries).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..64 {
                prop_assert!(*weighted.sample(&mut rng) < weights.len());
            }
        }
    }
}
