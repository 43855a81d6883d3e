//! Lottery draw kernel.
//!
//! Picks `k` entrants uniformly at random, without replacement, from a
//! waiting list. The kernel is pure: it never mutates its input and the
//! random source is supplied by the caller.

use rand::Rng;
use thiserror::Error;

/// Errors produced by [`draw`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DrawError {
    /// The requested count is not in `1..=waiting.len()`
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result of a successful draw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawOutcome<T> {
    /// Drawn entrants, in draw order
    pub selected: Vec<T>,
    /// Entrants not drawn, in their original order
    pub remaining: Vec<T>,
}

/// Draw `k` entrants from `waiting`.
///
/// Every subset of size `k` is equally likely. `selected` and `remaining`
/// are disjoint and together hold exactly the entries of `waiting`.
///
/// # Errors
///
/// Returns [`DrawError::InvalidArgument`] when `k <= 0` or `k` exceeds the
/// number of waiting entrants.
///
/// # Example
///
/// ```
/// use cando::draw::draw;
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
///
/// let mut rng = StdRng::seed_from_u64(7);
/// let outcome = draw(&["a", "b", "c"], 2, &mut rng).unwrap();
/// assert_eq!(outcome.selected.len(), 2);
/// assert_eq!(outcome.remaining.len(), 1);
/// ```
pub fn draw<T: Clone, R: Rng + ?Sized>(
    waiting: &[T],
    k: i64,
    rng: &mut R,
) -> Result<DrawOutcome<T>, DrawError> {
    if k <= 0 {
        return Err(DrawError::InvalidArgument(
            "Number to draw must be positive".to_string(),
        ));
    }

    let count = usize::try_from(k)
        .ok()
        .filter(|count| *count <= waiting.len())
        .ok_or_else(|| {
            DrawError::InvalidArgument("Cannot draw more users than are in waitlist".to_string())
        })?;

    // Partial Fisher-Yates: after step i, indices[..=i] is a uniform sample.
    let mut indices: Vec<usize> = (0..waiting.len()).collect();
    for i in 0..count {
        let j = rng.gen_range(i..indices.len());
        indices.swap(i, j);
    }

    let mut drawn = vec![false; waiting.len()];
    let selected = indices[..count]
        .iter()
        .map(|&index| {
            drawn[index] = true;
            waiting[index].clone()
        })
        .collect();

    let remaining = waiting
        .iter()
        .zip(&drawn)
        .filter(|(_, drawn)| !**drawn)
        .map(|(entrant, _)| entrant.clone())
        .collect();

    Ok(DrawOutcome {
        selected,
        remaining,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    fn sorted<T: Ord + Clone>(items: &[T]) -> Vec<T> {
        let mut items = items.to_vec();
        items.sort();
        items
    }

    #[test]
    fn draw_one_of_three() {
        let mut rng = StdRng::seed_from_u64(1);
        let waiting = ["A", "B", "C"];

        let outcome = draw(&waiting, 1, &mut rng).unwrap();

        assert_eq!(outcome.selected.len(), 1);
        assert!(waiting.contains(&outcome.selected[0]));
        assert_eq!(outcome.remaining.len(), 2);
        assert!(!outcome.remaining.contains(&outcome.selected[0]));
    }

    #[test]
    fn draw_everyone() {
        let mut rng = StdRng::seed_from_u64(2);
        let waiting = ["A", "B", "C"];

        let outcome = draw(&waiting, 3, &mut rng).unwrap();

        assert_eq!(sorted(&outcome.selected), vec!["A", "B", "C"]);
        assert!(outcome.remaining.is_empty());
    }

    #[test]
    fn non_positive_count_is_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let waiting = vec!["A", "B"];

        for k in [0, -1, i64::MIN] {
            assert_eq!(
                draw(&waiting, k, &mut rng),
                Err(DrawError::InvalidArgument(
                    "Number to draw must be positive".to_string()
                ))
            );
        }
        assert_eq!(waiting, vec!["A", "B"]);
    }

    #[test]
    fn count_above_waiting_is_rejected() {
        let mut rng = StdRng::seed_from_u64(4);

        assert_eq!(
            draw(&["A", "B"], 3, &mut rng),
            Err(DrawError::InvalidArgument(
                "Cannot draw more users than are in waitlist".to_string()
            ))
        );
        assert!(draw::<&str, _>(&[], 1, &mut rng).is_err());
        assert!(draw(&["A"], i64::MAX, &mut rng).is_err());
    }

    #[test]
    fn remaining_keeps_waiting_order() {
        let mut rng = StdRng::seed_from_u64(5);
        let waiting: Vec<u32> = (0..20).collect();

        let outcome = draw(&waiting, 7, &mut rng).unwrap();

        assert!(outcome.remaining.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn same_seed_same_outcome() {
        let waiting: Vec<u32> = (0..10).collect();
        let first = draw(&waiting, 4, &mut StdRng::seed_from_u64(42)).unwrap();
        let second = draw(&waiting, 4, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn selection_frequency_is_uniform() {
        const TRIALS: u32 = 20_000;
        let mut rng = StdRng::seed_from_u64(6);
        let waiting = ["A", "B", "C", "D", "E"];
        let k = 2;
        let mut hits: HashMap<&str, u32> = HashMap::new();

        for _ in 0..TRIALS {
            for entrant in draw(&waiting, k, &mut rng).unwrap().selected {
                *hits.entry(entrant).or_default() += 1;
            }
        }

        // Expected frequency k/n = 0.4
        for entrant in waiting {
            let frequency = f64::from(hits[entrant]) / f64::from(TRIALS);
            assert!(
                (frequency - 0.4).abs() < 0.02,
                "{entrant} selected with frequency {frequency}"
            );
        }
    }

    #[test]
    fn every_subset_is_reachable() {
        let mut rng = StdRng::seed_from_u64(8);
        let waiting = [1, 2, 3, 4];
        let mut subsets: HashMap<Vec<i32>, u32> = HashMap::new();

        for _ in 0..6_000 {
            let selected = draw(&waiting, 2, &mut rng).unwrap().selected;
            *subsets.entry(sorted(&selected)).or_default() += 1;
        }

        // C(4, 2) = 6 subsets, about 1000 each
        assert_eq!(subsets.len(), 6);
        assert!(subsets.values().all(|count| (850..1150).contains(count)));
    }

    proptest! {
        #[test]
        fn draw_partitions_waiting(
            waiting in prop::collection::vec(any::<u16>(), 1..40),
            pick in any::<prop::sample::Index>(),
            seed in any::<u64>(),
        ) {
            let k = pick.index(waiting.len()) + 1;
            let mut rng = StdRng::seed_from_u64(seed);

            let outcome = draw(&waiting, i64::try_from(k).unwrap(), &mut rng).unwrap();

            prop_assert_eq!(outcome.selected.len(), k);
            prop_assert_eq!(outcome.remaining.len(), waiting.len() - k);

            let mut union = outcome.selected.clone();
            union.extend(outcome.remaining.iter().copied());
            prop_assert_eq!(sorted(&union), sorted(&waiting));
        }

        #[test]
        fn invalid_counts_fail(
            waiting in prop::collection::vec(any::<u8>(), 0..10),
            excess in 1_i64..100,
        ) {
            let mut rng = StdRng::seed_from_u64(0);
            let too_many = i64::try_from(waiting.len()).unwrap() + excess;
            prop_assert!(draw(&waiting, too_many, &mut rng).is_err());
            prop_assert!(draw(&waiting, 1 - excess, &mut rng).is_err());
        }
    }
}
