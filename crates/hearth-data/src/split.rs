//! Deterministic train/test partitioning.

use rand::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::table::Table;

/// Seed used by the transformation stage.
pub const SPLIT_SEED: u64 = 42;

/// Number of rows assigned to the test partition: `ceil(n * test_fraction)`.
pub fn test_row_count(n_rows: usize, test_fraction: f64) -> usize {
    ((n_rows as f64 * test_fraction).ceil() as usize).min(n_rows)
}

/// Shuffle row indices with a seeded RNG and cut off the test partition.
///
/// Both partitions keep the shuffled order. The fraction is not range-checked
/// here; configuration loading rejects values outside (0, 1).
pub fn train_test_split(table: &Table, test_fraction: f64, seed: u64) -> (Table, Table) {
    let n_rows = table.row_count();
    let n_test = test_row_count(n_rows, test_fraction);

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (test_idx, train_idx) = indices.split_at(n_test);
    (table.select_rows(train_idx), table.select_rows(test_idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn numbered(n: usize) -> Table {
        let rows = (0..n).map(|i| vec![i.to_string(), (i * 2).to_string()]).collect();
        Table::new(vec!["id".into(), "v".into()], rows).unwrap()
    }

    fn ids(t: &Table) -> Vec<usize> {
        t.rows().iter().map(|r| r[0].parse().unwrap()).collect()
    }

    #[test]
    fn thousand_rows_split_eight_hundred_two_hundred() {
        let (train, test) = train_test_split(&numbered(1000), 0.2, SPLIT_SEED);
        assert_eq!(train.row_count(), 800);
        assert_eq!(test.row_count(), 200);
    }

    #[test]
    fn test_count_rounds_up() {
        assert_eq!(test_row_count(10, 0.25), 3);
        assert_eq!(test_row_count(3, 0.5), 2);
        assert_eq!(test_row_count(0, 0.2), 0);
    }

    #[test]
    fn same_seed_same_partitions() {
        let t = numbered(257);
        let a = train_test_split(&t, 0.3, SPLIT_SEED);
        let b = train_test_split(&t, 0.3, SPLIT_SEED);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seed_changes_partitions() {
        let t = numbered(257);
        let a = train_test_split(&t, 0.3, 1);
        let b = train_test_split(&t, 0.3, 2);
        assert_ne!(ids(&a.1), ids(&b.1));
    }

    #[test]
    fn split_actually_shuffles() {
        let (_, test) = train_test_split(&numbered(100), 0.2, SPLIT_SEED);
        assert_ne!(ids(&test), (0..20).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn partitions_are_disjoint_and_exhaustive(n in 1usize..400, frac in 0.01f64..0.99) {
            let (train, test) = train_test_split(&numbered(n), frac, SPLIT_SEED);
            prop_assert_eq!(train.row_count() + test.row_count(), n);

            let train_ids: HashSet<usize> = ids(&train).into_iter().collect();
            let test_ids: HashSet<usize> = ids(&test).into_iter().collect();
            prop_assert!(train_ids.is_disjoint(&test_ids));
            let all: HashSet<usize> = train_ids.union(&test_ids).copied().collect();
            prop_assert_eq!(all.len(), n);
        }
    }
}
