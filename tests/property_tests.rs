//! Property-based tests using proptest.
//!
//! These tests verify invariants of the filter engine, the tier builder,
//! the scaler, and the category encoder under generated inputs.

use predio::filter::{self, Criteria};
use predio::prelude::*;
use predio::table::{AttrType, Value};
use predio::tiers::PriceTiers;
use proptest::prelude::*;
use std::collections::BTreeMap;

// Strategy for a single-column numeric dataset.
fn numeric_dataset_strategy() -> impl Strategy<Value = Dataset> {
    proptest::collection::vec(1_000.0f64..500_000.0, 4..40).prop_map(|prices| {
        let schema =
            Schema::new(vec![("precio".to_string(), AttrType::Continuous)]).unwrap();
        let records: Vec<BTreeMap<String, Value>> = prices
            .into_iter()
            .map(|p| {
                let mut r = BTreeMap::new();
                r.insert("precio".to_string(), Value::Float(p));
                r
            })
            .collect();
        Dataset::from_records(schema, &records).expect("generated records are valid")
    })
}

fn matrix_strategy(rows: usize, cols: usize) -> impl Strategy<Value = Matrix> {
    proptest::collection::vec(-100.0f32..100.0, rows * cols).prop_map(move |data| {
        Matrix::from_vec(rows, cols, data).expect("test data should be valid")
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn empty_criteria_is_identity(ds in numeric_dataset_strategy()) {
        let ids = filter::apply(&ds, &Criteria::new());
        prop_assert_eq!(ids, (0..ds.n_rows()).collect::<Vec<_>>());
    }

    #[test]
    fn bounds_never_widen_the_result(ds in numeric_dataset_strategy(), limit in 1_000.0f64..500_000.0) {
        let all = filter::apply(&ds, &Criteria::new());
        let bounded = filter::apply(&ds, &Criteria::new().with("precio_max", limit));
        prop_assert!(bounded.len() <= all.len());
        // Survivors actually satisfy the bound and keep table order.
        let column = ds.column("precio").unwrap();
        for &id in &bounded {
            prop_assert!(column[id].as_f64().unwrap() <= limit);
        }
        prop_assert!(bounded.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn tier_labels_are_monotone_in_price(prices in proptest::collection::vec(1_000.0f64..500_000.0, 4..50)) {
        let tiers = PriceTiers::from_prices(&prices).unwrap();
        for (&price, &tier) in prices.iter().zip(tiers.tiers().iter()) {
            // Each price respects its own tier's boundary and exceeds the
            // previous tier's.
            prop_assert!(price <= tiers.boundaries()[tier].1);
            if tier > 0 {
                prop_assert!(price > tiers.boundaries()[tier - 1].1);
            }
        }
        // Boundaries are non-decreasing.
        prop_assert!(tiers.boundaries().windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn scaled_columns_are_centered(x in matrix_strategy(12, 3)) {
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();
        for j in 0..3 {
            let mean: f32 = (0..12).map(|i| scaled.get(i, j)).sum::<f32>() / 12.0;
            prop_assert!(mean.abs() < 1e-3, "column {} mean {}", j, mean);
        }
    }

    #[test]
    fn encoder_refit_is_idempotent(values in proptest::collection::vec("[a-d]{1,3}", 1..30)) {
        let mut enc = CategoryEncoder::new();
        enc.fit(values.iter().map(String::as_str));
        let codes: Vec<usize> = values.iter().map(|v| enc.code(v).unwrap()).collect();

        enc.fit(values.iter().map(String::as_str));
        let again: Vec<usize> = values.iter().map(|v| enc.code(v).unwrap()).collect();
        prop_assert_eq!(codes, again);
    }

    #[test]
    fn split_partitions_every_row(rows in 5usize..40) {
        let x = Matrix::from_vec(rows, 1, (0..rows).map(|i| i as f32).collect()).unwrap();
        let y: Vec<usize> = (0..rows).collect();
        let (x_train, x_test, y_train, y_test) =
            train_test_split(&x, &y, 0.2, Some(42)).unwrap();

        prop_assert_eq!(x_train.n_rows() + x_test.n_rows(), rows);
        let mut seen: Vec<usize> = y_train.iter().chain(y_test.iter()).copied().collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..rows).collect::<Vec<_>>());
    }
}
