//! Criteria filter engine over a record table.
//!
//! A criterion keyed `<attr>_min` or `<attr>_max` is an inclusive bound on a
//! numeric attribute; a bare key with a list is membership; a bare key with a
//! scalar is equality. Keys that name no base or derived column are ignored,
//! so one criteria set can be reused across catalogs with different schemas.

use crate::table::{Dataset, Value};

/// A single criterion value.
#[derive(Debug, Clone, PartialEq)]
pub enum CriterionValue {
    /// Numeric scalar, used for equality or `_min`/`_max` bounds.
    Number(f64),
    /// Text scalar for nominal attributes.
    Text(String),
    /// Boolean scalar for flag attributes.
    Flag(bool),
    /// Membership test: matches if the cell equals any listed scalar.
    OneOf(Vec<CriterionValue>),
}

impl From<f64> for CriterionValue {
    fn from(v: f64) -> Self {
        CriterionValue::Number(v)
    }
}

impl From<i64> for CriterionValue {
    fn from(v: i64) -> Self {
        CriterionValue::Number(v as f64)
    }
}

impl From<&str> for CriterionValue {
    fn from(v: &str) -> Self {
        CriterionValue::Text(v.to_string())
    }
}

impl From<bool> for CriterionValue {
    fn from(v: bool) -> Self {
        CriterionValue::Flag(v)
    }
}

/// Ordered conjunction of criteria.
///
/// # Example
///
/// ```
/// use predio::filter::Criteria;
///
/// let criteria = Criteria::new()
///     .with("precio_min", 100_000.0)
///     .with("precio_max", 250_000.0)
///     .with("tipo", "Casa");
/// assert_eq!(criteria.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    entries: Vec<(String, CriterionValue)>,
}

impl Criteria {
    /// Creates an empty criteria set (matches every record).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a criterion, keeping caller order.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<CriterionValue>) -> Self {
        self.entries.push((key.to_string(), value.into()));
        self
    }

    /// Appends a membership criterion over the given scalars.
    #[must_use]
    pub fn with_any_of<V: Into<CriterionValue>>(
        mut self,
        key: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let list = values.into_iter().map(Into::into).collect();
        self.entries.push((key.to_string(), CriterionValue::OneOf(list)));
        self
    }

    /// Number of criteria.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no criteria were given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates criteria in caller order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CriterionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Applies criteria to a table, returning matching record ids in table order.
///
/// Each criterion narrows the previous survivors, so the result is an
/// order-preserving subsequence of `0..n_rows`.
#[must_use]
pub fn apply(dataset: &Dataset, criteria: &Criteria) -> Vec<usize> {
    let mut survivors: Vec<usize> = (0..dataset.n_rows()).collect();

    for (key, value) in criteria.iter() {
        if let Some((column, bound)) = resolve_bound(dataset, key) {
            survivors.retain(|&id| matches_bound(&column[id], value, bound));
        } else if let Some(column) = dataset.column(key) {
            survivors.retain(|&id| matches_value(&column[id], value));
        }
        // Unknown key: no narrowing.
    }

    survivors
}

#[derive(Clone, Copy)]
enum Bound {
    Lower,
    Upper,
}

/// Resolves a `_min`/`_max` key to its base column, if that column exists.
fn resolve_bound<'a>(dataset: &'a Dataset, key: &str) -> Option<(&'a [Value], Bound)> {
    if let Some(base) = key.strip_suffix("_min") {
        return dataset.column(base).map(|c| (c, Bound::Lower));
    }
    if let Some(base) = key.strip_suffix("_max") {
        return dataset.column(base).map(|c| (c, Bound::Upper));
    }
    None
}

/// Inclusive numeric bound; non-numeric cells and criteria never match.
fn matches_bound(cell: &Value, criterion: &CriterionValue, bound: Bound) -> bool {
    let CriterionValue::Number(limit) = criterion else {
        return false;
    };
    let Some(value) = cell.as_f64() else {
        return false;
    };
    match bound {
        Bound::Lower => value >= *limit,
        Bound::Upper => value <= *limit,
    }
}

/// Equality or membership, sensitive to the cell's type.
fn matches_value(cell: &Value, criterion: &CriterionValue) -> bool {
    match criterion {
        CriterionValue::Number(n) => cell.as_f64().is_some_and(|v| {
            // Flags compare as flags, not as their 0/1 encoding.
            !matches!(cell, Value::Bool(_)) && v == *n
        }),
        CriterionValue::Text(s) => cell.as_text() == Some(s.as_str()),
        CriterionValue::Flag(b) => matches!(cell, Value::Bool(v) if v == b),
        CriterionValue::OneOf(options) => options.iter().any(|opt| {
            // Nested lists are not a thing; only scalars participate.
            !matches!(opt, CriterionValue::OneOf(_)) && matches_value(cell, opt)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{AttrType, Schema};
    use std::collections::BTreeMap;

    fn sample_dataset() -> Dataset {
        let schema = Schema::new(vec![
            ("tipo".to_string(), AttrType::Nominal),
            ("precio".to_string(), AttrType::Continuous),
            ("habitaciones".to_string(), AttrType::Discrete),
            ("tiene_jardin".to_string(), AttrType::Flag),
        ])
        .unwrap();

        let rows = [
            ("Casa", 150_000.0, 3, true),
            ("Apartamento", 90_000.0, 2, false),
            ("Casa", 300_000.0, 5, true),
            ("Duplex", 180_000.0, 4, false),
        ];
        let records: Vec<BTreeMap<String, Value>> = rows
            .iter()
            .map(|(tipo, precio, hab, jardin)| {
                let mut r = BTreeMap::new();
                r.insert("tipo".to_string(), Value::Text((*tipo).to_string()));
                r.insert("precio".to_string(), Value::Float(*precio));
                r.insert("habitaciones".to_string(), Value::Int(*hab));
                r.insert("tiene_jardin".to_string(), Value::Bool(*jardin));
                r
            })
            .collect();
        Dataset::from_records(schema, &records).unwrap()
    }

    #[test]
    fn test_empty_criteria_matches_all() {
        let ds = sample_dataset();
        assert_eq!(apply(&ds, &Criteria::new()), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_min_max_bounds_inclusive() {
        let ds = sample_dataset();
        let criteria = Criteria::new()
            .with("precio_min", 150_000.0)
            .with("precio_max", 180_000.0);
        // Both bounds include their endpoints.
        assert_eq!(apply(&ds, &criteria), vec![0, 3]);
    }

    #[test]
    fn test_equality_text_and_flag() {
        let ds = sample_dataset();
        assert_eq!(apply(&ds, &Criteria::new().with("tipo", "Casa")), vec![0, 2]);
        assert_eq!(apply(&ds, &Criteria::new().with("tiene_jardin", false)), vec![1, 3]);
    }

    #[test]
    fn test_equality_number_on_discrete() {
        let ds = sample_dataset();
        assert_eq!(apply(&ds, &Criteria::new().with("habitaciones", 4i64)), vec![3]);
    }

    #[test]
    fn test_membership() {
        let ds = sample_dataset();
        let criteria = Criteria::new().with_any_of("tipo", ["Apartamento", "Duplex"]);
        assert_eq!(apply(&ds, &criteria), vec![1, 3]);
    }

    #[test]
    fn test_unknown_key_ignored() {
        let ds = sample_dataset();
        let criteria = Criteria::new().with("piscina", true).with("tipo", "Casa");
        assert_eq!(apply(&ds, &criteria), vec![0, 2]);
    }

    #[test]
    fn test_unknown_bound_base_ignored() {
        let ds = sample_dataset();
        let criteria = Criteria::new().with("antiguedad_min", 5.0);
        assert_eq!(apply(&ds, &criteria), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_type_mismatch_never_matches() {
        let ds = sample_dataset();
        // Text criterion on a numeric column matches nothing.
        assert!(apply(&ds, &Criteria::new().with("precio", "caro")).is_empty());
        // Numeric criterion does not match flags through their 0/1 view.
        assert!(apply(&ds, &Criteria::new().with("tiene_jardin", 1.0)).is_empty());
    }

    #[test]
    fn test_conjunction_preserves_order() {
        let ds = sample_dataset();
        let criteria = Criteria::new().with("precio_min", 100_000.0);
        let ids = apply(&ds, &criteria);
        assert_eq!(ids, vec![0, 2, 3]);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_filter_on_derived_column() {
        let mut ds = sample_dataset();
        ds.set_derived(
            "cluster",
            vec![Value::Int(0), Value::Int(1), Value::Int(0), Value::Int(1)],
        )
        .unwrap();
        assert_eq!(apply(&ds, &Criteria::new().with("cluster", 1i64)), vec![1, 3]);
    }
}
