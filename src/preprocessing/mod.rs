//! Preprocessing transformers: standardization and category encoding.
//!
//! Two scaler instances live on a session — one fit for classification
//! features, one fit for clustering features — and they are never shared.
//! Category encoders are immutable once a category has been observed: the
//! same code table is reused for training, inference, and reload.

use crate::error::{PredioError, Result};
use crate::primitives::Matrix;
use crate::traits::Transformer;
use serde::{Deserialize, Serialize};

/// Standardizes features by removing the mean and scaling to unit variance.
///
/// The standard score of a sample x is: z = (x - mean) / std, with the
/// population std (divide by n). Near-zero stds are left unscaled.
///
/// # Example
///
/// ```
/// use predio::prelude::*;
///
/// let data = Matrix::from_vec(3, 2, vec![
///     0.0, 0.0,
///     1.0, 10.0,
///     2.0, 20.0,
/// ]).unwrap();
///
/// let mut scaler = StandardScaler::new();
/// let scaled = scaler.fit_transform(&data).unwrap();
///
/// let mut sum = 0.0;
/// for i in 0..3 {
///     sum += scaled.get(i, 0);
/// }
/// assert!((sum / 3.0).abs() < 1e-5, "mean should be ~0");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Mean of each feature (computed during fit).
    mean: Option<Vec<f32>>,
    /// Standard deviation of each feature (computed during fit).
    std: Option<Vec<f32>>,
}

impl StandardScaler {
    /// Creates a new, unfitted `StandardScaler`.
    #[must_use]
    pub fn new() -> Self {
        Self { mean: None, std: None }
    }

    /// Returns true if the scaler has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.mean.is_some()
    }

    /// Fitted per-feature means.
    ///
    /// # Panics
    ///
    /// Panics if the scaler is not fitted.
    #[must_use]
    pub fn mean(&self) -> &[f32] {
        self.mean.as_ref().expect("Scaler not fitted. Call fit() first.")
    }

    /// Fitted per-feature standard deviations.
    ///
    /// # Panics
    ///
    /// Panics if the scaler is not fitted.
    #[must_use]
    pub fn std(&self) -> &[f32] {
        self.std.as_ref().expect("Scaler not fitted. Call fit() first.")
    }
}

impl Transformer for StandardScaler {
    /// Computes the mean and standard deviation of each feature.
    fn fit(&mut self, x: &Matrix) -> Result<()> {
        let (n_samples, n_features) = x.shape();
        if n_samples == 0 {
            return Err(PredioError::validation("cannot fit scaler with zero samples"));
        }

        let mut mean = vec![0.0; n_features];
        for (j, mean_j) in mean.iter_mut().enumerate() {
            let mut sum = 0.0;
            for i in 0..n_samples {
                sum += x.get(i, j);
            }
            *mean_j = sum / n_samples as f32;
        }

        let mut std = vec![0.0; n_features];
        for (j, std_j) in std.iter_mut().enumerate() {
            let mut sum_sq = 0.0;
            for i in 0..n_samples {
                let diff = x.get(i, j) - mean[j];
                sum_sq += diff * diff;
            }
            // Population std (divide by n, not n-1).
            *std_j = (sum_sq / n_samples as f32).sqrt();
        }

        self.mean = Some(mean);
        self.std = Some(std);
        Ok(())
    }

    /// Standardizes the data using fitted mean and std.
    fn transform(&self, x: &Matrix) -> Result<Matrix> {
        let mean = self
            .mean
            .as_ref()
            .ok_or_else(|| PredioError::state("scaler not fitted, call fit() first"))?;
        let std = self
            .std
            .as_ref()
            .ok_or_else(|| PredioError::state("scaler not fitted, call fit() first"))?;

        let (n_samples, n_features) = x.shape();
        if n_features != mean.len() {
            return Err(PredioError::validation(format!(
                "scaler fitted on {} features, input has {n_features}",
                mean.len()
            )));
        }

        let mut result = vec![0.0; n_samples * n_features];
        for i in 0..n_samples {
            for j in 0..n_features {
                let mut val = x.get(i, j) - mean[j];
                if std[j] > 1e-10 {
                    val /= std[j];
                }
                result[i * n_features + j] = val;
            }
        }

        Matrix::from_vec(n_samples, n_features, result)
            .map_err(|e| PredioError::validation(e.to_string()))
    }
}

/// Immutable category-to-code table for one nominal attribute.
///
/// Codes are assigned in order of first observation. Once observed, a
/// category's code never changes; re-fitting only extends the table with
/// categories it hasn't seen. Looking up an unknown category is an explicit
/// error, never a silent default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    categories: Vec<String>,
}

impl CategoryEncoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self { categories: Vec::new() }
    }

    /// Extends the code table with unseen categories, in observation order.
    ///
    /// Categories already in the table keep their codes.
    pub fn fit<'a, I: IntoIterator<Item = &'a str>>(&mut self, values: I) {
        for value in values {
            if !self.categories.iter().any(|c| c == value) {
                self.categories.push(value.to_string());
            }
        }
    }

    /// Code for a category.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a category absent from the table.
    pub fn code(&self, value: &str) -> Result<usize> {
        self.categories
            .iter()
            .position(|c| c == value)
            .ok_or_else(|| {
                PredioError::validation(format!(
                    "category '{value}' was never observed during encoding"
                ))
            })
    }

    /// Category for a code.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an out-of-range code.
    pub fn decode(&self, code: usize) -> Result<&str> {
        self.categories
            .get(code)
            .map(String::as_str)
            .ok_or_else(|| {
                PredioError::validation(format!(
                    "code {code} out of range ({} categories)",
                    self.categories.len()
                ))
            })
    }

    /// Number of distinct categories observed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// True if no category has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaler_zero_mean_unit_variance() {
        let x = Matrix::from_vec(4, 2, vec![1.0, 100.0, 2.0, 200.0, 3.0, 300.0, 4.0, 400.0])
            .unwrap();
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();

        for j in 0..2 {
            let mut sum = 0.0;
            let mut sum_sq = 0.0;
            for i in 0..4 {
                sum += scaled.get(i, j);
                sum_sq += scaled.get(i, j) * scaled.get(i, j);
            }
            let mean = sum / 4.0;
            let var = sum_sq / 4.0 - mean * mean;
            assert!(mean.abs() < 1e-5, "column {j} mean should be ~0");
            assert!((var - 1.0).abs() < 1e-4, "column {j} variance should be ~1");
        }
    }

    #[test]
    fn test_scaler_transform_before_fit() {
        let scaler = StandardScaler::new();
        let x = Matrix::from_vec(1, 1, vec![1.0]).unwrap();
        assert!(matches!(
            scaler.transform(&x),
            Err(PredioError::State { .. })
        ));
    }

    #[test]
    fn test_scaler_empty_fit() {
        let mut scaler = StandardScaler::new();
        let x = Matrix::from_vec(0, 2, vec![]).unwrap();
        assert!(scaler.fit(&x).is_err());
    }

    #[test]
    fn test_scaler_feature_count_mismatch() {
        let mut scaler = StandardScaler::new();
        let x = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        scaler.fit(&x).unwrap();
        let bad = Matrix::from_vec(1, 3, vec![1.0, 2.0, 3.0]).unwrap();
        assert!(matches!(
            scaler.transform(&bad),
            Err(PredioError::Validation { .. })
        ));
    }

    #[test]
    fn test_scaler_constant_column_unscaled() {
        let x = Matrix::from_vec(3, 1, vec![5.0, 5.0, 5.0]).unwrap();
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();
        // std is 0, so only centering applies.
        for i in 0..3 {
            assert!(scaled.get(i, 0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_scaler_two_independent_fits_differ() {
        let a = Matrix::from_vec(2, 1, vec![0.0, 10.0]).unwrap();
        let b = Matrix::from_vec(2, 1, vec![0.0, 100.0]).unwrap();
        let mut first = StandardScaler::new();
        let mut second = StandardScaler::new();
        first.fit(&a).unwrap();
        second.fit(&b).unwrap();
        assert!((first.mean()[0] - 5.0).abs() < 1e-6);
        assert!((second.mean()[0] - 50.0).abs() < 1e-6);
        assert_ne!(first.std()[0], second.std()[0]);
    }

    #[test]
    fn test_encoder_first_observation_order() {
        let mut enc = CategoryEncoder::new();
        enc.fit(["Casa", "Apartamento", "Casa", "Duplex"]);
        assert_eq!(enc.code("Casa").unwrap(), 0);
        assert_eq!(enc.code("Apartamento").unwrap(), 1);
        assert_eq!(enc.code("Duplex").unwrap(), 2);
        assert_eq!(enc.len(), 3);
    }

    #[test]
    fn test_encoder_refit_preserves_codes() {
        let mut enc = CategoryEncoder::new();
        enc.fit(["Casa", "Apartamento"]);
        enc.fit(["Penthouse", "Casa"]);
        assert_eq!(enc.code("Casa").unwrap(), 0);
        assert_eq!(enc.code("Apartamento").unwrap(), 1);
        assert_eq!(enc.code("Penthouse").unwrap(), 2);
    }

    #[test]
    fn test_encoder_unseen_category_is_error() {
        let mut enc = CategoryEncoder::new();
        enc.fit(["Casa"]);
        assert!(matches!(
            enc.code("Castillo"),
            Err(PredioError::Validation { .. })
        ));
    }

    #[test]
    fn test_encoder_decode() {
        let mut enc = CategoryEncoder::new();
        enc.fit(["Economico", "Medio", "Alto", "Premium"]);
        assert_eq!(enc.decode(3).unwrap(), "Premium");
        assert!(enc.decode(4).is_err());
    }
}
