//! Core traits for the modeling pipeline.
//!
//! These traits define the fit/transform and fit/predict contracts shared by
//! the scalers and the cluster model.

use crate::error::Result;
use crate::primitives::Matrix;

/// Trait for data transformers (scalers and similar).
///
/// # Examples
///
/// ```
/// use predio::prelude::*;
///
/// let x = Matrix::from_vec(3, 1, vec![1.0, 2.0, 3.0]).unwrap();
/// let mut scaler = StandardScaler::new();
/// let scaled = scaler.fit_transform(&x).unwrap();
/// assert_eq!(scaled.shape(), (3, 1));
/// ```
pub trait Transformer {
    /// Fits the transformer to data.
    ///
    /// # Errors
    ///
    /// Returns an error if fitting fails (empty data, dimension mismatch).
    fn fit(&mut self, x: &Matrix) -> Result<()>;

    /// Transforms data using fitted parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the transformer is not fitted.
    fn transform(&self, x: &Matrix) -> Result<Matrix>;

    /// Fits and transforms in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if fitting fails.
    fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
        self.fit(x)?;
        self.transform(x)
    }
}

/// Trait for unsupervised models that partition rows into groups.
pub trait UnsupervisedEstimator {
    /// The type of labels produced.
    type Labels;

    /// Fits the model to data.
    ///
    /// # Errors
    ///
    /// Returns an error if fitting fails (empty data, invalid parameters).
    fn fit(&mut self, x: &Matrix) -> Result<()>;

    /// Predicts group assignments for data.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not fitted.
    fn predict(&self, x: &Matrix) -> Result<Self::Labels>;
}
