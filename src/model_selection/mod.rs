//! Train/test splitting for supervised training.

use crate::error::{PredioError, Result};
use crate::primitives::Matrix;

/// Splits features and labels into random train and test subsets.
///
/// # Arguments
///
/// * `x` - Feature matrix
/// * `y` - Class labels, one per row
/// * `test_size` - Proportion of rows in the test split (0.0 to 1.0)
/// * `random_state` - Optional seed for a reproducible shuffle
///
/// # Returns
///
/// Tuple of (x_train, x_test, y_train, y_test).
///
/// # Errors
///
/// Returns a validation error if `test_size` is out of range, lengths don't
/// match, or either partition would be empty.
///
/// # Example
///
/// ```
/// use predio::model_selection::train_test_split;
/// use predio::primitives::Matrix;
///
/// let x = Matrix::from_vec(10, 2, (0..20).map(|i| i as f32).collect()).unwrap();
/// let y: Vec<usize> = (0..10).map(|i| i % 2).collect();
///
/// let (x_train, x_test, y_train, y_test) =
///     train_test_split(&x, &y, 0.2, Some(42)).unwrap();
/// assert_eq!(x_train.n_rows(), 8);
/// assert_eq!(x_test.n_rows(), 2);
/// assert_eq!(y_train.len(), 8);
/// assert_eq!(y_test.len(), 2);
/// ```
#[allow(clippy::type_complexity)]
pub fn train_test_split(
    x: &Matrix,
    y: &[usize],
    test_size: f32,
    random_state: Option<u64>,
) -> Result<(Matrix, Matrix, Vec<usize>, Vec<usize>)> {
    let (n_train, _) = validate_split_inputs(x, y, test_size)?;
    let n_samples = x.n_rows();

    let indices = shuffle_indices(n_samples, random_state);
    let train_indices = &indices[..n_train];
    let test_indices = &indices[n_train..];

    let x_train = x.select_rows(train_indices);
    let x_test = x.select_rows(test_indices);
    let y_train = train_indices.iter().map(|&i| y[i]).collect();
    let y_test = test_indices.iter().map(|&i| y[i]).collect();

    Ok((x_train, x_test, y_train, y_test))
}

fn validate_split_inputs(x: &Matrix, y: &[usize], test_size: f32) -> Result<(usize, usize)> {
    if test_size <= 0.0 || test_size >= 1.0 {
        return Err(PredioError::validation(format!(
            "test_size must be between 0 and 1, got {test_size}"
        )));
    }

    let n_samples = x.n_rows();
    if n_samples != y.len() {
        return Err(PredioError::validation(format!(
            "x and y must have the same number of samples, got {n_samples} and {}",
            y.len()
        )));
    }

    let n_test = (n_samples as f32 * test_size).round() as usize;
    let n_train = n_samples - n_test;
    if n_test == 0 || n_train == 0 {
        return Err(PredioError::validation(format!(
            "split would leave an empty partition (n_train={n_train}, n_test={n_test})"
        )));
    }

    Ok((n_train, n_test))
}

fn shuffle_indices(n_samples: usize, random_state: Option<u64>) -> Vec<usize> {
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    let mut indices: Vec<usize> = (0..n_samples).collect();

    if let Some(seed) = random_state {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
    } else {
        let mut rng = rand::thread_rng();
        indices.shuffle(&mut rng);
    }

    indices
}
