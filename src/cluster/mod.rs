//! K-means clustering for catalog segmentation.

use crate::error::{PredioError, Result};
use crate::primitives::{distance_squared, Matrix};
use crate::traits::UnsupervisedEstimator;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// K-means clustering with Lloyd's algorithm and multiple restarts.
///
/// Each restart draws k distinct rows as initial centroids, iterates until
/// centroid movement falls below `tol` or `max_iter` is reached, and the
/// restart with the lowest inertia wins. With a fixed `random_state` the
/// whole procedure is reproducible.
///
/// # Example
///
/// ```
/// use predio::prelude::*;
///
/// let data = Matrix::from_vec(6, 1, vec![0.0, 0.5, 1.0, 10.0, 10.5, 11.0]).unwrap();
/// let mut km = KMeans::new(2).with_random_state(42);
/// km.fit(&data).unwrap();
/// let labels = km.predict(&data).unwrap();
/// assert_eq!(labels[0], labels[1]);
/// assert_ne!(labels[0], labels[5]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    k: usize,
    max_iter: usize,
    tol: f32,
    n_init: usize,
    random_state: Option<u64>,
    centroids: Option<Matrix>,
    inertia: Option<f32>,
    n_iter: usize,
}

impl KMeans {
    /// Creates a new k-means model with `k` clusters.
    ///
    /// Defaults: 300 iterations max, tolerance 1e-4, 10 restarts.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
            random_state: None,
            centroids: None,
            inertia: None,
            n_iter: 0,
        }
    }

    /// Sets the maximum number of Lloyd iterations per restart.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sets the convergence tolerance on centroid movement.
    #[must_use]
    pub fn with_tol(mut self, tol: f32) -> Self {
        self.tol = tol;
        self
    }

    /// Sets the number of restarts; the lowest-inertia run is kept.
    #[must_use]
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    /// Sets the random seed for reproducible initialization.
    #[must_use]
    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = Some(random_state);
        self
    }

    /// Number of clusters.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Returns true if the model has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.centroids.is_some()
    }

    /// Fitted centroids, one row per cluster.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn centroids(&self) -> &Matrix {
        self.centroids.as_ref().expect("Model not fitted. Call fit() first.")
    }

    /// Sum of squared distances from each sample to its centroid.
    #[must_use]
    pub fn inertia(&self) -> Option<f32> {
        self.inertia
    }

    /// Iterations run by the winning restart.
    #[must_use]
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Initial centroids for one restart: k distinct rows of `x`.
    fn initial_centroids(&self, x: &Matrix, seed: Option<u64>) -> Matrix {
        let n_samples = x.n_rows();
        let indices: Vec<usize> = if let Some(seed) = seed {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            rand::seq::index::sample(&mut rng, n_samples, self.k).into_vec()
        } else {
            let mut rng = rand::thread_rng();
            rand::seq::index::sample(&mut rng, n_samples, self.k).into_vec()
        };
        x.select_rows(&indices)
    }

    /// One full Lloyd run from the given initial centroids.
    ///
    /// Returns (centroids, inertia, iterations).
    fn lloyd_run(&self, x: &Matrix, mut centroids: Matrix) -> (Matrix, f32, usize) {
        let mut iterations = 0;
        for _ in 0..self.max_iter {
            iterations += 1;
            let labels = assign_labels(x, &centroids);
            let updated = update_centroids(x, &labels, &centroids);
            let converged = centroids_converged(&centroids, &updated, self.tol);
            centroids = updated;
            if converged {
                break;
            }
        }
        let labels = assign_labels(x, &centroids);
        let inertia = compute_inertia(x, &centroids, &labels);
        (centroids, inertia, iterations)
    }
}

impl UnsupervisedEstimator for KMeans {
    type Labels = Vec<usize>;

    /// Runs `n_init` restarts and keeps the one with the lowest inertia.
    ///
    /// # Errors
    ///
    /// Returns a validation error if there are fewer samples than clusters
    /// or `k` is zero.
    fn fit(&mut self, x: &Matrix) -> Result<()> {
        if self.k == 0 {
            return Err(PredioError::validation("k must be at least 1"));
        }
        let n_samples = x.n_rows();
        if n_samples < self.k {
            return Err(PredioError::validation(format!(
                "need at least {} samples for {} clusters, got {n_samples}",
                self.k, self.k
            )));
        }

        let mut best: Option<(Matrix, f32, usize)> = None;
        for restart in 0..self.n_init {
            let seed = self.random_state.map(|s| s + restart as u64);
            let init = self.initial_centroids(x, seed);
            let (centroids, inertia, iterations) = self.lloyd_run(x, init);
            if best.as_ref().map_or(true, |(_, best_inertia, _)| inertia < *best_inertia) {
                best = Some((centroids, inertia, iterations));
            }
        }

        let (centroids, inertia, iterations) =
            best.expect("n_init is at least 1, so one run must exist");
        self.centroids = Some(centroids);
        self.inertia = Some(inertia);
        self.n_iter = iterations;
        Ok(())
    }

    /// Assigns each row of `x` to its nearest centroid.
    ///
    /// # Errors
    ///
    /// Returns a state error if the model is not fitted, or a validation
    /// error on a feature-count mismatch.
    fn predict(&self, x: &Matrix) -> Result<Vec<usize>> {
        let centroids = self
            .centroids
            .as_ref()
            .ok_or_else(|| PredioError::state("k-means not fitted, call fit() first"))?;
        if x.n_cols() != centroids.n_cols() {
            return Err(PredioError::validation(format!(
                "model fitted on {} features, input has {}",
                centroids.n_cols(),
                x.n_cols()
            )));
        }
        Ok(assign_labels(x, centroids))
    }
}

/// Nearest-centroid label for every row.
fn assign_labels(x: &Matrix, centroids: &Matrix) -> Vec<usize> {
    (0..x.n_rows())
        .map(|row| {
            let sample = x.row(row);
            let mut best_cluster = 0;
            let mut best_dist = f32::INFINITY;
            for cluster in 0..centroids.n_rows() {
                let dist = distance_squared(sample, centroids.row(cluster));
                if dist < best_dist {
                    best_dist = dist;
                    best_cluster = cluster;
                }
            }
            best_cluster
        })
        .collect()
}

/// Mean of each cluster's members; empty clusters keep their old centroid.
fn update_centroids(x: &Matrix, labels: &[usize], current: &Matrix) -> Matrix {
    let k = current.n_rows();
    let n_features = x.n_cols();
    let mut sums = vec![0.0f32; k * n_features];
    let mut counts = vec![0usize; k];

    for (row, &label) in labels.iter().enumerate() {
        counts[label] += 1;
        for (j, &val) in x.row(row).iter().enumerate() {
            sums[label * n_features + j] += val;
        }
    }

    let mut updated = Matrix::zeros(k, n_features);
    for cluster in 0..k {
        for j in 0..n_features {
            let value = if counts[cluster] > 0 {
                sums[cluster * n_features + j] / counts[cluster] as f32
            } else {
                current.get(cluster, j)
            };
            updated.set(cluster, j, value);
        }
    }
    updated
}

/// True when no centroid moved more than `tol` (squared distance).
fn centroids_converged(old: &Matrix, new: &Matrix, tol: f32) -> bool {
    (0..old.n_rows()).all(|c| distance_squared(old.row(c), new.row(c)) <= tol * tol)
}

fn compute_inertia(x: &Matrix, centroids: &Matrix, labels: &[usize]) -> f32 {
    labels
        .iter()
        .enumerate()
        .map(|(row, &label)| distance_squared(x.row(row), centroids.row(label)))
        .sum()
}
