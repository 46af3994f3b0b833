//! Decision tree and random forest classifiers.
//!
//! The forest drives the price-tier classifier: 100 gini-split trees over
//! bootstrap samples, majority voting, and sample-weighted feature
//! importances.

use crate::error::{PredioError, Result};
use crate::primitives::Matrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Internal split node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    feature_idx: usize,
    threshold: f32,
    left: Box<TreeNode>,
    right: Box<TreeNode>,
}

/// Terminal node carrying a class label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaf {
    class_label: usize,
    n_samples: usize,
}

/// A node in a fitted decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Split on a feature threshold.
    Node(Node),
    /// Terminal class assignment.
    Leaf(Leaf),
}

/// Single decision tree classifier using gini impurity splits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    tree: Option<TreeNode>,
    max_depth: Option<usize>,
}

impl DecisionTreeClassifier {
    /// Creates a new, unfitted tree with unlimited depth.
    #[must_use]
    pub fn new() -> Self {
        Self { tree: None, max_depth: None }
    }

    /// Sets the maximum depth of the tree (root has depth 0).
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Fits the tree to training data.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `x` and `y` disagree or are empty.
    pub fn fit(&mut self, x: &Matrix, y: &[usize]) -> Result<()> {
        let n_rows = x.n_rows();
        if n_rows != y.len() {
            return Err(PredioError::validation(format!(
                "x has {n_rows} rows but y has {} labels",
                y.len()
            )));
        }
        if n_rows == 0 {
            return Err(PredioError::validation("cannot fit tree with zero samples"));
        }
        self.tree = Some(build_tree(x, y, 0, self.max_depth));
        Ok(())
    }

    /// Predicts class labels for every row of `x`.
    ///
    /// # Panics
    ///
    /// Panics if called before `fit`.
    #[must_use]
    pub fn predict(&self, x: &Matrix) -> Vec<usize> {
        (0..x.n_rows()).map(|row| self.predict_one(x.row(row))).collect()
    }

    fn predict_one(&self, sample: &[f32]) -> usize {
        let mut node = self.tree.as_ref().expect("Model not fitted. Call fit() first.");
        loop {
            match node {
                TreeNode::Leaf(leaf) => return leaf.class_label,
                TreeNode::Node(internal) => {
                    node = if sample[internal.feature_idx] <= internal.threshold {
                        &internal.left
                    } else {
                        &internal.right
                    };
                }
            }
        }
    }
}

impl Default for DecisionTreeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Random forest classifier: an ensemble of trees over bootstrap samples.
///
/// Each tree gets its own seeded bootstrap sample; predictions are majority
/// votes. Trees are fit in parallel, which does not change the result since
/// each tree's randomness depends only on its own seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    trees: Vec<DecisionTreeClassifier>,
    n_estimators: usize,
    max_depth: Option<usize>,
    random_state: Option<u64>,
    n_features: usize,
}

impl RandomForestClassifier {
    /// Creates a forest with the given number of trees.
    #[must_use]
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            random_state: None,
            n_features: 0,
        }
    }

    /// Sets the maximum depth for each tree.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Sets the random seed for reproducible bootstraps.
    #[must_use]
    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = Some(random_state);
        self
    }

    /// Returns true if the forest has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Fits every tree on its own bootstrap sample.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the data is empty or inconsistent.
    pub fn fit(&mut self, x: &Matrix, y: &[usize]) -> Result<()> {
        let n_samples = x.n_rows();
        if n_samples != y.len() {
            return Err(PredioError::validation(format!(
                "x has {n_samples} rows but y has {} labels",
                y.len()
            )));
        }
        if n_samples == 0 {
            return Err(PredioError::validation("cannot fit forest with zero samples"));
        }
        self.n_features = x.n_cols();

        self.trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|i| {
                let seed = self.random_state.map(|s| s + i as u64);
                let indices = bootstrap_sample(n_samples, seed);
                let bootstrap_x = x.select_rows(&indices);
                let bootstrap_y: Vec<usize> = indices.iter().map(|&idx| y[idx]).collect();

                let mut tree = match self.max_depth {
                    Some(depth) => DecisionTreeClassifier::new().with_max_depth(depth),
                    None => DecisionTreeClassifier::new(),
                };
                tree.fit(&bootstrap_x, &bootstrap_y)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(())
    }

    /// Predicts class labels by majority vote across trees.
    ///
    /// # Panics
    ///
    /// Panics if called before `fit`.
    #[must_use]
    pub fn predict(&self, x: &Matrix) -> Vec<usize> {
        assert!(self.is_fitted(), "Model not fitted. Call fit() first.");
        let n_samples = x.n_rows();

        // One pass per tree, then vote per sample.
        let per_tree: Vec<Vec<usize>> = self.trees.iter().map(|t| t.predict(x)).collect();

        (0..n_samples)
            .map(|sample_idx| {
                let mut votes: HashMap<usize, usize> = HashMap::new();
                for tree_predictions in &per_tree {
                    *votes.entry(tree_predictions[sample_idx]).or_insert(0) += 1;
                }
                votes
                    .into_iter()
                    .max_by(|(class_a, count_a), (class_b, count_b)| {
                        count_a.cmp(count_b).then(class_b.cmp(class_a))
                    })
                    .map(|(class, _)| class)
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Accuracy on labeled data (fraction of correct predictions).
    #[must_use]
    pub fn score(&self, x: &Matrix, y: &[usize]) -> f32 {
        let predictions = self.predict(x);
        let correct = predictions
            .iter()
            .zip(y.iter())
            .filter(|(pred, truth)| pred == truth)
            .count();
        correct as f32 / y.len() as f32
    }

    /// Per-feature importances, normalized to sum to 1.0.
    ///
    /// Importance is the number of training samples routed through splits on
    /// the feature, aggregated over all trees.
    #[must_use]
    pub fn feature_importances(&self) -> Option<Vec<f32>> {
        if self.trees.is_empty() {
            return None;
        }

        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(root) = &tree.tree {
                accumulate_importances(root, &mut totals);
            }
        }

        let sum: f32 = totals.iter().sum();
        if sum > 0.0 {
            for importance in &mut totals {
                *importance /= sum;
            }
        }
        Some(totals)
    }
}

/// Gini impurity of a label set: 1 - sum(p_i^2).
fn gini_impurity(labels: &[usize]) -> f32 {
    if labels.is_empty() {
        return 0.0;
    }
    let mut counts = HashMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0usize) += 1;
    }
    let n = labels.len() as f32;
    let mut gini = 1.0;
    for count in counts.values() {
        let p = *count as f32 / n;
        gini -= p * p;
    }
    gini
}

/// Weighted gini impurity of a two-way split.
fn gini_split(left: &[usize], right: &[usize]) -> f32 {
    let n_left = left.len() as f32;
    let n_right = right.len() as f32;
    let n_total = n_left + n_right;
    if n_total == 0.0 {
        return 0.0;
    }
    (n_left / n_total) * gini_impurity(left) + (n_right / n_total) * gini_impurity(right)
}

/// Most frequent label; ties broken toward the smaller label for determinism.
fn majority_class(labels: &[usize]) -> usize {
    let mut counts = HashMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0usize) += 1;
    }
    counts
        .into_iter()
        .max_by(|(class_a, count_a), (class_b, count_b)| {
            count_a.cmp(count_b).then(class_b.cmp(class_a))
        })
        .map(|(class, _)| class)
        .expect("at least one label should exist")
}

/// Best (threshold, gain) for one feature, trying midpoints between
/// consecutive unique values.
fn best_split_for_feature(values: &[f32], y: &[usize]) -> Option<(f32, f32)> {
    let mut unique: Vec<f32> = values.to_vec();
    unique.sort_by(|a, b| a.partial_cmp(b).expect("feature values should not be NaN"));
    unique.dedup();
    if unique.len() < 2 {
        return None;
    }

    let current_impurity = gini_impurity(y);
    let mut best_gain = 0.0;
    let mut best_threshold = 0.0;

    for pair in unique.windows(2) {
        let threshold = (pair[0] + pair[1]) / 2.0;
        let mut left = Vec::new();
        let mut right = Vec::new();
        for (idx, &val) in values.iter().enumerate() {
            if val <= threshold {
                left.push(y[idx]);
            } else {
                right.push(y[idx]);
            }
        }
        if left.is_empty() || right.is_empty() {
            continue;
        }
        let gain = current_impurity - gini_split(&left, &right);
        if gain > best_gain {
            best_gain = gain;
            best_threshold = threshold;
        }
    }

    (best_gain > 0.0).then_some((best_threshold, best_gain))
}

/// Best (feature, threshold) across all features, or None if no split helps.
fn find_best_split(x: &Matrix, y: &[usize]) -> Option<(usize, f32)> {
    let (n_samples, n_features) = x.shape();
    if n_samples < 2 {
        return None;
    }

    let mut best: Option<(usize, f32, f32)> = None;
    for feature_idx in 0..n_features {
        let values = x.column(feature_idx);
        if let Some((threshold, gain)) = best_split_for_feature(&values, y) {
            if best.map_or(true, |(_, _, best_gain)| gain > best_gain) {
                best = Some((feature_idx, threshold, gain));
            }
        }
    }
    best.map(|(feature_idx, threshold, _)| (feature_idx, threshold))
}

/// Builds a tree recursively with gini splits.
fn build_tree(x: &Matrix, y: &[usize], depth: usize, max_depth: Option<usize>) -> TreeNode {
    let n_samples = y.len();

    // Pure node or depth limit: stop with a leaf.
    let first = y[0];
    if y.iter().all(|&label| label == first) {
        return TreeNode::Leaf(Leaf { class_label: first, n_samples });
    }
    if max_depth.is_some_and(|max| depth >= max) {
        return TreeNode::Leaf(Leaf { class_label: majority_class(y), n_samples });
    }

    let Some((feature_idx, threshold)) = find_best_split(x, y) else {
        return TreeNode::Leaf(Leaf { class_label: majority_class(y), n_samples });
    };

    let mut left_indices = Vec::new();
    let mut right_indices = Vec::new();
    for row in 0..n_samples {
        if x.get(row, feature_idx) <= threshold {
            left_indices.push(row);
        } else {
            right_indices.push(row);
        }
    }
    if left_indices.is_empty() || right_indices.is_empty() {
        return TreeNode::Leaf(Leaf { class_label: majority_class(y), n_samples });
    }

    let left_y: Vec<usize> = left_indices.iter().map(|&i| y[i]).collect();
    let right_y: Vec<usize> = right_indices.iter().map(|&i| y[i]).collect();
    let left_x = x.select_rows(&left_indices);
    let right_x = x.select_rows(&right_indices);

    TreeNode::Node(Node {
        feature_idx,
        threshold,
        left: Box::new(build_tree(&left_x, &left_y, depth + 1, max_depth)),
        right: Box::new(build_tree(&right_x, &right_y, depth + 1, max_depth)),
    })
}

/// Adds each split's routed sample count to its feature's importance.
fn accumulate_importances(node: &TreeNode, importances: &mut [f32]) {
    if let TreeNode::Node(n) = node {
        importances[n.feature_idx] += count_samples(node) as f32;
        accumulate_importances(&n.left, importances);
        accumulate_importances(&n.right, importances);
    }
}

fn count_samples(node: &TreeNode) -> usize {
    match node {
        TreeNode::Leaf(leaf) => leaf.n_samples,
        TreeNode::Node(n) => count_samples(&n.left) + count_samples(&n.right),
    }
}

/// Samples `n_samples` row indices with replacement.
fn bootstrap_sample(n_samples: usize, random_state: Option<u64>) -> Vec<usize> {
    use rand::distributions::{Distribution, Uniform};
    use rand::SeedableRng;

    let dist = Uniform::from(0..n_samples);
    let mut indices = Vec::with_capacity(n_samples);

    if let Some(seed) = random_state {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        for _ in 0..n_samples {
            indices.push(dist.sample(&mut rng));
        }
    } else {
        let mut rng = rand::thread_rng();
        for _ in 0..n_samples {
            indices.push(dist.sample(&mut rng));
        }
    }

    indices
}
