//! Model session: the single owner of a catalog and its trained state.
//!
//! Every public operation of the engine hangs off [`ModelSession`]. A session
//! owns its table, encoders, scalers, and fitted models exclusively; nothing
//! is global, and two sessions never share state. The expected flow is
//! load, preprocess, build tiers, train, then query and persist.

use crate::artifact::ModelArtifact;
use crate::cluster::KMeans;
use crate::error::{PredioError, Result};
use crate::filter::{self, Criteria};
use crate::model_selection::train_test_split;
use crate::preprocessing::{CategoryEncoder, StandardScaler};
use crate::primitives::Matrix;
use crate::table::{AttrType, ColumnSummary, Dataset, Schema, Value};
use crate::tiers::PriceTiers;
use crate::traits::{Transformer, UnsupervisedEstimator};
use crate::tree::RandomForestClassifier;
use std::collections::BTreeMap;
use std::path::Path;

/// Derived column holding each record's tier label.
pub const TIER_COLUMN: &str = "categoria_precio";

/// Derived column holding each record's cluster id.
pub const CLUSTER_COLUMN: &str = "cluster";

/// Suffix of derived columns holding nominal codes.
pub const ENCODED_SUFFIX: &str = "_encoded";

/// Default number of clusters.
pub const DEFAULT_K: usize = 5;

const TEST_FRACTION: f32 = 0.2;
const SPLIT_SEED: u64 = 42;
const FOREST_SEED: u64 = 42;
const KMEANS_SEED: u64 = 42;
const N_TREES: usize = 100;
const MAX_TREE_DEPTH: usize = 10;

/// Owns one catalog and everything derived from it.
#[derive(Debug, Clone, Default)]
pub struct ModelSession {
    dataset: Option<Dataset>,
    numeric_features: Vec<String>,
    categorical_features: Vec<String>,
    encodings: BTreeMap<String, CategoryEncoder>,
    target_encoding: Option<(String, CategoryEncoder)>,
    classifier_scaler: Option<StandardScaler>,
    cluster_scaler: Option<StandardScaler>,
    classifier: Option<RandomForestClassifier>,
    classifier_features: Vec<String>,
    importances: Vec<(String, f32)>,
    accuracy: Option<f32>,
    clusterer: Option<KMeans>,
    tier_boundaries: Option<Vec<(String, f64)>>,
}

impl ModelSession {
    /// Creates an empty session with nothing loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a catalog from a CSV file, replacing any prior state.
    ///
    /// # Errors
    ///
    /// Propagates schema and I/O errors from the loader.
    pub fn load_csv<P: AsRef<Path>>(&mut self, path: P, schema: Schema) -> Result<()> {
        let dataset = Dataset::from_csv_path(path, schema)?;
        self.reset_with(dataset);
        Ok(())
    }

    /// Loads a catalog from a JSON record array, replacing any prior state.
    ///
    /// # Errors
    ///
    /// Propagates schema and I/O errors from the loader.
    pub fn load_json<P: AsRef<Path>>(&mut self, path: P, schema: Schema) -> Result<()> {
        let dataset = Dataset::from_json_path(path, schema)?;
        self.reset_with(dataset);
        Ok(())
    }

    /// Loads a catalog from an in-memory record list, replacing any prior
    /// state.
    ///
    /// # Errors
    ///
    /// Propagates schema errors from the loader.
    pub fn load_records(
        &mut self,
        schema: Schema,
        records: &[BTreeMap<String, Value>],
    ) -> Result<()> {
        let dataset = Dataset::from_records(schema, records)?;
        self.reset_with(dataset);
        Ok(())
    }

    /// A new table invalidates every encoder and fitted model.
    fn reset_with(&mut self, dataset: Dataset) {
        *self = Self {
            dataset: Some(dataset),
            ..Self::default()
        };
    }

    /// The loaded table, if any.
    #[must_use]
    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    fn require_dataset(&self) -> Result<&Dataset> {
        self.dataset
            .as_ref()
            .ok_or_else(|| PredioError::state("no catalog loaded, call a load operation first"))
    }

    fn preprocessed(&self) -> bool {
        !self.numeric_features.is_empty() || !self.categorical_features.is_empty()
    }

    /// Summary statistics per numeric column.
    ///
    /// # Errors
    ///
    /// Returns a state error if no catalog is loaded.
    pub fn describe(&self) -> Result<Vec<ColumnSummary>> {
        Ok(self.require_dataset()?.describe())
    }

    /// Imputes missing values and encodes nominal attributes.
    ///
    /// Numeric columns are filled with the column mean (rounded for discrete
    /// ones, majority value for flags), nominal columns with the mode. Each
    /// nominal attribute gets a `<name>_encoded` derived column of integer
    /// codes assigned in first-observation order. The optional `exclude`
    /// attribute, usually the training target, is left out of both returned
    /// lists.
    ///
    /// Running this twice does not reassign codes for categories seen the
    /// first time.
    ///
    /// # Errors
    ///
    /// Returns a schema error if no catalog is loaded, or a validation error
    /// for a column with no populated value to impute from.
    pub fn preprocess(&mut self, exclude: Option<&str>) -> Result<(Vec<String>, Vec<String>)> {
        let dataset = self
            .dataset
            .as_mut()
            .ok_or_else(|| PredioError::schema("no catalog loaded, cannot preprocess"))?;

        impute_missing(dataset)?;

        let mut numeric = Vec::new();
        let mut categorical = Vec::new();
        let attrs: Vec<(String, AttrType)> = dataset
            .schema()
            .iter()
            .map(|(n, t)| (n.to_string(), t))
            .collect();

        for (name, ty) in &attrs {
            if exclude == Some(name.as_str()) {
                continue;
            }
            if ty.is_numeric() {
                numeric.push(name.clone());
            } else {
                categorical.push(name.clone());
            }
        }

        // Encode every nominal attribute, including an excluded one; only the
        // returned lists honor the exclusion.
        for (name, ty) in &attrs {
            if *ty != AttrType::Nominal {
                continue;
            }
            let column = dataset.column(name).expect("schema column exists");
            let texts: Vec<String> = column
                .iter()
                .map(|v| {
                    v.as_text().map(str::to_string).ok_or_else(|| {
                        PredioError::validation(format!(
                            "nominal attribute '{name}' still holds a non-text value"
                        ))
                    })
                })
                .collect::<Result<_>>()?;

            let encoder = self.encodings.entry(name.clone()).or_default();
            encoder.fit(texts.iter().map(String::as_str));
            let codes: Vec<Value> = texts
                .iter()
                .map(|t| encoder.code(t).map(|c| Value::Int(c as i64)))
                .collect::<Result<_>>()?;
            dataset.set_derived(&format!("{name}{ENCODED_SUFFIX}"), codes)?;
        }

        self.numeric_features = numeric.clone();
        self.categorical_features = categorical.clone();
        Ok((numeric, categorical))
    }

    /// Derives quartile price tiers and attaches the tier label column.
    ///
    /// Returns the (label, max observed price) boundary per tier, cheapest
    /// first; the same mapping is retained for persistence.
    ///
    /// # Errors
    ///
    /// Returns a state error with no catalog, a schema error if the attribute
    /// is absent or not numeric, or a validation error if it still has
    /// missing values.
    pub fn build_price_tiers(&mut self, price_attr: &str) -> Result<Vec<(String, f64)>> {
        let dataset = self
            .dataset
            .as_mut()
            .ok_or_else(|| PredioError::state("no catalog loaded, call a load operation first"))?;

        let ty = dataset.schema().attr_type(price_attr).ok_or_else(|| {
            PredioError::schema(format!("price attribute '{price_attr}' is not in the schema"))
        })?;
        if !matches!(ty, AttrType::Continuous | AttrType::Discrete) {
            return Err(PredioError::schema(format!(
                "price attribute '{price_attr}' is not numeric"
            )));
        }

        let column = dataset.column(price_attr).expect("attribute checked above");
        let prices: Vec<f64> = column
            .iter()
            .map(|v| {
                v.as_f64().ok_or_else(|| {
                    PredioError::validation(format!(
                        "attribute '{price_attr}' has missing values, preprocess first"
                    ))
                })
            })
            .collect::<Result<_>>()?;

        let tiers = PriceTiers::from_prices(&prices)?;
        let labels: Vec<Value> = tiers
            .labels()
            .into_iter()
            .map(|l| Value::Text(l.to_string()))
            .collect();
        dataset.set_derived(TIER_COLUMN, labels)?;

        let boundaries = tiers.boundaries().to_vec();
        self.tier_boundaries = Some(boundaries.clone());
        Ok(boundaries)
    }

    /// Trains the price-tier classifier and returns held-out accuracy.
    ///
    /// Features are the numeric attributes plus encoded nominal codes, minus
    /// the target. Rows are shuffled into an 80/20 split with a fixed seed,
    /// the classifier scaler is fit on the training partition only, and a
    /// 100-tree forest of depth 10 is fit on the scaled features. Low
    /// accuracy is a value, never an error.
    ///
    /// # Errors
    ///
    /// Returns a state error if preprocessing hasn't run, a schema error if
    /// the target column is absent, or a validation error for a target that
    /// can't be encoded to class labels.
    pub fn train_classifier(&mut self, target: &str) -> Result<f32> {
        self.require_dataset()?;
        if !self.preprocessed() {
            return Err(PredioError::state(
                "preprocessing has not run, call preprocess() first",
            ));
        }

        let feature_names = self.classifier_feature_names(target);
        let dataset = self.dataset.as_ref().expect("checked above");
        if dataset.column(target).is_none() {
            return Err(PredioError::schema(format!(
                "target attribute '{target}' is not in the catalog"
            )));
        }

        let x = feature_matrix(dataset, &feature_names)?;
        let (y, target_encoder) = encode_target(dataset, target)?;

        let (x_train, x_test, y_train, y_test) =
            train_test_split(&x, &y, TEST_FRACTION, Some(SPLIT_SEED))?;

        let mut scaler = StandardScaler::new();
        let x_train = scaler.fit_transform(&x_train)?;
        let x_test = scaler.transform(&x_test)?;

        let mut forest = RandomForestClassifier::new(N_TREES)
            .with_max_depth(MAX_TREE_DEPTH)
            .with_random_state(FOREST_SEED);
        forest.fit(&x_train, &y_train)?;
        let accuracy = forest.score(&x_test, &y_test);

        let mut importances: Vec<(String, f32)> = forest
            .feature_importances()
            .unwrap_or_default()
            .into_iter()
            .zip(feature_names.iter())
            .map(|(imp, name)| (name.clone(), imp))
            .collect();
        importances.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        self.classifier_scaler = Some(scaler);
        self.classifier = Some(forest);
        self.classifier_features = feature_names;
        self.target_encoding = target_encoder.map(|e| (target.to_string(), e));
        self.importances = importances;
        self.accuracy = Some(accuracy);
        Ok(accuracy)
    }

    /// Feature names in classifier column order: numeric attributes first,
    /// then encoded nominal columns, with the target and its code excluded.
    fn classifier_feature_names(&self, target: &str) -> Vec<String> {
        let target_encoded = format!("{target}{ENCODED_SUFFIX}");
        self.numeric_features
            .iter()
            .filter(|n| n.as_str() != target)
            .cloned()
            .chain(
                self.categorical_features
                    .iter()
                    .filter(|n| n.as_str() != target)
                    .map(|n| format!("{n}{ENCODED_SUFFIX}")),
            )
            .filter(|n| *n != target_encoded)
            .collect()
    }

    /// Partitions the catalog into k segments and attaches cluster ids.
    ///
    /// The full feature matrix is standardized by a scaler fit here,
    /// independent of the classifier's. Returns the per-record cluster ids.
    ///
    /// # Errors
    ///
    /// Returns a state error if preprocessing hasn't run, or a validation
    /// error for k of zero or larger than the row count.
    pub fn train_clustering(&mut self, k: usize) -> Result<Vec<usize>> {
        self.require_dataset()?;
        if !self.preprocessed() {
            return Err(PredioError::state(
                "preprocessing has not run, call preprocess() first",
            ));
        }
        let n_rows = self.dataset.as_ref().expect("checked above").n_rows();
        if k == 0 || k > n_rows {
            return Err(PredioError::validation(format!(
                "k must be between 1 and the row count ({n_rows}), got {k}"
            )));
        }

        let feature_names: Vec<String> = self
            .numeric_features
            .iter()
            .cloned()
            .chain(
                self.categorical_features
                    .iter()
                    .map(|n| format!("{n}{ENCODED_SUFFIX}")),
            )
            .collect();
        let dataset = self.dataset.as_ref().expect("checked above");
        let x = feature_matrix(dataset, &feature_names)?;

        let mut scaler = StandardScaler::new();
        let x = scaler.fit_transform(&x)?;

        let mut km = KMeans::new(k).with_random_state(KMEANS_SEED);
        km.fit(&x)?;
        let labels = km.predict(&x)?;

        let dataset = self.dataset.as_mut().expect("checked above");
        let column: Vec<Value> = labels.iter().map(|&l| Value::Int(l as i64)).collect();
        dataset.set_derived(CLUSTER_COLUMN, column)?;

        self.cluster_scaler = Some(scaler);
        self.clusterer = Some(km);
        Ok(labels)
    }

    /// Applies criteria to the catalog, returning matching record ids in
    /// table order.
    ///
    /// # Errors
    ///
    /// Returns a state error if no catalog is loaded.
    pub fn filter(&self, criteria: &Criteria) -> Result<Vec<usize>> {
        Ok(filter::apply(self.require_dataset()?, criteria))
    }

    /// Up to `n` other records sharing the reference record's cluster, in
    /// table order. The reference itself is never included.
    ///
    /// # Errors
    ///
    /// Returns a state error before clustering, or a validation error for an
    /// out-of-range reference id.
    pub fn similar(&self, reference_id: usize, n: usize) -> Result<Vec<usize>> {
        let dataset = self.require_dataset()?;
        if self.clusterer.is_none() {
            return Err(PredioError::state(
                "clustering has not run, call train_clustering() first",
            ));
        }
        if reference_id >= dataset.n_rows() {
            return Err(PredioError::validation(format!(
                "reference id {reference_id} out of range (catalog has {} records)",
                dataset.n_rows()
            )));
        }

        let clusters = dataset
            .column(CLUSTER_COLUMN)
            .ok_or_else(|| PredioError::state("cluster column missing, retrain clustering"))?;
        let reference_cluster = &clusters[reference_id];

        Ok(clusters
            .iter()
            .enumerate()
            .filter(|(id, cluster)| *id != reference_id && *cluster == reference_cluster)
            .map(|(id, _)| id)
            .take(n)
            .collect())
    }

    /// Classifies one schema-conformant record with the fitted pipeline.
    ///
    /// The record's nominal values go through the stored encodings, the
    /// vector through the classifier scaler, and the forest's vote is decoded
    /// back to the target label.
    ///
    /// # Errors
    ///
    /// Returns a state error before classifier training, or a validation
    /// error for a missing attribute or a category absent from the stored
    /// encoding.
    pub fn predict_tier(&self, record: &BTreeMap<String, Value>) -> Result<String> {
        let forest = self.classifier.as_ref().ok_or_else(|| {
            PredioError::state("classifier has not been trained, call train_classifier() first")
        })?;
        let scaler = self
            .classifier_scaler
            .as_ref()
            .ok_or_else(|| PredioError::state("classifier scaler missing, retrain first"))?;

        let mut features = Vec::with_capacity(self.classifier_features.len());
        for name in &self.classifier_features {
            let value = if let Some(base) = name.strip_suffix(ENCODED_SUFFIX) {
                let encoder = self.encodings.get(base).ok_or_else(|| {
                    PredioError::state(format!("no encoding stored for attribute '{base}'"))
                })?;
                let text = record
                    .get(base)
                    .and_then(Value::as_text)
                    .ok_or_else(|| {
                        PredioError::validation(format!(
                            "record is missing nominal attribute '{base}'"
                        ))
                    })?;
                encoder.code(text)? as f32
            } else {
                record
                    .get(name)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| {
                        PredioError::validation(format!(
                            "record is missing numeric attribute '{name}'"
                        ))
                    })? as f32
            };
            features.push(value);
        }

        let x = Matrix::from_vec(1, features.len(), features)
            .map_err(|e| PredioError::validation(e.to_string()))?;
        let x = scaler.transform(&x)?;
        let code = forest.predict(&x)[0];

        match &self.target_encoding {
            Some((_, encoder)) => Ok(encoder.decode(code)?.to_string()),
            None => Ok(code.to_string()),
        }
    }

    /// Ranked (feature, importance) pairs from the fitted classifier.
    ///
    /// # Errors
    ///
    /// Returns a state error before classifier training.
    pub fn feature_importances(&self) -> Result<&[(String, f32)]> {
        if self.classifier.is_none() {
            return Err(PredioError::state(
                "classifier has not been trained, call train_classifier() first",
            ));
        }
        Ok(&self.importances)
    }

    /// Record counts per cluster id.
    ///
    /// # Errors
    ///
    /// Returns a state error before clustering, or a validation error if the
    /// cluster column disagrees with the fitted model (a tampered artifact
    /// snapshot can cause this).
    pub fn cluster_sizes(&self) -> Result<Vec<usize>> {
        let dataset = self.require_dataset()?;
        let km = self.clusterer.as_ref().ok_or_else(|| {
            PredioError::state("clustering has not run, call train_clustering() first")
        })?;
        let clusters = dataset
            .column(CLUSTER_COLUMN)
            .ok_or_else(|| PredioError::state("cluster column missing, retrain clustering"))?;

        let mut sizes = vec![0usize; km.k()];
        for (row, value) in clusters.iter().enumerate() {
            match value {
                Value::Int(id) if (0..km.k() as i64).contains(id) => {
                    sizes[*id as usize] += 1;
                }
                _ => {
                    return Err(PredioError::validation(format!(
                        "cluster column holds an invalid id at row {row}"
                    )))
                }
            }
        }
        Ok(sizes)
    }

    /// Held-out accuracy of the last classifier training.
    #[must_use]
    pub fn accuracy(&self) -> Option<f32> {
        self.accuracy
    }

    /// Persisted tier boundaries, cheapest tier first.
    #[must_use]
    pub fn tier_boundaries(&self) -> Option<&[(String, f64)]> {
        self.tier_boundaries.as_deref()
    }

    /// Saves the session's full state as an artifact file.
    ///
    /// # Errors
    ///
    /// Returns a state error if no catalog is loaded; persistence and I/O
    /// errors pass through from the artifact writer.
    pub fn save_artifact<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let dataset = self.require_dataset()?;
        let mut artifact = ModelArtifact::new(dataset.clone());
        artifact.classifier_scaler = self.classifier_scaler.clone();
        artifact.cluster_scaler = self.cluster_scaler.clone();
        artifact.encodings = self.encodings.clone();
        artifact.target_encoding = self.target_encoding.clone();
        artifact.classifier = self.classifier.clone();
        artifact.clusterer = self.clusterer.clone();
        artifact.numeric_features = self.numeric_features.clone();
        artifact.categorical_features = self.categorical_features.clone();
        artifact.classifier_features = self.classifier_features.clone();
        artifact.importances = self.importances.clone();
        artifact.tier_boundaries = self.tier_boundaries.clone();
        artifact.accuracy = self.accuracy;
        artifact.save_to_path(path)
    }

    /// Restores a session from an artifact file.
    ///
    /// The restored session answers filter, similarity, and inference calls
    /// exactly like the one that was saved, without touching the original
    /// data source.
    ///
    /// # Errors
    ///
    /// Returns persistence errors for malformed or incompatible artifacts;
    /// I/O errors pass through.
    pub fn load_artifact<P: AsRef<Path>>(path: P) -> Result<Self> {
        let artifact = ModelArtifact::load_from_path(path)?;
        Ok(Self {
            dataset: Some(artifact.dataset),
            numeric_features: artifact.numeric_features,
            categorical_features: artifact.categorical_features,
            encodings: artifact.encodings,
            target_encoding: artifact.target_encoding,
            classifier_scaler: artifact.classifier_scaler,
            cluster_scaler: artifact.cluster_scaler,
            classifier: artifact.classifier,
            classifier_features: artifact.classifier_features,
            importances: artifact.importances,
            accuracy: artifact.accuracy,
            clusterer: artifact.clusterer,
            tier_boundaries: artifact.tier_boundaries,
        })
    }
}

/// Fills every missing cell: mean for continuous, rounded mean for discrete,
/// majority value for flags, mode for nominal.
fn impute_missing(dataset: &mut Dataset) -> Result<()> {
    let attrs: Vec<(String, AttrType)> = dataset
        .schema()
        .iter()
        .map(|(n, t)| (n.to_string(), t))
        .collect();

    for (name, ty) in attrs {
        let column = dataset.column(&name).expect("schema column exists");
        if !column.iter().any(Value::is_missing) {
            continue;
        }

        let fill = match ty {
            AttrType::Continuous => {
                let present: Vec<f64> = column.iter().filter_map(Value::as_f64).collect();
                Value::Float(mean_of(&name, &present)?)
            }
            AttrType::Discrete => {
                let present: Vec<f64> = column.iter().filter_map(Value::as_f64).collect();
                Value::Int(mean_of(&name, &present)?.round() as i64)
            }
            AttrType::Flag => {
                let trues = column.iter().filter(|v| matches!(v, Value::Bool(true))).count();
                let falses = column.iter().filter(|v| matches!(v, Value::Bool(false))).count();
                if trues + falses == 0 {
                    return Err(PredioError::validation(format!(
                        "attribute '{name}' has no populated value to impute from"
                    )));
                }
                Value::Bool(trues > falses)
            }
            AttrType::Nominal => Value::Text(mode_text(&name, column)?),
        };

        let filled: Vec<Value> = column
            .iter()
            .map(|v| if v.is_missing() { fill.clone() } else { v.clone() })
            .collect();
        dataset.replace_column(&name, filled)?;
    }
    Ok(())
}

fn mean_of(name: &str, values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(PredioError::validation(format!(
            "attribute '{name}' has no populated value to impute from"
        )));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Most frequent text value; ties go to the earliest observed.
fn mode_text(name: &str, column: &[Value]) -> Result<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in column {
        if let Some(text) = value.as_text() {
            if let Some(entry) = counts.iter_mut().find(|(t, _)| *t == text) {
                entry.1 += 1;
            } else {
                counts.push((text, 1));
            }
        }
    }
    counts
        .iter()
        .max_by_key(|(_, c)| *c)
        .map(|(t, _)| (*t).to_string())
        .ok_or_else(|| {
            PredioError::validation(format!(
                "attribute '{name}' has no populated value to impute from"
            ))
        })
}

/// Assembles named columns into an f32 feature matrix.
fn feature_matrix(dataset: &Dataset, names: &[String]) -> Result<Matrix> {
    let n_rows = dataset.n_rows();
    let n_cols = names.len();
    let mut data = vec![0.0f32; n_rows * n_cols];

    for (col, name) in names.iter().enumerate() {
        let column = dataset
            .column(name)
            .ok_or_else(|| PredioError::schema(format!("feature column '{name}' not found")))?;
        for (row, value) in column.iter().enumerate() {
            let v = value.as_f64().ok_or_else(|| {
                PredioError::validation(format!(
                    "feature column '{name}' has a non-numeric value at row {row}"
                ))
            })?;
            data[row * n_cols + col] = v as f32;
        }
    }

    Matrix::from_vec(n_rows, n_cols, data).map_err(|e| PredioError::validation(e.to_string()))
}

/// Encodes a target column to integer class labels.
///
/// Text targets get a dedicated encoder (returned for decoding predictions),
/// non-negative integers and flags map directly, and continuous targets are
/// rejected.
fn encode_target(dataset: &Dataset, target: &str) -> Result<(Vec<usize>, Option<CategoryEncoder>)> {
    let column = dataset
        .column(target)
        .ok_or_else(|| PredioError::schema(format!("target attribute '{target}' not found")))?;

    let is_text = column.iter().any(|v| matches!(v, Value::Text(_)));
    if is_text {
        let mut encoder = CategoryEncoder::new();
        let texts: Vec<&str> = column
            .iter()
            .map(|v| {
                v.as_text().ok_or_else(|| {
                    PredioError::validation(format!("target '{target}' mixes text and non-text"))
                })
            })
            .collect::<Result<_>>()?;
        encoder.fit(texts.iter().copied());
        let labels = texts
            .iter()
            .map(|t| encoder.code(t))
            .collect::<Result<_>>()?;
        return Ok((labels, Some(encoder)));
    }

    let labels = column
        .iter()
        .map(|v| match v {
            Value::Int(i) if *i >= 0 => Ok(*i as usize),
            Value::Bool(b) => Ok(usize::from(*b)),
            _ => Err(PredioError::validation(format!(
                "target '{target}' must be nominal, non-negative integer, or flag"
            ))),
        })
        .collect::<Result<_>>()?;
    Ok((labels, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_schema() -> Schema {
        Schema::new(vec![
            ("tipo".to_string(), AttrType::Nominal),
            ("precio".to_string(), AttrType::Continuous),
            ("area_m2".to_string(), AttrType::Continuous),
            ("habitaciones".to_string(), AttrType::Discrete),
            ("tiene_jardin".to_string(), AttrType::Flag),
        ])
        .unwrap()
    }

    fn record(tipo: &str, precio: f64, area: f64, hab: i64, jardin: bool) -> BTreeMap<String, Value> {
        let mut r = BTreeMap::new();
        r.insert("tipo".to_string(), Value::Text(tipo.to_string()));
        r.insert("precio".to_string(), Value::Float(precio));
        r.insert("area_m2".to_string(), Value::Float(area));
        r.insert("habitaciones".to_string(), Value::Int(hab));
        r.insert("tiene_jardin".to_string(), Value::Bool(jardin));
        r
    }

    /// 20 listings with price roughly tracking area and type.
    fn catalog() -> Vec<BTreeMap<String, Value>> {
        let mut records = Vec::new();
        for i in 0..20i64 {
            let tipo = if i % 2 == 0 { "Casa" } else { "Apartamento" };
            let area = 50.0 + 15.0 * i as f64;
            let precio = 60_000.0 + 22_000.0 * i as f64;
            records.push(record(tipo, precio, area, 1 + i % 5, i % 3 == 0));
        }
        records
    }

    fn loaded_session() -> ModelSession {
        let mut session = ModelSession::new();
        session.load_records(listing_schema(), &catalog()).unwrap();
        session
    }

    #[test]
    fn test_preprocess_partitions_attributes() {
        let mut session = loaded_session();
        let (numeric, categorical) = session.preprocess(None).unwrap();
        assert_eq!(numeric, vec!["precio", "area_m2", "habitaciones", "tiene_jardin"]);
        assert_eq!(categorical, vec!["tipo"]);
        assert!(session.dataset().unwrap().has_column("tipo_encoded"));
    }

    #[test]
    fn test_preprocess_excludes_target() {
        let mut session = loaded_session();
        let (numeric, _) = session.preprocess(Some("precio")).unwrap();
        assert!(!numeric.contains(&"precio".to_string()));
    }

    #[test]
    fn test_preprocess_imputes_missing() {
        let mut records = catalog();
        records[0].insert("area_m2".to_string(), Value::Missing);
        records[1].insert("tipo".to_string(), Value::Missing);
        let mut session = ModelSession::new();
        session.load_records(listing_schema(), &records).unwrap();
        session.preprocess(None).unwrap();

        let ds = session.dataset().unwrap();
        assert!(!ds.column("area_m2").unwrap()[0].is_missing());
        assert!(matches!(ds.column("tipo").unwrap()[1], Value::Text(_)));
    }

    #[test]
    fn test_preprocess_without_load_is_schema_error() {
        let mut session = ModelSession::new();
        assert!(matches!(
            session.preprocess(None),
            Err(PredioError::Schema { .. })
        ));
    }

    #[test]
    fn test_preprocess_twice_keeps_codes() {
        let mut session = loaded_session();
        session.preprocess(None).unwrap();
        let before = session.dataset().unwrap().column("tipo_encoded").unwrap().to_vec();
        session.preprocess(None).unwrap();
        let after = session.dataset().unwrap().column("tipo_encoded").unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_build_tiers_attaches_labels() {
        let mut session = loaded_session();
        session.preprocess(None).unwrap();
        let boundaries = session.build_price_tiers("precio").unwrap();
        assert_eq!(boundaries.len(), 4);
        assert_eq!(boundaries[0].0, "Economico");

        let labels = session.dataset().unwrap().column(TIER_COLUMN).unwrap();
        assert_eq!(labels.len(), 20);
        // Cheapest record is Economico, priciest is Premium.
        assert_eq!(labels[0], Value::Text("Economico".to_string()));
        assert_eq!(labels[19], Value::Text("Premium".to_string()));
    }

    #[test]
    fn test_build_tiers_unknown_attribute() {
        let mut session = loaded_session();
        assert!(matches!(
            session.build_price_tiers("alquiler"),
            Err(PredioError::Schema { .. })
        ));
    }

    #[test]
    fn test_train_classifier_accuracy_in_range() {
        let mut session = loaded_session();
        session.preprocess(None).unwrap();
        session.build_price_tiers("precio").unwrap();
        let accuracy = session.train_classifier(TIER_COLUMN).unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
        assert_eq!(session.accuracy(), Some(accuracy));

        let importances = session.feature_importances().unwrap();
        assert!(!importances.is_empty());
        // Ranked descending.
        for pair in importances.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn test_train_classifier_before_preprocess() {
        let mut session = loaded_session();
        assert!(matches!(
            session.train_classifier("precio"),
            Err(PredioError::State { .. })
        ));
    }

    #[test]
    fn test_train_classifier_missing_target() {
        let mut session = loaded_session();
        session.preprocess(None).unwrap();
        assert!(matches!(
            session.train_classifier("no_existe"),
            Err(PredioError::Schema { .. })
        ));
    }

    #[test]
    fn test_train_clustering_assigns_ids() {
        let mut session = loaded_session();
        session.preprocess(None).unwrap();
        let labels = session.train_clustering(3).unwrap();
        assert_eq!(labels.len(), 20);
        assert!(labels.iter().all(|&l| l < 3));

        let sizes = session.cluster_sizes().unwrap();
        assert_eq!(sizes.iter().sum::<usize>(), 20);
    }

    #[test]
    fn test_train_clustering_invalid_k() {
        let mut session = loaded_session();
        session.preprocess(None).unwrap();
        assert!(matches!(
            session.train_clustering(0),
            Err(PredioError::Validation { .. })
        ));
        assert!(matches!(
            session.train_clustering(21),
            Err(PredioError::Validation { .. })
        ));
    }

    #[test]
    fn test_filter_before_load_is_state_error() {
        let session = ModelSession::new();
        assert!(matches!(
            session.filter(&Criteria::new()),
            Err(PredioError::State { .. })
        ));
    }

    #[test]
    fn test_similar_before_clustering_is_state_error() {
        let session = loaded_session();
        assert!(matches!(
            session.similar(0, 3),
            Err(PredioError::State { .. })
        ));
    }

    #[test]
    fn test_similar_excludes_reference() {
        let mut session = loaded_session();
        session.preprocess(None).unwrap();
        session.train_clustering(2).unwrap();
        let similar = session.similar(0, 100).unwrap();
        assert!(!similar.contains(&0));
        assert!(similar.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_similar_out_of_range() {
        let mut session = loaded_session();
        session.preprocess(None).unwrap();
        session.train_clustering(2).unwrap();
        assert!(matches!(
            session.similar(99, 3),
            Err(PredioError::Validation { .. })
        ));
    }

    #[test]
    fn test_predict_tier_on_known_record() {
        let mut session = loaded_session();
        session.preprocess(None).unwrap();
        session.build_price_tiers("precio").unwrap();
        session.train_classifier(TIER_COLUMN).unwrap();

        let cheap = record("Apartamento", 65_000.0, 55.0, 1, false);
        let label = session.predict_tier(&cheap).unwrap();
        assert!(crate::tiers::TIER_LABELS.contains(&label.as_str()));
    }

    #[test]
    fn test_predict_tier_unseen_category() {
        let mut session = loaded_session();
        session.preprocess(None).unwrap();
        session.build_price_tiers("precio").unwrap();
        session.train_classifier(TIER_COLUMN).unwrap();

        let odd = record("Castillo", 65_000.0, 55.0, 1, false);
        assert!(matches!(
            session.predict_tier(&odd),
            Err(PredioError::Validation { .. })
        ));
    }

    #[test]
    fn test_reload_resets_trained_state() {
        let mut session = loaded_session();
        session.preprocess(None).unwrap();
        session.train_clustering(2).unwrap();
        session.load_records(listing_schema(), &catalog()).unwrap();
        assert!(matches!(session.similar(0, 3), Err(PredioError::State { .. })));
    }
}
