//! Persistable model artifact.
//!
//! One self-describing JSON blob captures everything a session needs to serve
//! queries and inference after a restart: the table snapshot with derived
//! columns, both scalers, category encodings, the fitted forest and k-means
//! model, feature lists, and tier boundaries. Writes go through a temp file
//! in the destination directory followed by a rename, so a crashed save
//! never leaves a half-written artifact behind.

use crate::cluster::KMeans;
use crate::error::{PredioError, Result};
use crate::preprocessing::{CategoryEncoder, StandardScaler};
use crate::table::Dataset;
use crate::tree::RandomForestClassifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Tag identifying the blob as ours.
pub const FORMAT_TAG: &str = "predio-artifact";

/// Current (major, minor) artifact version. A different major is rejected.
pub const FORMAT_VERSION: (u32, u32) = (1, 0);

/// Serialized state of a trained session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    format: String,
    version: (u32, u32),
    /// Table snapshot including derived columns.
    pub dataset: Dataset,
    /// Scaler fitted on the classifier's training partition.
    pub classifier_scaler: Option<StandardScaler>,
    /// Scaler fitted independently for clustering.
    pub cluster_scaler: Option<StandardScaler>,
    /// Category encoders keyed by nominal attribute name.
    pub encodings: BTreeMap<String, CategoryEncoder>,
    /// Encoder for the classification target, with the target's name.
    pub target_encoding: Option<(String, CategoryEncoder)>,
    /// Fitted price-tier classifier.
    pub classifier: Option<RandomForestClassifier>,
    /// Fitted segmentation model.
    pub clusterer: Option<KMeans>,
    /// Numeric attribute names entering feature matrices, in schema order.
    pub numeric_features: Vec<String>,
    /// Nominal attribute names entering via their encoded columns.
    pub categorical_features: Vec<String>,
    /// Feature names in the classifier's column order.
    pub classifier_features: Vec<String>,
    /// (feature, importance) ranking from the fitted forest.
    pub importances: Vec<(String, f32)>,
    /// (tier label, max observed price) pairs, cheapest first.
    pub tier_boundaries: Option<Vec<(String, f64)>>,
    /// Held-out accuracy of the fitted classifier.
    pub accuracy: Option<f32>,
}

impl ModelArtifact {
    /// Creates an artifact around a table snapshot, with the current format
    /// tag and version. Model fields start empty; the session fills them.
    #[must_use]
    pub fn new(dataset: Dataset) -> Self {
        Self {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            dataset,
            classifier_scaler: None,
            cluster_scaler: None,
            encodings: BTreeMap::new(),
            target_encoding: None,
            classifier: None,
            clusterer: None,
            numeric_features: Vec::new(),
            categorical_features: Vec::new(),
            classifier_features: Vec::new(),
            importances: Vec::new(),
            tier_boundaries: None,
            accuracy: None,
        }
    }

    /// Writes the artifact as JSON, atomically.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if serialization fails, or an I/O error
    /// from the filesystem.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());

        let json = serde_json::to_vec(self)
            .map_err(|e| PredioError::persistence(format!("artifact serialization failed: {e}")))?;

        // Temp file in the same directory so the rename stays on one
        // filesystem.
        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
            None => tempfile::NamedTempFile::new_in(".")?,
        };
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.persist(path)
            .map_err(|e| PredioError::persistence(format!("atomic rename failed: {e}")))?;
        Ok(())
    }

    /// Reads and validates an artifact from disk.
    ///
    /// # Errors
    ///
    /// Returns a persistence error for malformed JSON, a foreign format tag,
    /// or an unsupported major version; I/O errors pass through.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let artifact: Self = serde_json::from_str(&text)
            .map_err(|e| PredioError::persistence(format!("malformed artifact: {e}")))?;

        if artifact.format != FORMAT_TAG {
            return Err(PredioError::persistence(format!(
                "not a model artifact: format tag '{}'",
                artifact.format
            )));
        }
        if artifact.version.0 != FORMAT_VERSION.0 {
            return Err(PredioError::persistence(format!(
                "unsupported artifact version {}.{} (supported: {}.x)",
                artifact.version.0, artifact.version.1, FORMAT_VERSION.0
            )));
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{AttrType, Schema, Value};

    fn tiny_dataset() -> Dataset {
        let schema = Schema::new(vec![("precio".to_string(), AttrType::Continuous)]).unwrap();
        let records: Vec<BTreeMap<String, Value>> = [100.0, 200.0]
            .iter()
            .map(|&p| {
                let mut r = BTreeMap::new();
                r.insert("precio".to_string(), Value::Float(p));
                r
            })
            .collect();
        Dataset::from_records(schema, &records).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelo.json");

        let mut artifact = ModelArtifact::new(tiny_dataset());
        artifact.numeric_features = vec!["precio".to_string()];
        artifact.accuracy = Some(0.9);
        artifact.save_to_path(&path).unwrap();

        let restored = ModelArtifact::load_from_path(&path).unwrap();
        assert_eq!(restored.dataset, artifact.dataset);
        assert_eq!(restored.numeric_features, vec!["precio"]);
        assert_eq!(restored.accuracy, Some(0.9));
    }

    #[test]
    fn test_load_rejects_foreign_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otro.json");

        let mut artifact = ModelArtifact::new(tiny_dataset());
        artifact.format = "otra-cosa".to_string();
        let json = serde_json::to_string(&artifact).unwrap();
        std::fs::write(&path, json).unwrap();

        assert!(matches!(
            ModelArtifact::load_from_path(&path),
            Err(PredioError::Persistence { .. })
        ));
    }

    #[test]
    fn test_load_rejects_future_major() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("futuro.json");

        let mut artifact = ModelArtifact::new(tiny_dataset());
        artifact.version = (2, 0);
        let json = serde_json::to_string(&artifact).unwrap();
        std::fs::write(&path, json).unwrap();

        assert!(matches!(
            ModelArtifact::load_from_path(&path),
            Err(PredioError::Persistence { .. })
        ));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roto.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ModelArtifact::load_from_path(&path),
            Err(PredioError::Persistence { .. })
        ));
    }

    #[test]
    fn test_load_missing_file_is_io() {
        let result = ModelArtifact::load_from_path("/no/existe/modelo.json");
        assert!(matches!(result, Err(PredioError::Io(_))));
    }

    #[test]
    fn test_save_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelo.json");

        let mut artifact = ModelArtifact::new(tiny_dataset());
        artifact.accuracy = Some(0.5);
        artifact.save_to_path(&path).unwrap();
        artifact.accuracy = Some(0.8);
        artifact.save_to_path(&path).unwrap();

        let restored = ModelArtifact::load_from_path(&path).unwrap();
        assert_eq!(restored.accuracy, Some(0.8));
    }
}
