//! Convenience re-exports for the common pipeline.
//!
//! ```
//! use predio::prelude::*;
//! ```

pub use crate::artifact::ModelArtifact;
pub use crate::cluster::KMeans;
pub use crate::error::{PredioError, Result};
pub use crate::filter::{Criteria, CriterionValue};
pub use crate::model_selection::train_test_split;
pub use crate::preprocessing::{CategoryEncoder, StandardScaler};
pub use crate::primitives::Matrix;
pub use crate::session::ModelSession;
pub use crate::table::{Dataset, Schema};
pub use crate::tiers::PriceTiers;
pub use crate::traits::{Transformer, UnsupervisedEstimator};
pub use crate::tree::{DecisionTreeClassifier, RandomForestClassifier};
