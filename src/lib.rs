//! # predio
//!
//! In-memory modeling engine for a real-estate listing catalog: a typed
//! record table, feature encoding and scaling, a random-forest price-tier
//! classifier, k-means segmentation, a declarative criteria filter, and
//! cluster-based similarity search, all persistable as a single artifact.
//!
//! ## Quick start
//!
//! ```
//! use predio::prelude::*;
//! use predio::table::{AttrType, Value};
//! use std::collections::BTreeMap;
//!
//! let schema = Schema::new(vec![
//!     ("tipo".to_string(), AttrType::Nominal),
//!     ("precio".to_string(), AttrType::Continuous),
//! ])?;
//!
//! let records: Vec<BTreeMap<String, Value>> = (0..8)
//!     .map(|i| {
//!         let mut r = BTreeMap::new();
//!         r.insert("tipo".to_string(), Value::Text("Casa".to_string()));
//!         r.insert("precio".to_string(), Value::Float(100_000.0 + 50_000.0 * f64::from(i)));
//!         r
//!     })
//!     .collect();
//!
//! let mut session = ModelSession::new();
//! session.load_records(schema, &records)?;
//! session.preprocess(None)?;
//! session.build_price_tiers("precio")?;
//!
//! let casas = session.filter(&Criteria::new().with("tipo", "Casa"))?;
//! assert_eq!(casas.len(), 8);
//! # Ok::<(), predio::PredioError>(())
//! ```
//!
//! ## Design
//!
//! A [`session::ModelSession`] exclusively owns its catalog and every piece
//! of derived state; there is no process-wide model. Operations return
//! [`error::PredioError`] values, never panic on caller mistakes, and every
//! seeded routine (splits, forests, k-means restarts) is reproducible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod artifact;
pub mod cluster;
pub mod error;
pub mod filter;
pub mod model_selection;
pub mod prelude;
pub mod preprocessing;
pub mod primitives;
pub mod session;
pub mod table;
pub mod tiers;
pub mod traits;
pub mod tree;

pub use error::{PredioError, Result};
