//! Core compute primitives.
//!
//! The pipeline moves data around as dense `f32` matrices; everything the
//! scalers, the forest, and k-means need lives here.

mod matrix;

pub use matrix::Matrix;
pub(crate) use matrix::distance_squared;
