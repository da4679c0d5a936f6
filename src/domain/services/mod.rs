//! # Domain Services
//!
//! Pure business logic that doesn't naturally belong to a single entity or
//! value object.
//!
//! ## Services
//!
//! - [`features::compute_features`]: model input features from member history

pub mod features;

pub use features::{FeatureInvariantError, FeatureVector, compute_features};
