//! # Infrastructure Layer
//!
//! Adapters for the outside world: HTTP clients for the member-history
//! store, the prediction service and the offer engine.

pub mod upstream;
