//! # Application Services
//!
//! - [`pipeline::OfferPipeline`]: the end-to-end offer flow

pub mod pipeline;

pub use pipeline::{OfferPipeline, PipelineConfig, PipelineOutcome, PipelineStage};
