//! # Upstream Services
//!
//! Clients for the backend services the orchestrator coordinates.
//!
//! ## Shared
//!
//! - [`http_client::ResilientHttpClient`]: timeouts, retries, correlation header
//! - [`retry::RetryPolicy`]: backoff with jitter
//! - [`error::UpstreamError`]: timeout or failure with call context
//!
//! ## Ports and adapters
//!
//! | Port | HTTP adapter |
//! |------|--------------|
//! | [`traits::MemberHistoryStore`] | [`member_history::HttpMemberHistoryStore`] |
//! | [`traits::PredictionService`] | [`prediction::HttpPredictionClient`] |
//! | [`traits::OfferEngine`] | [`offer_engine::HttpOfferEngine`] |

pub mod error;
pub mod http_client;
pub mod member_history;
pub mod offer_engine;
pub mod prediction;
pub mod retry;
pub mod traits;

pub use error::{UpstreamError, UpstreamResult, UpstreamService};
pub use http_client::{ResilientHttpClient, UpstreamClientConfig, UpstreamResponse};
pub use member_history::HttpMemberHistoryStore;
pub use offer_engine::HttpOfferEngine;
pub use prediction::HttpPredictionClient;
pub use retry::RetryPolicy;
pub use traits::{MemberHistoryStore, OfferEngine, PredictionService};
