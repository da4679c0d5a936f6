//! Wiring of settings, upstream clients and the router.

use crate::api::rest::{AppState, create_router};
use crate::application::services::OfferPipeline;
use crate::config::{ConfigError, Settings};
use crate::infrastructure::upstream::{
    HttpMemberHistoryStore, HttpOfferEngine, HttpPredictionClient, ResilientHttpClient,
    UpstreamError, UpstreamService,
};
use axum::Router;
use std::sync::Arc;
use thiserror::Error;

/// Startup errors.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Settings are unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An upstream client could not be built.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

fn client(
    settings: &Settings,
    service: UpstreamService,
) -> Result<ResilientHttpClient, BootstrapError> {
    Ok(ResilientHttpClient::new(service, settings.client_config(service)?)?)
}

/// Builds the offer pipeline with one HTTP client per upstream.
///
/// # Errors
///
/// Returns `BootstrapError` if a client cannot be configured.
pub fn build_pipeline(settings: &Settings) -> Result<OfferPipeline, BootstrapError> {
    let history = HttpMemberHistoryStore::new(client(settings, UpstreamService::MemberHistory)?);
    let predictions = HttpPredictionClient::new(client(settings, UpstreamService::Prediction)?);
    let offers = HttpOfferEngine::new(client(settings, UpstreamService::OfferEngine)?);

    Ok(OfferPipeline::new(
        Arc::new(history),
        Arc::new(predictions),
        Arc::new(offers),
        settings.pipeline_config(),
    ))
}

/// Builds the complete HTTP application.
///
/// # Errors
///
/// Returns `BootstrapError` if a client cannot be configured.
pub fn build_app(settings: &Settings) -> Result<Router, BootstrapError> {
    let pipeline = build_pipeline(settings)?;
    Ok(create_router(
        AppState::new(pipeline),
        settings.correlation_header()?,
    ))
}
