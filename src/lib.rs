//! # Member Offer Orchestrator
//!
//! Coordinates one member transaction across three backend services and
//! returns a single offer decision:
//!
//! 1. validate the inbound transaction
//! 2. fetch the member's history (absent history is not an error)
//! 3. compute model features
//! 4. run the ATS and RESP predictions concurrently
//! 5. ask the offer engine for a decision
//! 6. write the transaction back to history, best-effort
//!
//! Every outbound call carries the request's correlation id and runs under
//! a timeout with bounded, jittered retries.
//!
//! ## Layout
//!
//! - [`domain`]: transactions, history, features, offers; no I/O
//! - [`application`]: the offer pipeline and its error taxonomy
//! - [`infrastructure`]: resilient HTTP clients for the backends
//! - [`api`]: axum router, correlation middleware, error envelope
//! - [`config`], [`telemetry`], [`bootstrap`]: process setup

pub mod api;
pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod telemetry;
