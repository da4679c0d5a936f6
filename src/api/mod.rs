//! # API Layer
//!
//! Inbound HTTP surface of the orchestrator.

pub mod rest;
