//! # Application Layer
//!
//! Use-case orchestration on top of the domain and the upstream ports.

pub mod error;
pub mod services;
