//! # Domain Layer
//!
//! Member transactions, history, features and offers. Nothing in here
//! performs I/O.

pub mod entities;
pub mod services;
pub mod value_objects;
