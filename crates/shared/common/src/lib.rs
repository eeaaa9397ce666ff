//! Common utilities shared across the data-access crates.
//!
//! This crate provides:
//! - Unified error handling for every provider
//! - Configuration structures loaded from the environment
//! - Tracing initialization

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::*;
pub use error::{AppError, AppResult, OptionExt};
pub use telemetry::init_tracing;
