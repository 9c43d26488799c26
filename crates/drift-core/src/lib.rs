//! # drift-core
//!
//! Core types for the drift schema-migration engine. This crate has no
//! dependency on the rest of the workspace and provides the foundation for
//! all other crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`config`] - Engine configuration loaded from the environment
//! - [`logging`] - Tracing-based logging integration

pub mod config;
pub mod error;
pub mod logging;

// Re-export the most commonly used types at the crate root.
pub use config::Config;
pub use error::{DriftError, DriftResult};
