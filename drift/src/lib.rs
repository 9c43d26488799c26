//! # drift
//!
//! A versioned schema-migration engine for relational databases.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient
//! access. You can depend on `drift` to get the whole engine, or depend on
//! individual crates for finer-grained control.

/// Core error types, configuration, and logging.
pub use drift_core as core;

/// Schema model, change set, and driver abstraction.
pub use drift_db as db;

/// Migration directory, planner, executor, and revision store.
pub use drift_migrate as migrate;

/// Change analysis: destructive and data-dependent change detection.
pub use drift_lint as lint;

/// Management commands (CLI).
pub use drift_cli as cli;
