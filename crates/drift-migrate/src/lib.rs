//! # drift-migrate
//!
//! The migration engine: a versioned, checksum-protected directory of SQL
//! files, a planner that derives new files from a desired state, and an
//! executor that applies pending files with durable revision tracking.
//!
//! ## Architecture
//!
//! - [`dir`] - [`Dir`] storage abstraction, the [`LocalDir`] filesystem
//!   backend, and statement parsing.
//! - [`sum`] - The integrity manifest (`atlas.sum`) and directory
//!   validation.
//! - [`format`] - [`Formatter`] implementations for the supported on-disk
//!   migration formats.
//! - [`planner`] - [`Planner`]: replay the directory on a dev database,
//!   diff against the desired realm, emit a new migration file.
//! - [`executor`] - [`Executor`]: apply pending files in order under the
//!   revision state machine, plus the progress [`Logger`] and the dry-run
//!   decorators.
//! - [`revision`] - [`Revision`] rows and the [`RevisionStore`]
//!   implementations.

// Clippy overrides appropriate for a SQL-rendering migration crate.
#![allow(clippy::result_large_err)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::format_push_string)]

pub mod dir;
pub mod executor;
pub mod format;
pub mod planner;
pub mod revision;
pub mod sum;

// Re-export key types at the crate root.
pub use dir::{Dir, LocalDir, MigrationFile, Statement, SUM_FILENAME};
pub use drift_db::plan::{Plan, PlannedChange};
pub use executor::{DryRunDriver, DryRunRevisions, Executor, LogEntry, Logger, NopLogger};
pub use format::{AtlasFormatter, Formatter, PlanFile};
pub use planner::Planner;
pub use revision::{ExecutionState, MemRevisions, NopRevisions, Revision, RevisionStore, TableRevisions};
pub use sum::{validate, SumFile};
