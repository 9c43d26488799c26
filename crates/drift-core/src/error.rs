//! Core error types for the drift migration engine.
//!
//! This module provides the engine-wide error enum [`DriftError`]. Lower
//! layers return typed variants that callers can match on; several variants
//! (for example [`DriftError::NoPlan`] and [`DriftError::NoPendingFiles`])
//! are sentinels that front-ends recognize and turn into friendly output
//! rather than failures.

use thiserror::Error;

/// The primary error type for the drift migration engine.
///
/// Variants are grouped by the subsystem that produces them. The groups
/// mirror the engine's error taxonomy: directory errors, planning errors,
/// execution errors, parse errors, analysis errors, and infrastructure
/// errors.
#[derive(Error, Debug)]
pub enum DriftError {
    // ── Directory ────────────────────────────────────────────────────

    /// The migration directory does not match its integrity manifest.
    #[error("checksum mismatch: migration directory was modified outside of drift")]
    ChecksumMismatch,

    /// A file with the given name already exists in the directory.
    #[error("file already exists: {0}")]
    Exists(String),

    /// The directory (or a file inside it) was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The directory location URL is malformed or uses an unknown scheme.
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    // ── Planning ─────────────────────────────────────────────────────

    /// The current and desired states are identical, there is nothing to plan.
    #[error("the migration directory is synced with the desired state")]
    NoPlan,

    /// The desired state was read from a database of a different dialect.
    #[error("dialect mismatch: dev database is {expected}, desired state is {found}")]
    DialectMismatch {
        /// The dev database dialect.
        expected: String,
        /// The dialect of the desired-state connection.
        found: String,
    },

    // ── Execution ────────────────────────────────────────────────────

    /// There are no migration files left to apply.
    #[error("the migration directory is synced with the database")]
    NoPendingFiles,

    /// A named advisory lock is held by another process.
    #[error("lock {0:?} is held by another process")]
    Locked(String),

    /// A revision row is still in the `ongoing` state from a previous run.
    #[error("revision {0} is still ongoing, manual intervention is required")]
    RevisionOngoing(String),

    /// A previous apply attempt failed and was not resolved.
    #[error("revision {version} failed previously: {error}")]
    PreviousError {
        /// Version of the failed revision.
        version: String,
        /// The recorded failure.
        error: String,
    },

    /// An applied file's content no longer matches its recorded hash.
    #[error("hash of migration file {0} does not match its revision record")]
    HashMismatch(String),

    /// A revision row exists for a version with no matching migration file.
    #[error("revision {0} has no matching migration file")]
    OrphanRevision(String),

    // ── Parse ────────────────────────────────────────────────────────

    /// A migration file could not be split into statements.
    #[error("parse {file}: {message}")]
    ParseFile {
        /// The offending file name.
        file: String,
        /// Why parsing failed.
        message: String,
    },

    // ── Analysis ─────────────────────────────────────────────────────

    /// An analyzer or the analysis pipeline itself failed.
    #[error("analysis failure: {0}")]
    Analyzer(String),

    /// Analyzers reported diagnostics at error severity.
    #[error("{0} diagnostic(s) reported")]
    Diagnostics(usize),

    // ── Infrastructure ───────────────────────────────────────────────

    /// A SQL statement failed to execute.
    #[error("sql error: {0}")]
    Sql(String),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DriftError {
    /// Returns a remediation hint suitable for printing after the error line.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ChecksumMismatch => Some("run `drift migrate hash` to re-hash the directory"),
            Self::RevisionOngoing(_) => {
                Some("inspect the revisions table and remove the ongoing row once resolved")
            }
            Self::PreviousError { .. } => {
                Some("fix the failing file and clear the errored revision before retrying")
            }
            Self::HashMismatch(_) => {
                Some("applied migration files must not be edited; restore the original contents")
            }
            _ => None,
        }
    }

    /// Returns the process exit code for this error.
    ///
    /// User errors map to 1; analyzer diagnostics map to 2.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Diagnostics(_) => 2,
            _ => 1,
        }
    }
}

/// A convenience type alias for `Result<T, DriftError>`.
pub type DriftResult<T> = Result<T, DriftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_checksum_mismatch() {
        let err = DriftError::ChecksumMismatch;
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_display_previous_error() {
        let err = DriftError::PreviousError {
            version: "20230101000000".into(),
            error: "syntax error".into(),
        };
        assert!(err.to_string().contains("20230101000000"));
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_hints() {
        assert!(DriftError::ChecksumMismatch.hint().is_some());
        assert!(DriftError::HashMismatch("x".into()).hint().is_some());
        assert!(DriftError::NoPlan.hint().is_none());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(DriftError::ChecksumMismatch.exit_code(), 1);
        assert_eq!(DriftError::Diagnostics(3).exit_code(), 2);
        assert_eq!(DriftError::Locked("l".into()).exit_code(), 1);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DriftError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }
}
