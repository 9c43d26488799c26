//! Engine configuration.
//!
//! This module provides the [`Config`] struct holding the settings shared by
//! every drift command: the migration directory location, the target and dev
//! database URLs, and the revision table name. Values are read from the
//! environment with sensible defaults; command-line flags override them at
//! the CLI layer.

use crate::error::{DriftError, DriftResult};

/// The default name of the table holding applied-revision rows.
pub const DEFAULT_REVISIONS_TABLE: &str = "atlas_schema_revisions";

/// Configuration shared by drift commands.
#[derive(Debug, Clone)]
pub struct Config {
    /// Location of the migration directory (e.g. `file://migrations`).
    pub dir_url: String,
    /// URL of the target database for `apply`.
    pub db_url: String,
    /// URL of the disposable dev database for `diff`, `validate`, and `lint`.
    pub dev_url: String,
    /// Name of the revision table in the target database.
    pub revisions_table: String,
    /// Log filter directive (e.g. `info`, `drift=debug`).
    pub log_level: String,
    /// Whether human-readable (pretty) log output is enabled.
    pub debug: bool,
    /// Tool identifier recorded in every revision row.
    pub operator_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir_url: "file://migrations".to_string(),
            db_url: String::new(),
            dev_url: String::new(),
            revisions_table: DEFAULT_REVISIONS_TABLE.to_string(),
            log_level: "info".to_string(),
            debug: false,
            operator_version: format!("drift/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Builds a configuration from `DRIFT_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> DriftResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = read_env("DRIFT_DIR")? {
            cfg.dir_url = v;
        }
        if let Some(v) = read_env("DRIFT_URL")? {
            cfg.db_url = v;
        }
        if let Some(v) = read_env("DRIFT_DEV_URL")? {
            cfg.dev_url = v;
        }
        if let Some(v) = read_env("DRIFT_REVISIONS_TABLE")? {
            if v.is_empty() {
                return Err(DriftError::Config(
                    "DRIFT_REVISIONS_TABLE must not be empty".into(),
                ));
            }
            cfg.revisions_table = v;
        }
        if let Some(v) = read_env("DRIFT_LOG")? {
            cfg.log_level = v;
        }
        if let Some(v) = read_env("DRIFT_DEBUG")? {
            cfg.debug = matches!(v.as_str(), "1" | "true" | "yes");
        }
        Ok(cfg)
    }
}

/// Reads an environment variable, mapping non-unicode values to a
/// configuration error instead of panicking.
fn read_env(key: &str) -> DriftResult<Option<String>> {
    match std::env::var(key) {
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(DriftError::Config(format!(
            "{key} contains non-unicode data"
        ))),
    }
}
