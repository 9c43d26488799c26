//! Built-in migrate commands.
//!
//! Every command works against a migration directory and, where needed, a
//! database opened through the driver registry. All commands except `hash`
//! validate the directory manifest before doing anything; `--force` skips
//! the gate.

pub mod apply;
pub mod diff;
pub mod hash;
pub mod lint;
pub mod new;
pub mod validate;

use std::sync::Arc;

use drift_core::{Config, DriftError, DriftResult};
use drift_db::driver::{registry, Driver};
use drift_migrate::dir::LocalDir;
use drift_migrate::format::{formatter_for, Formatter};
use drift_migrate::sum::validate as validate_dir;

use crate::command::CommandRegistry;

/// Registers every built-in migrate command.
pub fn register_builtin_commands(registry: &mut CommandRegistry) {
    registry.register(Box::new(new::NewCommand));
    registry.register(Box::new(diff::DiffCommand));
    registry.register(Box::new(apply::ApplyCommand));
    registry.register(Box::new(validate::ValidateCommand));
    registry.register(Box::new(hash::HashCommand));
    registry.register(Box::new(lint::LintCommand));
}

// ── Shared arguments ─────────────────────────────────────────────────

pub(crate) fn dir_arg() -> clap::Arg {
    clap::Arg::new("dir")
        .long("dir")
        .help("Migration directory URL (file://<path>)")
}

pub(crate) fn force_arg() -> clap::Arg {
    clap::Arg::new("force")
        .long("force")
        .action(clap::ArgAction::SetTrue)
        .help("Skip the integrity manifest check")
}

pub(crate) fn format_arg() -> clap::Arg {
    clap::Arg::new("format")
        .long("format")
        .default_value("atlas")
        .help("Migration file format (atlas, golang-migrate, goose, flyway, liquibase, dbmate)")
}

// ── Shared helpers ───────────────────────────────────────────────────

/// Opens the migration directory from the `--dir` flag or the config.
pub(crate) fn open_dir(matches: &clap::ArgMatches, config: &Config) -> DriftResult<Arc<LocalDir>> {
    let url = matches
        .get_one::<String>("dir")
        .map_or(config.dir_url.as_str(), String::as_str);
    Ok(Arc::new(LocalDir::open(url)?))
}

/// Runs the manifest gate unless `--force` was given.
pub(crate) fn ensure_clean(dir: &LocalDir, matches: &clap::ArgMatches) -> DriftResult<()> {
    if matches.get_flag("force") {
        return Ok(());
    }
    validate_dir(dir)
}

/// Resolves the `--format` flag to a formatter.
pub(crate) fn formatter_from(matches: &clap::ArgMatches) -> DriftResult<Arc<dyn Formatter>> {
    let name = matches
        .get_one::<String>("format")
        .map_or("atlas", String::as_str);
    formatter_for(name)
}

/// Opens a driver from a flag value, falling back to a config value.
pub(crate) fn open_driver(
    matches: &clap::ArgMatches,
    flag: &str,
    fallback: &str,
) -> DriftResult<Arc<dyn Driver>> {
    let url = matches
        .get_one::<String>(flag)
        .map_or(fallback, String::as_str);
    if url.is_empty() {
        return Err(DriftError::Config(format!("--{flag} is required")));
    }
    registry::open(url)
}
