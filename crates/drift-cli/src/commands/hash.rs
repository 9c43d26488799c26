//! The `migrate hash` command.
//!
//! Recomputes the integrity manifest and writes it back. This is the one
//! command that never runs the manifest gate; it is the way out of a
//! checksum mismatch after a deliberate edit.

use async_trait::async_trait;
use drift_core::{Config, DriftResult};
use drift_migrate::dir::Dir;

use crate::command::ManagementCommand;
use crate::commands::{dir_arg, force_arg, open_dir};

/// Rewrites the integrity manifest.
pub struct HashCommand;

#[async_trait]
impl ManagementCommand for HashCommand {
    fn name(&self) -> &str {
        "hash"
    }

    fn help(&self) -> &str {
        "Recompute and store the directory integrity manifest"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(dir_arg()).arg(force_arg())
    }

    async fn handle(&self, matches: &clap::ArgMatches, config: &Config) -> DriftResult<()> {
        let dir = open_dir(matches, config)?;
        let sum = dir.checksum()?;
        dir.write_sum(&sum)
    }
}
