//! The `migrate validate` command.
//!
//! Checks the integrity manifest and, when a dev database is given,
//! replays the whole directory on it to prove every file still executes.

use std::sync::Arc;

use async_trait::async_trait;
use drift_core::{Config, DriftResult};
use drift_migrate::executor::Executor;
use drift_migrate::revision::NopRevisions;
use drift_migrate::sum::validate as validate_dir;

use crate::command::ManagementCommand;
use crate::commands::{dir_arg, open_dir, open_driver};

/// Validates the migration directory.
pub struct ValidateCommand;

#[async_trait]
impl ManagementCommand for ValidateCommand {
    fn name(&self) -> &str {
        "validate"
    }

    fn help(&self) -> &str {
        "Validate the migration directory integrity"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("dev-url")
                .long("dev-url")
                .help("Replay the directory on this dev database as well"),
        )
        .arg(dir_arg())
    }

    async fn handle(&self, matches: &clap::ArgMatches, config: &Config) -> DriftResult<()> {
        let dir = open_dir(matches, config)?;
        validate_dir(dir.as_ref())?;

        let dev_url = matches
            .get_one::<String>("dev-url")
            .map_or(config.dev_url.as_str(), String::as_str);
        if !dev_url.is_empty() {
            let dev = open_driver(matches, "dev-url", &config.dev_url)?;
            Executor::new(dev, dir, Arc::new(NopRevisions))
                .read_state()
                .await?;
        }
        tracing::info!("migration directory is valid");
        Ok(())
    }
}
