//! The `migrate new` command.
//!
//! Creates an empty migration file in the chosen format and refreshes the
//! integrity manifest.

use async_trait::async_trait;
use drift_core::{Config, DriftResult};
use drift_db::plan::Plan;
use drift_migrate::dir::Dir;

use crate::command::ManagementCommand;
use crate::commands::{dir_arg, ensure_clean, force_arg, format_arg, formatter_from, open_dir};

/// Creates an empty migration file.
pub struct NewCommand;

#[async_trait]
impl ManagementCommand for NewCommand {
    fn name(&self) -> &str {
        "new"
    }

    fn help(&self) -> &str {
        "Create an empty migration file"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(clap::Arg::new("name").help("Migration name").required(false))
            .arg(dir_arg())
            .arg(force_arg())
            .arg(format_arg())
    }

    async fn handle(&self, matches: &clap::ArgMatches, config: &Config) -> DriftResult<()> {
        let dir = open_dir(matches, config)?;
        ensure_clean(&dir, matches)?;
        let formatter = formatter_from(matches)?;
        let name = matches
            .get_one::<String>("name")
            .map_or("", String::as_str);

        let plan = Plan::new(name);
        for file in formatter.format(&plan)? {
            dir.write(&file.name, &file.bytes)?;
            tracing::info!("created {}", file.name);
        }
        let sum = dir.checksum()?;
        dir.write_sum(&sum)
    }
}
