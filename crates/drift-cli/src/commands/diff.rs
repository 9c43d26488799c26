//! The `migrate diff` command.
//!
//! Replays the directory on the dev database, diffs the result against the
//! desired state, and writes the plan as a new migration file.

use async_trait::async_trait;
use drift_core::{Config, DriftError, DriftResult};
use drift_db::state::ConnReader;

use crate::command::ManagementCommand;
use crate::commands::{
    dir_arg, ensure_clean, force_arg, format_arg, formatter_from, open_dir, open_driver,
};

/// Plans a new migration from the desired state.
pub struct DiffCommand;

#[async_trait]
impl ManagementCommand for DiffCommand {
    fn name(&self) -> &str {
        "diff"
    }

    fn help(&self) -> &str {
        "Compute the diff between the migration directory and a desired state"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(clap::Arg::new("name").help("Migration name").required(false))
            .arg(
                clap::Arg::new("dev-url")
                    .long("dev-url")
                    .help("URL of the disposable dev database"),
            )
            .arg(
                clap::Arg::new("to")
                    .long("to")
                    .required(true)
                    .help("URL of the desired state"),
            )
            .arg(
                clap::Arg::new("schema")
                    .long("schema")
                    .action(clap::ArgAction::Append)
                    .help("Restrict the desired state to these schemas"),
            )
            .arg(dir_arg())
            .arg(force_arg())
            .arg(format_arg())
    }

    async fn handle(&self, matches: &clap::ArgMatches, config: &Config) -> DriftResult<()> {
        let dir = open_dir(matches, config)?;
        ensure_clean(&dir, matches)?;
        let dev = open_driver(matches, "dev-url", &config.dev_url)?;
        let formatter = formatter_from(matches)?;
        let name = matches
            .get_one::<String>("name")
            .map_or("", String::as_str);

        let to = matches.get_one::<String>("to").expect("required flag");
        if to.starts_with("file://") {
            // Declarative file states are decoded by an external schema
            // reader; only database-backed desired states are built in.
            return Err(DriftError::Config(
                "file:// desired states require a schema decoder, pass a database URL".into(),
            ));
        }
        let schemas: Vec<String> = matches
            .get_many::<String>("schema")
            .map(|v| v.cloned().collect())
            .unwrap_or_default();
        let desired = ConnReader::new(drift_db::driver::registry::open(to)?, schemas);

        let planner =
            drift_migrate::planner::Planner::new(dev, dir.clone()).with_formatter(formatter);
        match planner.plan(name, &desired).await {
            Ok(plan) => planner.write_plan(&plan),
            Err(DriftError::NoPlan) => {
                tracing::info!(
                    "The migration directory is synced with the desired state, no changes to be made"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
