//! The `migrate apply` command.
//!
//! Applies pending migration files to the target database. The whole batch
//! runs inside one transaction; with `--dry-run` the driver and revision
//! store are replaced by no-op decorators and nothing is executed or
//! persisted.

use std::sync::Arc;

use async_trait::async_trait;
use drift_core::{Config, DriftError, DriftResult};
use drift_migrate::executor::{DryRunDriver, DryRunRevisions, Executor};
use drift_migrate::revision::{RevisionStore, TableRevisions};

use crate::command::ManagementCommand;
use crate::commands::{dir_arg, force_arg, open_dir, open_driver};
use crate::output::LogTty;

/// Applies pending migrations.
pub struct ApplyCommand;

#[async_trait]
impl ManagementCommand for ApplyCommand {
    fn name(&self) -> &str {
        "apply"
    }

    fn help(&self) -> &str {
        "Apply pending migration files to the target database"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("n")
                .help("Number of files to apply (all when omitted)")
                .value_parser(clap::value_parser!(usize))
                .required(false),
        )
        .arg(
            clap::Arg::new("url")
                .long("url")
                .help("URL of the target database"),
        )
        .arg(
            clap::Arg::new("dry-run")
                .long("dry-run")
                .action(clap::ArgAction::SetTrue)
                .help("Print what would run without executing or persisting anything"),
        )
        .arg(
            clap::Arg::new("revisions-table")
                .long("revisions-table")
                .help("Name of the revision table"),
        )
        .arg(dir_arg())
        .arg(force_arg())
    }

    async fn handle(&self, matches: &clap::ArgMatches, config: &Config) -> DriftResult<()> {
        let dir = open_dir(matches, config)?;
        let n = matches.get_one::<usize>("n").copied().unwrap_or(0);
        let dry_run = matches.get_flag("dry-run");
        let table = matches
            .get_one::<String>("revisions-table")
            .map_or(config.revisions_table.as_str(), String::as_str);

        let target = open_driver(matches, "url", &config.db_url)?;
        let revisions = TableRevisions::new(target.clone(), table);
        if !dry_run {
            revisions.init().await?;
        }
        let mut store: Arc<dyn RevisionStore> = Arc::new(revisions);
        let mut driver = target.clone();
        if dry_run {
            store = Arc::new(DryRunRevisions(store));
            driver = Arc::new(DryRunDriver(driver));
        }

        let mut executor = Executor::new(driver.clone(), dir, store)
            .with_logger(Arc::new(LogTty::new(std::io::stdout())))
            .with_operator_version(config.operator_version.clone());
        if matches.get_flag("force") {
            executor = executor.skip_validate();
        }

        // One transaction around the whole batch.
        if !dry_run {
            target.exec("BEGIN").await?;
        }
        match executor.execute_n(n).await {
            Ok(()) => {
                if !dry_run {
                    target.exec("COMMIT").await?;
                }
                Ok(())
            }
            Err(DriftError::NoPendingFiles) => {
                if !dry_run {
                    target.exec("ROLLBACK").await?;
                }
                tracing::info!(
                    "The migration directory is synced with the database, no files to execute"
                );
                Ok(())
            }
            Err(e) => {
                if !dry_run {
                    if let Err(rollback) = target.exec("ROLLBACK").await {
                        tracing::warn!("rolling back: {rollback}");
                    }
                }
                Err(e)
            }
        }
    }
}
