//! The `migrate lint` command.
//!
//! Replays new migration files on the dev database and runs the analyzer
//! chain over the reconstructed changes. Exits with code 2 when any
//! diagnostic is reported.

use std::sync::Arc;

use async_trait::async_trait;
use drift_core::{Config, DriftError, DriftResult};
use drift_lint::{DataDepend, Destructive, GitChangeDetector, LatestChanges, Runner, TextWriter};

use crate::command::ManagementCommand;
use crate::commands::{dir_arg, ensure_clean, force_arg, open_dir, open_driver};

/// Analyzes new migration files for unsafe changes.
pub struct LintCommand;

#[async_trait]
impl ManagementCommand for LintCommand {
    fn name(&self) -> &str {
        "lint"
    }

    fn help(&self) -> &str {
        "Analyze new migration files for destructive and data-dependent changes"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("dev-url")
                .long("dev-url")
                .help("URL of the disposable dev database"),
        )
        .arg(
            clap::Arg::new("latest")
                .long("latest")
                .value_parser(clap::value_parser!(usize))
                .help("Treat the last N files as new"),
        )
        .arg(
            clap::Arg::new("git-base")
                .long("git-base")
                .help("Treat files added relative to this branch as new"),
        )
        .arg(
            clap::Arg::new("git-dir")
                .long("git-dir")
                .default_value(".")
                .help("Working directory for git"),
        )
        .arg(dir_arg())
        .arg(force_arg())
    }

    async fn handle(&self, matches: &clap::ArgMatches, config: &Config) -> DriftResult<()> {
        let dir = open_dir(matches, config)?;
        ensure_clean(&dir, matches)?;
        let dev = open_driver(matches, "dev-url", &config.dev_url)?;

        let latest = matches.get_one::<usize>("latest").copied();
        let git_base = matches.get_one::<String>("git-base");
        let detector: Box<dyn drift_lint::ChangeDetector> = match (latest, git_base) {
            (None, None) => {
                return Err(DriftError::Config(
                    "--latest or --git-base is required".into(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(DriftError::Config(
                    "--latest and --git-base are mutually exclusive".into(),
                ));
            }
            (Some(n), None) => Box::new(LatestChanges::new(dir.clone(), n)),
            (None, Some(base)) => {
                let work_dir = matches
                    .get_one::<String>("git-dir")
                    .expect("has default")
                    .clone();
                Box::new(GitChangeDetector::new(
                    dir.clone(),
                    work_dir,
                    base.clone(),
                    dir.path().to_path_buf(),
                ))
            }
        };

        let runner = Runner {
            dev,
            dir,
            detector,
            analyzers: vec![Box::new(DataDepend), Box::new(Destructive)],
            reporter: Arc::new(TextWriter::new(std::io::stdout())),
        };
        let diagnostics = runner.run().await?;
        if diagnostics > 0 {
            return Err(DriftError::Diagnostics(diagnostics));
        }
        Ok(())
    }
}
