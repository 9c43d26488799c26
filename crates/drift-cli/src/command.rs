//! Management command framework.
//!
//! This module provides the [`ManagementCommand`] trait for defining CLI
//! commands and [`CommandRegistry`] for registering and dispatching them.
//!
//! ## Defining a Custom Command
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use drift_cli::command::ManagementCommand;
//! use drift_core::{Config, DriftResult};
//!
//! struct StatusCommand;
//!
//! #[async_trait]
//! impl ManagementCommand for StatusCommand {
//!     fn name(&self) -> &str { "status" }
//!     fn help(&self) -> &str { "Show migration status" }
//!
//!     async fn handle(
//!         &self,
//!         _matches: &clap::ArgMatches,
//!         _config: &Config,
//!     ) -> DriftResult<()> {
//!         println!("up to date");
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use drift_core::{Config, DriftError, DriftResult};

/// A management command that can be registered and invoked through the CLI.
///
/// Implementations define a name, help text, optional arguments, and an
/// async handler. All commands must be `Send + Sync`.
#[async_trait]
pub trait ManagementCommand: Send + Sync {
    /// Returns the name of this command (used to invoke it from the CLI).
    fn name(&self) -> &str;

    /// Returns a short help description for this command.
    fn help(&self) -> &str;

    /// Adds custom arguments to the clap command.
    ///
    /// The default implementation returns the command unchanged.
    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    /// Executes the command with the given argument matches and config.
    async fn handle(&self, matches: &clap::ArgMatches, config: &Config) -> DriftResult<()>;
}

/// A registry of management commands.
///
/// Commands are registered by name and can be looked up, listed, or
/// executed. This is the central dispatcher for the drift CLI.
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn ManagementCommand>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registers a command under its own name.
    pub fn register(&mut self, command: Box<dyn ManagementCommand>) {
        self.commands.insert(command.name().to_string(), command);
    }

    /// Looks up a command by name.
    pub fn get(&self, name: &str) -> Option<&dyn ManagementCommand> {
        self.commands.get(name).map(AsRef::as_ref)
    }

    /// Returns the registered command names, sorted.
    pub fn list_commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Builds the clap subcommands for every registered command.
    pub fn build_subcommands(&self) -> Vec<clap::Command> {
        let mut names = self.list_commands();
        names.sort_unstable();
        names
            .into_iter()
            .map(|name| {
                let command = &self.commands[name];
                command.add_arguments(
                    clap::Command::new(command.name().to_string())
                        .about(command.help().to_string()),
                )
            })
            .collect()
    }

    /// Dispatches to the named command.
    pub async fn run(
        &self,
        name: &str,
        matches: &clap::ArgMatches,
        config: &Config,
    ) -> DriftResult<()> {
        let command = self
            .get(name)
            .ok_or_else(|| DriftError::Config(format!("unknown command {name:?}")))?;
        command.handle(matches, config).await
    }
}
