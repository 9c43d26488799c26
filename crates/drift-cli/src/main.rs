//! The drift binary.
//!
//! Dispatches `drift migrate <command>` invocations to the command
//! registry. Exit codes: 0 on success (including the friendly no-op
//! outcomes), 1 on user errors, 2 when lint reports diagnostics.

use drift_cli::command::CommandRegistry;
use drift_cli::commands::register_builtin_commands;
use drift_core::{logging, Config, DriftError};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };
    logging::setup_logging(&config);

    let mut registry = CommandRegistry::new();
    register_builtin_commands(&mut registry);

    let cli = clap::Command::new("drift")
        .about("Versioned schema migrations for relational databases")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .subcommand(
            clap::Command::new("migrate")
                .about("Manage versioned migration files")
                .subcommand_required(true)
                .subcommands(registry.build_subcommands()),
        );

    let matches = cli.get_matches();
    let Some(("migrate", migrate_matches)) = matches.subcommand() else {
        unreachable!("subcommand is required");
    };
    let Some((name, sub_matches)) = migrate_matches.subcommand() else {
        unreachable!("subcommand is required");
    };

    if let Err(e) = registry.run(name, sub_matches, &config).await {
        exit_with(&e);
    }
}

fn exit_with(e: &DriftError) -> ! {
    eprintln!("Error: {e}");
    if let Some(hint) = e.hint() {
        eprintln!("  hint: {hint}");
    }
    std::process::exit(e.exit_code());
}
