//! # drift-cli
//!
//! Management commands for the drift migration engine.
//!
//! This crate provides:
//!
//! - **Command framework** - The [`ManagementCommand`] trait and
//!   [`CommandRegistry`] dispatcher.
//! - **Migrate commands** - `new`, `diff`, `apply`, `validate`, `hash`,
//!   and `lint`, wired to the engine crates.
//! - **Output** - The TTY renderer for executor progress events.
//!
//! Database URLs are resolved through the driver registry in `drift-db`;
//! dialect drivers register themselves at startup.

#![allow(clippy::result_large_err)]
#![allow(clippy::module_name_repetitions)]

pub mod command;
pub mod commands;
pub mod output;

pub use command::{CommandRegistry, ManagementCommand};
pub use output::LogTty;
