//! Command-line front end for the mediadl download engine.
//!
//! `bootstrap` is the composition root: it wires the `SQLite` index, the
//! HTTP fetcher and a console signal sink into an `OrchestratorContext`.
//! Handlers only talk to that context.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Silence unused dev-dependency warnings
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tokio_test as _;

// Used by the main.rs binary
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;
pub mod signals;

pub use bootstrap::{CliConfig, CliContext, bootstrap};
pub use commands::Commands;
pub use error::CliError;
pub use parser::Cli;
pub use signals::ConsoleSignalSink;
