//! Command-line interface for skyradar.
//!
//! This module provides the CLI structure for the `skyradar` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, FlightsCommand, RoleArg, ServeCommand, StatusCommand, UsersCommand,
};

/// skyradar - Live aircraft positions for radar viewers
///
/// Accepts position reports from flight simulator clients, streams the live
/// picture to connected viewers, and archives finished flights.
#[derive(Debug, Parser)]
#[command(name = "skyradar")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the radar service
    Serve(ServeCommand),

    /// Inspect or prune archived flights
    #[command(subcommand)]
    Flights(FlightsCommand),

    /// Manage entitlement roles
    #[command(subcommand)]
    Users(UsersCommand),

    /// Show archive status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
