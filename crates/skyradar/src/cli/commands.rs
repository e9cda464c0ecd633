//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::flight::Role;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to listen on, overriding `server.bind_addr`
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<String>,
}

/// Archived flight commands.
#[derive(Debug, Subcommand)]
pub enum FlightsCommand {
    /// List archived flights, newest first
    List {
        /// Only flights flown under this callsign
        #[arg(long)]
        callsign: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Delete flights older than `history.max_age_days`
    Prune,
}

/// Entitlement commands.
#[derive(Debug, Subcommand)]
pub enum UsersCommand {
    /// Set the role of an external identity
    SetRole {
        /// External identity, as sent in the `reporter` field
        identity: String,

        /// Role to assign
        #[arg(value_enum)]
        role: RoleArg,
    },

    /// Show the role of an external identity
    Show {
        /// External identity
        identity: String,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Role argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// No history
    Guest,
    /// Registered, no history
    Member,
    /// Flights are archived
    Premium,
    /// Flights are archived
    Admin,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Guest => Self::Guest,
            RoleArg::Member => Self::Member,
            RoleArg::Premium => Self::Premium,
            RoleArg::Admin => Self::Admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_arg_conversion() {
        assert_eq!(Role::from(RoleArg::Guest), Role::Guest);
        assert_eq!(Role::from(RoleArg::Member), Role::Member);
        assert_eq!(Role::from(RoleArg::Premium), Role::Premium);
        assert_eq!(Role::from(RoleArg::Admin), Role::Admin);
    }

    #[test]
    fn test_role_arg_value_names() {
        let names: Vec<String> = RoleArg::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["guest", "member", "premium", "admin"]);
    }

    #[test]
    fn test_flights_list_debug() {
        let cmd = FlightsCommand::List {
            callsign: Some("DAL1".to_string()),
            limit: 5,
            json: false,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("List"));
        assert!(debug_str.contains("DAL1"));
    }
}
