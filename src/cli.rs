//! Command-line interface definition
//!
//! This module defines the CLI structure using clap's derive API,
//! providing the operator commands for discovery maintenance.

use clap::{Parser, Subcommand};

/// vpnportal - VPN provider portal core
///
/// Maintain the verified discovery cache and inspect the provider lists
/// it contains.
#[derive(Parser, Debug, Clone)]
#[command(name = "vpnportal")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Fetch, verify and persist every configured discovery source
    Update,

    /// Print the provider and organization lists from the persisted
    /// discovery documents
    Providers {
        /// Also print the published host public keys
        #[arg(long)]
        keys: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
