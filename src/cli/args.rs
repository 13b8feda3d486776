//! Command-line argument parsing for sessionsight
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sessionsight - Analytics over recorded dual-agent sessions
#[derive(Parser, Debug)]
#[command(name = "sessionsight")]
#[command(version)]
#[command(about = "Insights, anomalies, forecasts and recommendations for agent sessions", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run a full analysis over every stored session
    Analyze {
        /// Session document directory (~/.sessionsight/sessions by default)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Print the analysis snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze one stored session against the corpus
    Session {
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Session identifier
        #[arg(value_name = "ID")]
        id: String,

        /// Skip per-session recommendations
        #[arg(long)]
        no_recommendations: bool,

        #[arg(long)]
        json: bool,
    },

    /// Forecast resource usage and hourly load
    Forecast {
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Forecast horizon in days (config value by default)
        #[arg(long)]
        days: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Show effective configuration
    Config,
}

impl Commands {
    pub fn data_dir(&self) -> Option<&PathBuf> {
        match self {
            Commands::Analyze { data, .. }
            | Commands::Session { data, .. }
            | Commands::Forecast { data, .. } => data.as_ref(),
            Commands::Config => None,
        }
    }

    pub fn json(&self) -> bool {
        match self {
            Commands::Analyze { json, .. }
            | Commands::Session { json, .. }
            | Commands::Forecast { json, .. } => *json,
            Commands::Config => false,
        }
    }
}

impl Args {
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Verbosity {
    /// Level handed to the tracing subscriber
    pub fn level(&self) -> u8 {
        match self {
            Verbosity::Quiet | Verbosity::Normal => 0,
            Verbosity::Verbose => 1,
            Verbosity::VeryVerbose => 2,
        }
    }

    /// Whether human-readable sections are printed
    pub fn show_output(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Whether per-item details are printed
    pub fn show_details(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
