//! Command-line argument parsing for invoice-validator
//!
//! clap-based CLI with subcommands and verbosity control.

use crate::cli::config::Backend;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Validate invoices for GST/TDS compliance and arithmetic accuracy
#[derive(Parser, Debug)]
#[command(name = "invoice-validator")]
#[command(version)]
#[command(about = "Stream compliance checks for invoices through a staged pipeline", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (final report only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline on an invoice file
    Validate {
        /// Invoice file (pdf, png, jpg, jpeg, json, csv)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Executor backend
        #[arg(long, value_parser = parse_backend)]
        backend: Option<Backend>,

        /// Ollama model
        #[arg(short, long)]
        model: Option<String>,

        /// Parse confidence needed to run validation (0-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,

        /// Directory for written reports
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Run only the compliance rule engine on a parsed invoice JSON file
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Display current configuration, or write a default file with --init
    Config {
        /// Write the default configuration to the config path
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file when used with --init
        #[arg(long, requires = "init")]
        force: bool,
    },

    /// Check Ollama reachability and list models
    Doctor,
}

fn parse_backend(s: &str) -> Result<Backend, String> {
    s.parse::<Backend>().map_err(|e| e.to_string())
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Verbosity level from flags; `-q` wins over `-v`
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

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Progress bar shown
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Every log line echoed, not just stage transitions
    pub fn show_events(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
