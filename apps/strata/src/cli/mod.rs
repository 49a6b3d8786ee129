//! # Strata CLI Module
//!
//! ## Available Commands
//!
//! - `inspect` - Summarise the records in a captured protocol file
//! - `roundtrip` - Verify the codec against captured sample lines
//! - `ids` - List application-identifier assignments

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use strata_core::StrataError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Strata - structural model exchange.
///
/// Converts structural-engineering models to and from the line-oriented
/// command protocol of a third-party analysis engine.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarise the records in a captured protocol file
    Inspect {
        /// Path to the captured record file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Parse and re-format every captured line, reporting mismatches
    Roundtrip {
        /// Path to the captured record file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List resolved application-identifier assignments
    Ids {
        /// Path to the captured record file
        #[arg(short, long)]
        file: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), StrataError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Inspect { file } => cmd_inspect(&file, json_mode),
        Commands::Roundtrip { file } => cmd_roundtrip(&file, json_mode),
        Commands::Ids { file } => cmd_ids(&file, json_mode),
    }
}
