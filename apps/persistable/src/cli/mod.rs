//! # Persistable CLI Module
//!
//! This module implements the CLI interface for persistable.
//!
//! ## Available Commands
//!
//! - `dictionary` - Print the type dictionary of a schema
//! - `encode` - Encode a JSON value into a binary file
//! - `decode` - Dump a binary file as JSON (no schema needed)
//! - `export-mat` - Export a JSON value as a MAT-file
//! - `generate` - Generate MATLAB reader/writer functions
//! - `digest` - Compute BLAKE3 digest of a file

mod commands;

use clap::{Parser, Subcommand};
use persistable_core::PersistError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Persistable - schema-driven object-graph serializer
///
/// Encodes object graphs described by a TOML schema into a compact,
/// self-describing binary file and generates MATLAB code that reads and
/// writes the same layout.
#[derive(Parser, Debug)]
#[command(name = "persistable")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

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
    /// Print the type dictionary derived from a schema
    Dictionary {
        /// Path to the schema file (TOML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Top-level type (defaults to the schema's `root`)
        #[arg(short, long)]
        root: Option<String>,
    },

    /// Encode a JSON value into a binary file
    Encode {
        /// Path to the schema file (TOML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Path to the value file (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Top-level type (defaults to the schema's `root`)
        #[arg(short, long)]
        root: Option<String>,
    },

    /// Decode a binary file and print it as JSON
    Decode {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Export a JSON value as a Level 5 MAT-file
    ExportMat {
        /// Path to the schema file (TOML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Path to the value file (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Top-level type (defaults to the schema's `root`)
        #[arg(short, long)]
        root: Option<String>,

        /// MATLAB variable name of the exported struct
        #[arg(long, default_value = "s")]
        var: String,
    },

    /// Generate MATLAB read_/write_/load_/save_ functions
    Generate {
        /// Path to the schema file (TOML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Output directory (created if missing)
        #[arg(short, long)]
        output: PathBuf,

        /// Top-level type (defaults to the schema's `root`)
        #[arg(short, long)]
        root: Option<String>,
    },

    /// Compute BLAKE3 digest of a file
    Digest {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Expected digest; exit with an error on mismatch
        #[arg(short, long)]
        expect: Option<String>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), PersistError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Dictionary { schema, root } => cmd_dictionary(&schema, root.as_deref(), json_mode),
        Commands::Encode {
            schema,
            input,
            output,
            root,
        } => cmd_encode(&schema, &input, &output, root.as_deref()),
        Commands::Decode { input } => cmd_decode(&input),
        Commands::ExportMat {
            schema,
            input,
            output,
            root,
            var,
        } => cmd_export_mat(&schema, &input, &output, root.as_deref(), &var),
        Commands::Generate { schema, output, root } => cmd_generate(&schema, &output, root.as_deref(), json_mode),
        Commands::Digest { input, expect } => cmd_digest(&input, expect.as_deref(), json_mode),
    }
}
