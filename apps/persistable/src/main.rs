//! # Persistable
//!
//! The main binary for the persistable object-graph serializer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        apps/persistable (THE BINARY)         │
//! │                                              │
//! │   ┌──────────────┐    schema.toml            │
//! │   │     CLI      │    value.json / .bin      │
//! │   │    (clap)    │                           │
//! │   └──────┬───────┘                           │
//! │          ▼                                   │
//! │   ┌──────────────────────────────────────┐   │
//! │   │           persistable-core           │   │
//! │   │   stream  │  container  │  codegen   │   │
//! │   └──────────────────────────────────────┘   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! persistable dictionary -s path.toml
//! persistable encode -s path.toml -i path.json -o path.bin
//! persistable decode -i path.bin
//! persistable export-mat -s path.toml -i path.json -o path.mat
//! persistable generate -s path.toml -o matlab/
//! persistable digest -i path.bin
//! ```

use clap::Parser;
use persistable::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // PERSISTABLE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("PERSISTABLE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    let default_filter = if cli.verbose {
        "persistable=debug,persistable_core=debug"
    } else {
        "persistable=warn,persistable_core=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    // Logs go to stderr so command output on stdout stays parseable.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    // Execute command
    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
