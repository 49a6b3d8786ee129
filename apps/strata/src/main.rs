//! # Strata - Structural Model Exchange
//!
//! The command-line binary for the Strata conversion core.
//!
//! This application works with captured protocol record files:
//!
//! ```bash
//! # Summarise the records in a captured file
//! strata inspect -f model.gwb.txt
//!
//! # Verify the codec round-trips every captured line bit-exactly
//! strata roundtrip -f model.gwb.txt
//!
//! # List application-identifier to index assignments
//! strata ids -f model.gwb.txt
//! ```

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // STRATA_LOG_FORMAT=json switches to machine-parseable log output.
    let log_format = std::env::var("STRATA_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "strata=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
