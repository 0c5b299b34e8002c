//! Lineage CLI
//!
//! Pipeline-stage entry point for run tracking and the model registry.
//!
//! # Usage
//!
//! ```bash
//! # Start a run; the id goes to stdout (and GITHUB_OUTPUT inside CI)
//! lineage start data-pipeline --tag step=preprocessing
//!
//! # Register a finished run's model and alias it as champion
//! LINEAGE_TRACKING_URI=file:./lineage-store lineage register <run_id>
//!
//! # Move an alias to the latest version
//! lineage promote pulsar-classifier-prod production
//! ```
//!
//! Diagnostics go to stderr, filtered by `RUST_LOG` (default `info`), so
//! stdout only carries values for the next stage.

use clap::Parser;
use lineage_db::cli::{run_command, Cli};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init only happens if a host already installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
