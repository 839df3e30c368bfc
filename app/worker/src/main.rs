//! Entry point of the `tally-worker` binary.
//!
//! The worker is driven entirely over stdio by the pool: stdin carries
//! requests, stdout carries replies, and logs go to stderr so the message
//! channel stays clean.

use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tally-worker")]
#[command(about = "Aggregation worker process, driven over stdio by the query pool")]
#[command(version)]
struct Cli {
    /// Tracing filter directive (falls back to RUST_LOG, then "info").
    #[arg(long)]
    log_filter: Option<String>,
}

fn init_tracing(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref());

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    match tally_worker::run(stdin, stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Worker terminated");
            ExitCode::FAILURE
        }
    }
}
