use std::process::ExitCode;

use clap::Parser as _;
use dotenvy::dotenv;
use idxr::catalog::{register_indexes, register_migrations};
use idxr::cli::output::Printer;
use idxr::cli::{normalize_args, run_with, Cli};
use idxr::utils::logging::init_logging;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    if let Err(e) = init_logging() {
        // Logging is best effort; the action still runs without it.
        #[allow(clippy::print_stderr)]
        eprintln!("Failed to initialize logging: {e}");
    }

    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    info!(action = %cli.action, "Starting idxr");

    match run_with(cli.clone(), register_indexes, register_migrations).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, error_chain = ?e, "idxr failed");
            if let Err(output_err) = Printer::new(&mut std::io::stdout(), cli.json).error(&e) {
                error!(error = %output_err, "Failed to write error output");
            }
            ExitCode::FAILURE
        }
    }
}
