// Keygate — Application Entry Point
//
// Parses CLI arguments, initializes structured logging (with a filter that
// never emits slot payload values), and dispatches to the command handler.
// All provider calls are synchronous; the session's dispatch thread owns
// the only async reactor in the process.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use keygate::cli::{execute, Cli};

fn main() {
    // Initialize tracing with env filter (RUST_LOG=keygate=debug for verbose
    // output). The default level is `info`, which never includes payloads.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keygate=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
