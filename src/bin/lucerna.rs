//! Lucerna CLI binary.

use std::process;

use clap::Parser;
use lucerna::cli::{args::LucernaArgs, commands::execute_command};
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    let args = LucernaArgs::parse();

    // RUST_LOG wins over the verbosity flags.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = execute_command(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
