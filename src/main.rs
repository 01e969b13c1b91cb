//! Main entry point for the zipdir CLI app

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use zipped_directory::cli;
use zipped_directory::cli_runner::run_cli_app;

fn main() -> ExitCode {
    let args = cli::run();
    init_logging(args.verbose);

    if let Err(e) = run_cli_app(&args) {
        eprintln!("Error: {}", e);
        return ExitCode::from(e.exit_code());
    }
    ExitCode::SUCCESS
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
