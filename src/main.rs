use autosort::cli::{Cli, run_cli};
use autosort::logging;
use autosort::output::OutputFormatter;
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match cli.load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            OutputFormatter::error(&format!("Error loading configuration: {e}"));
            return ExitCode::FAILURE;
        }
    };

    // Keep the guard alive so buffered log lines reach the file.
    let _log_guard = match logging::init(cli.verbose, settings.logging.file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            OutputFormatter::error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    match run_cli(&cli, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "autosort failed");
            OutputFormatter::error(&format!("Error: {e:#}"));
            ExitCode::FAILURE
        }
    }
}
