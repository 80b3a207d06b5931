use autotidy::cli::{Cli, run_command};
use autotidy::config::Settings;
use autotidy::output::OutputFormatter;
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    autotidy::init_tracing(cli.verbose);

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            OutputFormatter::error(&format!("Error loading configuration: {}", e));
            return ExitCode::FAILURE;
        }
    };

    match run_command(cli.command, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&format!("Error: {}", e));
            ExitCode::FAILURE
        }
    }
}
