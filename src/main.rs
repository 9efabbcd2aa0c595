mod app;

use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = app::Cli::parse();
    match app::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            app::render_failure("metalens", &format!("{error:#}"));
            ExitCode::FAILURE
        }
    }
}
