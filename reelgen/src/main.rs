use std::process::ExitCode;

use color_eyre::Result;
use log::{error, info};

mod cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let config = match cli::Cli::from_args(std::env::args_os()) {
        Ok(cli) => cli.config,
        Err(code) => return Ok(code),
    };
    if std::env::var_os("GITHUB_ACTIONS").is_some() {
        info!("Running in GitHub Actions");
    }

    match reel_engine::run(&config).await {
        Ok(report) => {
            info!(
                "Generation succeeded: {}",
                report.local_filename.as_deref().unwrap_or("-")
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Generation failed: {e:?}");
            Ok(ExitCode::FAILURE)
        }
    }
}
