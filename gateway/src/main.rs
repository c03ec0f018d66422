use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod errors;

#[derive(Parser)]
#[command(name = "gateway", about = "HTTP gateway in front of the document bridge")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match config::Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("could not load config from {}: {err}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = api::serve(config).await {
        tracing::error!("gateway exited with error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
