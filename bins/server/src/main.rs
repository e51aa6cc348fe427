mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands, LogFormat};

mod cmd;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.as_str().into());
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }

    let result = match cli.command {
        Some(Commands::Run(args)) => cmd::run::run(args).await,
        Some(Commands::Check(args)) => cmd::check::run(args),
        None => cmd::run::run(cli.run).await,
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "mqtt2db-server failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
