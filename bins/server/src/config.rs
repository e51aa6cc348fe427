use clap::{Args, Parser, Subcommand, ValueEnum};

use mqtt2db_config_yaml::YamlParser;
use mqtt2db_engine::{Mqtt2DbConfig, TomlParser};

use crate::error::ServerError;

#[derive(Parser)]
#[command(
    name = "mqtt2db-server",
    about = "Store MQTT readings in MySQL, one row per reading",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Arguments for the default `run` command.
    #[command(flatten)]
    pub run: RunArgs,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to brokers and databases and ingest until Ctrl+C (default)
    Run(RunArgs),
    /// Validate the configuration and print the resolved plan as JSON
    Check(CheckArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Path to the config file (.yaml, .yml or .toml)
    #[arg(long, default_value = "config.yaml", env = "MQTT2DB_CONFIG")]
    pub config: String,

    /// Write into in-memory tables instead of MySQL
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Clone, Debug)]
pub struct CheckArgs {
    #[arg(long, default_value = "config.yaml", env = "MQTT2DB_CONFIG")]
    pub config: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Load a config file, picking the format from its extension.
pub fn load(path: &str) -> Result<Mqtt2DbConfig, ServerError> {
    Ok(Mqtt2DbConfig::load(path, &[&YamlParser, &TomlParser])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_is_the_default_command() {
        let cli = Cli::try_parse_from(["mqtt2db-server", "--config", "site.yaml", "--dry-run"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.config, "site.yaml");
        assert!(cli.run.dry_run);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn check_subcommand() {
        let cli = Cli::try_parse_from(["mqtt2db-server", "check", "--config", "site.toml", "--log-format", "json"])
            .unwrap();
        match cli.command {
            Some(Commands::Check(args)) => assert_eq!(args.config, "site.toml"),
            _ => panic!("expected check"),
        }
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn load_yaml_and_toml() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("config.yaml");
        std::fs::write(&yaml, "brokers:\n  - brokername: home\n    host: localhost\n").unwrap();
        assert_eq!(load(yaml.to_str().unwrap()).unwrap().brokers.len(), 1);

        let toml = dir.path().join("config.toml");
        std::fs::write(&toml, "[[brokers]]\nbrokername = \"home\"\nhost = \"localhost\"\n").unwrap();
        assert_eq!(load(toml.to_str().unwrap()).unwrap().brokers.len(), 1);

        assert!(load(dir.path().join("config.ini").to_str().unwrap()).is_err());
    }
}
