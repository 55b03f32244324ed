//! Ollabot CLI
//!
//! Command-line interface for the Telegram relay to a local Ollama server

mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ollabot_config::{env_file, Config};
use ollabot_core::{BotRuntime, ModelRegistry, ModelSource, ThinkingPolicy};
use ollabot_providers::{Backend, OllamaProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "ollabot")]
#[command(about = "Telegram relay bot for a local Ollama server", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Dotenv file read for keys missing from the environment
    #[arg(short, long, default_value = ".env")]
    env_file: String,

    /// Log level (falls back to core.log_level, then info)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot in the foreground
    Start,

    /// List models installed on the backend
    Models,

    /// Validate configuration and probe the backend
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let config = load_config(cli.config.as_deref(), &cli.env_file)?;
            let data_dir = config.data_dir();
            std::fs::create_dir_all(&data_dir)
                .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

            let log_level = effective_log_level(cli.log_level.as_deref(), &config);
            let _logging_guard = logging::init_logging(&data_dir.join("logs"), &log_level)?;

            let runtime = BotRuntime::new(config)?;
            info!("Starting Ollabot runtime in foreground...");
            tokio::select! {
                result = runtime.run() => result?,
                _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
            }
        }

        Commands::Models => {
            let config = load_config(cli.config.as_deref(), &cli.env_file)?;
            let backend = build_backend(&config)?;
            let registry = ModelRegistry::new(
                ModelSource::Catalog,
                config.models.vision_families.clone(),
                Arc::clone(&backend),
            );
            let thinking =
                ThinkingPolicy::from_config(config.models.thinking_allow_list.as_deref());

            let models = registry
                .list_models()
                .await
                .with_context(|| format!("Failed to list models on {}", config.backend.host))?;
            if models.is_empty() {
                println!("No models installed on {}", config.backend.host);
                return Ok(());
            }
            for model in models {
                let mut tags = Vec::new();
                if registry.supports_vision(&model) {
                    tags.push("vision");
                }
                if config.models.thinking_allow_list.is_some() && thinking.applies_to(&model) {
                    tags.push("thinking");
                }
                if tags.is_empty() {
                    println!("{}", model);
                } else {
                    println!("{}  [{}]", model, tags.join(", "));
                }
            }
        }

        Commands::Check => {
            let config = load_config(cli.config.as_deref(), &cli.env_file)
                .context("Configuration is invalid")?;
            println!("Configuration is valid.");
            println!("  language:     {}", config.telegram.language);
            println!("  backend:      {}", config.backend.host);
            println!("  model source: {:?}", config.models.source);

            let backend = build_backend(&config)?;
            match backend.health_check().await {
                Ok(true) => println!("Backend is reachable."),
                Ok(false) => println!("Backend is NOT reachable."),
                Err(e) => println!("Backend check failed: {}", e),
            }

            let log_dir = config.data_dir().join("logs");
            if log_dir.exists() {
                let size = logging::total_log_size(&log_dir).unwrap_or(0);
                println!(
                    "Logs: {} ({})",
                    log_dir.display(),
                    logging::format_size(size)
                );
            }
        }
    }

    Ok(())
}

fn load_config(config_path: Option<&str>, env_file_path: &str) -> Result<Config> {
    let dotenv = env_file::load_dotenv(Path::new(env_file_path))?;
    let file = match config_path {
        Some(path) => Some(PathBuf::from(path)),
        None => Config::default_path().filter(|path| path.exists()),
    };
    Config::resolve(file.as_deref(), env_file::layered_lookup(dotenv))
}

fn effective_log_level(cli_level: Option<&str>, config: &Config) -> String {
    cli_level
        .or(config.core.log_level.as_deref())
        .unwrap_or("info")
        .to_string()
}

fn build_backend(config: &Config) -> Result<Arc<dyn Backend>> {
    let timeout = config.backend.request_timeout_secs.map(Duration::from_secs);
    let provider = OllamaProvider::new(&config.backend.host, timeout)
        .context("Failed to create backend client")?;
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_wins_over_config() {
        let mut config = Config::default();
        config.core.log_level = Some("debug".to_string());
        assert_eq!(effective_log_level(Some("warn"), &config), "warn");
        assert_eq!(effective_log_level(None, &config), "debug");
        config.core.log_level = None;
        assert_eq!(effective_log_level(None, &config), "info");
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "ollabot",
            "--env-file",
            "bot.env",
            "--log-level",
            "debug",
            "check",
        ])
        .unwrap();
        assert_eq!(cli.env_file, "bot.env");
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Check));
    }
}
