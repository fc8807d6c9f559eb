use anyhow::Result;
use clap::Parser;
use gira_types::Command;
use tracing_subscriber::EnvFilter;

use gira_cli::cli::{Cli, Commands};
use gira_cli::commands::{
    WatchArgs, cmd_config, cmd_control, cmd_decode, cmd_encode, cmd_scan, cmd_watch,
};
use gira_cli::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::path);
    let config = if matches!(cli.command, Commands::Config { .. }) {
        // config subcommands must still work on a broken file
        Config::load_or_default(&config_path).unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Config::default()
        })
    } else {
        Config::load_validated(&config_path)?
    };
    tracing::debug!("Using config {}", config_path.display());

    let quiet = cli.quiet;
    match cli.command {
        Commands::Open { device } => cmd_control(Command::MoveUp, &device, &config, quiet).await,
        Commands::Close { device } => {
            cmd_control(Command::MoveDown, &device, &config, quiet).await
        }
        Commands::Stop { device } => cmd_control(Command::Stop, &device, &config, quiet).await,
        Commands::StepUp { device } => cmd_control(Command::StepUp, &device, &config, quiet).await,
        Commands::StepDown { device } => {
            cmd_control(Command::StepDown, &device, &config, quiet).await
        }
        Commands::Position { device, percent } => {
            cmd_control(Command::SetPosition(percent), &device, &config, quiet).await
        }
        Commands::Watch {
            device,
            format,
            count,
            changes_only,
        } => {
            cmd_watch(WatchArgs {
                device,
                format,
                count,
                changes_only,
                quiet,
                config: &config,
            })
            .await
        }
        Commands::Scan { timeout, format } => cmd_scan(timeout, format, quiet).await,
        Commands::Encode { command } => cmd_encode(&command),
        Commands::Decode { hex } => cmd_decode(&hex),
        Commands::Config { action } => cmd_config(action, &config_path, &config),
    }
}
