//! Command line surface of `gira`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// How results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Target cover and connection overrides shared by the control commands.
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Cover address (MAC address or UUID), or use GIRA_DEVICE env var
    #[arg(short, long, env = "GIRA_DEVICE")]
    pub device: Option<String>,

    /// Connection timeout in seconds per attempt (overrides config)
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,

    /// Connection attempts before giving up (overrides config)
    #[arg(short, long)]
    pub attempts: Option<u32>,
}

#[derive(Parser)]
#[command(name = "gira")]
#[command(author, version, about = "CLI for Gira System 3000 BLE covers", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors, skip progress messages
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use this configuration file instead of the default
    #[arg(long, global = true, env = "GIRA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Move the cover fully up
    #[command(alias = "up")]
    Open {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Move the cover fully down
    #[command(alias = "down")]
    Close {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Stop a moving cover
    Stop {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Move the cover one step up
    StepUp {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Move the cover one step down
    StepDown {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Move the cover to a position (0 = closed, 100 = open)
    Position {
        #[command(flatten)]
        device: DeviceArgs,

        /// Target position in percent
        #[arg(allow_negative_numbers = true)]
        percent: i32,
    },

    /// Print position broadcasts without connecting
    Watch {
        /// Cover address (MAC address or UUID), or use GIRA_DEVICE env var
        #[arg(short, long, env = "GIRA_DEVICE")]
        device: Option<String>,

        /// Print text lines or one JSON event per line
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Number of positions to print before exiting (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,

        /// Only print a position when it changes
        #[arg(long)]
        changes_only: bool,
    },

    /// Scan for nearby covers
    Scan {
        /// How long to listen, in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Print a table or a JSON array
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the bytes written for a command
    Encode {
        /// Command: up, down, stop, step-up, step-down or position=<PERCENT>
        command: String,
    },

    /// Decode manufacturer data given as hex
    Decode {
        /// Manufacturer data, e.g. F7032001F610017A
        hex: String,
    },

    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// `gira config` actions.
#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Print the effective settings as TOML
    Show,

    /// Print where the config file is read from
    Path,

    /// Write a default configuration file
    Init {
        /// Default cover address to store
        #[arg(short, long)]
        device: Option<String>,

        /// Display name for the cover
        #[arg(short, long)]
        name: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check the configuration file for errors
    Validate,
}
