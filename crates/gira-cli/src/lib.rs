//! Command-line interface for Gira System 3000 BLE covers.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `open` / `close` / `stop` | Move the cover fully up, fully down, or halt it |
//! | `step-up` / `step-down` | Move one step |
//! | `position <PERCENT>` | Move to an absolute position (0 = closed, 100 = open) |
//! | `watch` | Print position broadcasts without connecting |
//! | `scan` | List nearby covers |
//! | `encode` / `decode` | Show the bytes of a command or decode a broadcast |
//! | `config` | Manage the configuration file |
//!
//! # Configuration
//!
//! Settings are read from `~/.config/gira/config.toml` (or platform
//! equivalent):
//!
//! - `device`: default cover address
//! - `name`: display name for the default cover
//! - `connect_timeout`, `write_timeout`: seconds
//! - `attempts`: connection attempts per command
//! - `keep_alive`: keep the connection open between commands
//! - `stale_timeout`: seconds without broadcasts before a cover is unavailable
//!
//! # Environment Variables
//!
//! - `GIRA_DEVICE`: default cover address (overridden by `--device`)
//! - `RUST_LOG`: log filter when neither `-v` nor `-q` is given
//!
//! # Examples
//!
//! ```bash
//! gira scan
//! gira --device AA:BB:CC:DD:EE:FF position 40
//! gira watch --json
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod util;

// Re-export core dependencies for convenience
pub use gira_core;
pub use gira_types;
