//! Command implementations for the CLI.

mod codec;
mod config;
mod control;
mod scan;
mod watch;

pub use codec::{cmd_decode, cmd_encode};
pub use config::cmd_config;
pub use control::cmd_control;
pub use scan::cmd_scan;
pub use watch::{WatchArgs, cmd_watch};
