//! Utility functions for CLI operations.

use anyhow::{Result, bail};
use gira_types::DeviceIdentity;

use crate::config::Config;

/// Resolve the cover to use, with a helpful error when none is configured.
pub fn require_identity(device: Option<&str>, config: &Config) -> Result<DeviceIdentity> {
    match config.identity(device) {
        Some(identity) => Ok(identity),
        None => bail!(
            "No device specified. Use --device <ADDRESS>, set GIRA_DEVICE, or run \
             'gira config init --device <ADDRESS>'.\n\
             Run 'gira scan' to find nearby covers."
        ),
    }
}

/// Parse hex input, ignoring whitespace, colons and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();

    if !cleaned.is_ascii() {
        bail!("Hex input contains non-ASCII characters: '{}'", input);
    }
    if cleaned.len() % 2 != 0 {
        bail!("Hex input has an odd number of digits: '{}'", input);
    }

    (0..cleaned.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&cleaned[i..i + 2], 16)
                .map_err(|_| anyhow::anyhow!("Invalid hex byte '{}'", &cleaned[i..i + 2]))
        })
        .collect()
}
