//! Movement commands (open, close, stop, step, position).

use std::sync::Arc;

use anyhow::{Context, Result};
use gira_core::{BtleTransport, CoverClient, Error};
use gira_types::Command;

use crate::cli::DeviceArgs;
use crate::config::Config;
use crate::util::require_identity;

pub async fn cmd_control(
    command: Command,
    device: &DeviceArgs,
    config: &Config,
    quiet: bool,
) -> Result<()> {
    let identity = require_identity(device.device.as_deref(), config)?;
    let client_config = config.client_config(device.timeout, device.attempts);

    // Reject bad arguments before touching the adapter
    gira_types::encode(&command).map_err(Error::from)?;

    let transport = Arc::new(
        BtleTransport::new()
            .await
            .context("Failed to open Bluetooth adapter")?,
    );
    let client = CoverClient::new(identity.clone(), transport, client_config);

    let result = client.send(command).await;
    client.disconnect().await;

    match result {
        Ok(()) => {
            if !quiet {
                println!("Sent {} to {}", command, identity);
            }
            Ok(())
        }
        Err(e @ Error::DeviceNotFound(_)) => Err(e).with_context(|| {
            format!(
                "{} was not found. Make sure the cover is powered and in range.",
                identity
            )
        }),
        Err(e) => Err(e).with_context(|| format!("Failed to send {} to {}", command, identity)),
    }
}
