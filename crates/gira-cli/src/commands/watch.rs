//! Watch command implementation.
//!
//! Prints position broadcasts from one cover without ever connecting to it.

use std::sync::Arc;

use anyhow::{Context, Result};
use gira_core::{BtleTransport, CoverEvent, PassiveListener};
use time::format_description::well_known::Rfc3339;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::util::require_identity;

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub device: Option<String>,
    pub format: OutputFormat,
    pub count: u32,
    pub changes_only: bool,
    pub quiet: bool,
    pub config: &'a Config,
}

pub async fn cmd_watch(args: WatchArgs<'_>) -> Result<()> {
    let WatchArgs {
        device,
        format,
        count,
        changes_only,
        quiet,
        config,
    } = args;

    let identity = require_identity(device.as_deref(), config)?;
    let options = config.listener_options().deduplicate(changes_only);

    let transport = Arc::new(
        BtleTransport::new()
            .await
            .context("Failed to open Bluetooth adapter")?,
    );
    let listener = Arc::new(PassiveListener::new(identity.clone(), options));
    let mut events = listener.subscribe();
    let cancel = CancellationToken::new();
    let task = listener
        .start(transport, cancel.clone())
        .await
        .context("Failed to start scanning")?;

    if !quiet {
        eprintln!(
            "Listening for broadcasts from {} (Ctrl+C to stop)...",
            identity
        );
    }

    let mut positions: u32 = 0;
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if !quiet {
                    eprintln!("\nShutting down...");
                }
                break;
            }
            event = events.recv() => event,
        };

        match event {
            Ok(event) => {
                if let Some(line) = format_event(&event, format)? {
                    println!("{}", line);
                }
                if matches!(event, CoverEvent::PositionChanged { .. }) {
                    positions += 1;
                    if count > 0 && positions >= count {
                        break;
                    }
                }
            }
            Err(RecvError::Lagged(missed)) => warn!("Skipped {} events", missed),
            Err(RecvError::Closed) => break,
        }
    }

    cancel.cancel();
    task.await.context("Listener task failed")?;
    Ok(())
}

/// Render one event, or `None` for events watch does not print.
pub fn format_event(event: &CoverEvent, format: OutputFormat) -> Result<Option<String>> {
    match format {
        OutputFormat::Json => match event {
            CoverEvent::PositionChanged { .. } | CoverEvent::Unavailable { .. } => {
                Ok(Some(serde_json::to_string(event)?))
            }
            _ => Ok(None),
        },
        OutputFormat::Text => match event {
            CoverEvent::PositionChanged {
                device,
                position,
                raw,
                received_at,
            } => Ok(Some(format!(
                "{}  {}  {:>4}  (raw 0x{:02X})",
                received_at.format(&Rfc3339)?,
                device.name.as_deref().unwrap_or(&device.id),
                position.to_string(),
                raw
            ))),
            CoverEvent::Unavailable { device } => Ok(Some(format!(
                "{} is no longer broadcasting",
                device.name.as_deref().unwrap_or(&device.id)
            ))),
            _ => Ok(None),
        },
    }
}
