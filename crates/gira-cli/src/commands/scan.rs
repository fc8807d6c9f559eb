//! Scan command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use gira_core::{BtleTransport, DiscoveredCover};
use gira_types::codec::{decode_broadcast, to_hex};
use serde_json::json;

use crate::cli::OutputFormat;

pub async fn cmd_scan(timeout: u64, format: OutputFormat, quiet: bool) -> Result<()> {
    if !quiet && format == OutputFormat::Text {
        eprintln!("Scanning for Gira covers ({}s)...", timeout);
    }

    let transport = BtleTransport::new()
        .await
        .context("Failed to open Bluetooth adapter")?;
    let covers = transport
        .discover(Duration::from_secs(timeout))
        .await
        .context("Failed to scan for covers")?;

    let content = match format {
        OutputFormat::Json => format_scan_json(&covers)?,
        OutputFormat::Text => format_scan_text(&covers, !quiet),
    };
    println!("{}", content);
    Ok(())
}

fn format_scan_text(covers: &[DiscoveredCover], show_tips: bool) -> String {
    if covers.is_empty() {
        return "No Gira covers found.".to_string();
    }

    let mut out = format!(
        "{:<40} {:<20} {:>5} {:>9}\n",
        "ADDRESS", "NAME", "RSSI", "POSITION"
    );
    for cover in covers {
        let position = decode_broadcast(&cover.manufacturer_data)
            .map(|r| r.position.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<40} {:<20} {:>5} {:>9}\n",
            cover.address,
            cover.name.as_deref().unwrap_or("Unknown"),
            cover
                .rssi
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            position
        ));
    }
    if show_tips {
        out.push_str("\nSave a default cover with: gira config init --device <ADDRESS>");
    }
    out.trim_end().to_string()
}

fn format_scan_json(covers: &[DiscoveredCover]) -> Result<String> {
    let entries: Vec<_> = covers
        .iter()
        .map(|cover| {
            let reading = decode_broadcast(&cover.manufacturer_data);
            json!({
                "address": cover.address,
                "name": cover.name,
                "rssi": cover.rssi,
                "manufacturer_data": to_hex(&cover.manufacturer_data),
                "position": reading.map(|r| r.position.percent()),
            })
        })
        .collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}
