//! Offline codec commands.

use anyhow::{Context, Result};
use gira_types::codec::{decode_broadcast, encode, to_hex};
use gira_types::Command;

use crate::util::parse_hex;

pub fn cmd_encode(command: &str) -> Result<()> {
    println!("{}", encode_line(command)?);
    Ok(())
}

pub fn cmd_decode(hex: &str) -> Result<()> {
    println!("{}", decode_line(hex)?);
    Ok(())
}

fn encode_line(command: &str) -> Result<String> {
    let command: Command = command
        .parse()
        .with_context(|| format!("Cannot parse command '{}'", command))?;
    let bytes = encode(&command)?;
    Ok(to_hex(&bytes))
}

fn decode_line(hex: &str) -> Result<String> {
    let data = parse_hex(hex)?;
    Ok(match decode_broadcast(&data) {
        Some(reading) => format!(
            "{} (raw 0x{:02X}, prefix at offset {})",
            reading.position, reading.raw, reading.offset
        ),
        None => "No position broadcast found".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_line() {
        assert_eq!(encode_line("position=42").unwrap(), "F6032001FC10012A");
        assert_eq!(encode_line("down").unwrap(), "F6032001FF100101");
        assert_eq!(encode_line("stop").unwrap(), "F6032001FD100100");
    }

    #[test]
    fn test_encode_line_rejects_out_of_range() {
        let err = encode_line("position=101").unwrap_err();
        assert!(err.to_string().contains("101"));
        assert!(encode_line("spin").is_err());
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(
            decode_line("F7032001F610017A").unwrap(),
            "52% (raw 0x7A, prefix at offset 0)"
        );
        assert_eq!(
            decode_line("0102F7032001F61001FF").unwrap(),
            "0% (raw 0xFF, prefix at offset 2)"
        );
        assert_eq!(
            decode_line("F7032001F61001").unwrap(),
            "No position broadcast found"
        );
    }
}
