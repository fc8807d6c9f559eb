//! Utility functions for gira-core.

use btleplug::platform::PeripheralId;

/// Address reported by platforms that hide the MAC address (macOS).
pub const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create an identifier string from an address and peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
/// On other platforms, uses the Bluetooth address.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == HIDDEN_ADDRESS {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

/// Whether `candidate` names the same device as `wanted`.
///
/// Comparison ignores case and colon separators. The hidden macOS
/// address never matches.
pub fn address_matches(candidate: &str, wanted: &str) -> bool {
    if candidate == HIDDEN_ADDRESS || candidate.is_empty() {
        return false;
    }
    candidate.eq_ignore_ascii_case(wanted)
        || candidate
            .replace(':', "")
            .eq_ignore_ascii_case(&wanted.replace(':', ""))
}
