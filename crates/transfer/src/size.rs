//! Human-readable byte sizes.

use crate::TransferError;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

/// Parses sizes such as `512`, `64kb`, `8mb` or `1G` (binary units).
pub fn parse_size_bytes(input: &str) -> Result<u64, TransferError> {
    let s = input.trim().to_lowercase();
    let split_at = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split_at);
    if digits.is_empty() {
        return Err(TransferError::InvalidSize(format!(
            "missing number in '{input}'"
        )));
    }
    let num: u64 = digits
        .parse()
        .map_err(|_| {
            TransferError::InvalidSize(format!("number too large in '{input}'"))
        })?;

    let multiplier = match unit.trim() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => KIB,
        "m" | "mb" | "mib" => MIB,
        "g" | "gb" | "gib" => GIB,
        "t" | "tb" | "tib" => TIB,
        other => {
            return Err(TransferError::InvalidSize(format!(
                "unknown unit '{other}'"
            )));
        }
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| TransferError::InvalidSize(format!("size overflows: '{input}'")))
}

/// Formats a byte count with two decimals in the largest fitting unit.
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= GIB {
        format!("{:.2} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
