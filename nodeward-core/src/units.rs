//! Byte-size parsing and formatting.

use thiserror::Error;

/// Default minimum database size before fragmentation is evaluated (512 MiB)
pub const DEFAULT_MIN_DB_SIZE: u64 = 512 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ByteSizeError {
    #[error("empty size")]
    Empty,

    #[error("invalid size '{0}'")]
    Invalid(String),

    #[error("unknown unit '{unit}' in '{input}'")]
    UnknownUnit { input: String, unit: String },

    #[error("size '{0}' overflows")]
    Overflow(String),
}

/// Parse a size with base-2 units, e.g. `512MiB`, `1.5GiB`, `4096`.
///
/// `KB`/`K`/`KiB` all mean 1024 bytes; bare numbers are bytes.
pub fn parse_base2_bytes(input: &str) -> Result<u64, ByteSizeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ByteSizeError::Empty);
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let unit = unit.trim();

    let value: f64 = number
        .parse()
        .map_err(|_| ByteSizeError::Invalid(input.to_string()))?;

    let multiplier: u64 = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        "P" | "PB" | "PIB" => 1 << 50,
        _ => {
            return Err(ByteSizeError::UnknownUnit {
                input: input.to_string(),
                unit: unit.to_string(),
            })
        }
    };

    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(ByteSizeError::Overflow(input.to_string()));
    }
    Ok(bytes.round() as u64)
}

/// Format a byte count with SI units the way image sizes are shown
/// (`83 MB`, `1.2 GB`, `512 B`).
#[must_use]
pub fn format_si_bytes(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

    if bytes < 10 {
        return format!("{bytes} B");
    }

    let exponent = ((bytes as f64).ln() / 1000_f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let scaled = bytes as f64 / 1000_f64.powi(exponent as i32);
    let rounded = (scaled * 10.0 + 0.5).floor() / 10.0;

    if rounded < 10.0 {
        format!("{rounded:.1} {}", UNITS[exponent])
    } else {
        format!("{rounded:.0} {}", UNITS[exponent])
    }
}
