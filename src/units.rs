// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Size strings: parsing `<number> <unit>` into bytes and formatting bytes
//! back into the canonical two-decimal form (`"512.00 GB"`).
//!
//! Units are binary (1 KB = 1024 B) regardless of what the source tool
//! meant, so that values from different tools compare consistently.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{MonitorError, Result};

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
const STEP: f64 = 1024.0;

static SIZE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d+(?:\.\d*)?(?:e[+-]?\d+)?)\s*([KMGTP]?)i?B$").unwrap());

/// Parse a size string like `"1.5 TB"`, `"512GB"`, `"1.2e+12 B"` or `"1.2e+12"` into bytes.
///
/// A bare number is taken as a byte count. Thousands separators are ignored.
/// Anything around the number and unit makes the whole string invalid.
pub fn parse_size(s: &str) -> Result<f64> {
    let s = s.trim().replace(',', "");
    if s.is_empty() || s.eq_ignore_ascii_case("N/A") {
        return Err(MonitorError::Parse(format!("invalid size string: {:?}", s)));
    }

    if let Some(caps) = SIZE_PATTERN.captures(&s) {
        let value: f64 = caps[1]
            .parse()
            .map_err(|_| MonitorError::Parse(format!("invalid numeric value: {}", &caps[1])))?;
        let exponent = match caps[2].to_ascii_uppercase().as_str() {
            "" => 0,
            "K" => 1,
            "M" => 2,
            "G" => 3,
            "T" => 4,
            "P" => 5,
            other => return Err(MonitorError::Parse(format!("unknown unit: {}B", other))),
        };
        return Ok(value * STEP.powi(exponent));
    }

    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| MonitorError::Parse(format!("unable to parse size: {}", s)))
}

/// Format a byte count in the largest unit that keeps the value in `[1, 1024)`.
pub fn format_size(bytes: f64) -> String {
    let sign = if bytes < 0.0 { "-" } else { "" };
    let mut size = bytes.abs();
    let mut unit = 0;

    while size >= STEP && unit < UNITS.len() - 1 {
        size /= STEP;
        unit += 1;
    }
    // 1023.999 B prints as 1024.00 B otherwise, which would not survive a re-parse.
    if format!("{:.2}", size) == "1024.00" && unit < UNITS.len() - 1 {
        size /= STEP;
        unit += 1;
    }

    format!("{}{:.2} {}", sign, size, UNITS[unit])
}

/// Normalise a size string into canonical form; strings that are not sizes
/// come back unchanged.
pub fn normalize_size(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match parse_size(trimmed) {
        Ok(bytes) => format_size(bytes),
        Err(_) => {
            log::debug!("leaving unparseable size as-is: {}", trimmed);
            trimmed.to_string()
        }
    }
}
