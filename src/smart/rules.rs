// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Extraction rules for `smartctl` text output.
//!
//! A [`Rule`] fills one attribute. Its patterns are tried in order and the
//! first one that matches wins, since vendors and firmware revisions print
//! the same value under different labels. Each pattern's first capture
//! group is the raw value, which the rule's [`Post`] step then cleans up.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::attr;
use crate::units::normalize_size;

/// Cleanup applied to a captured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Post {
    /// Use as captured
    Raw,
    /// Drop thousands separators
    Count,
    /// Celsius, converting readings above 200 from Kelvin
    Celsius,
    /// Size string, normalised
    Size,
    /// Decimal gigabytes (10^9 bytes), normalised
    Gigabytes,
}

impl Post {
    fn apply(self, value: &str) -> String {
        let value = value.trim();
        match self {
            Post::Raw => value.to_string(),
            Post::Count => value.replace(',', ""),
            Post::Celsius => match value.parse::<i64>() {
                Ok(kelvin) if kelvin > 200 => ((kelvin as f64 - 273.15) as i64).to_string(),
                _ => value.to_string(),
            },
            Post::Size => normalize_size(value),
            Post::Gigabytes => match value.parse::<f64>() {
                Ok(gb) => normalize_size(&format!("{:.2} GB", gb)),
                Err(_) => value.to_string(),
            },
        }
    }
}

/// One attribute and the ordered patterns that can produce it.
#[derive(Debug)]
pub struct Rule {
    pub attribute: &'static str,
    patterns: Vec<Regex>,
    post: Post,
    /// Value used when no pattern matches
    default: Option<&'static str>,
}

impl Rule {
    fn new(attribute: &'static str, patterns: &[&str], post: Post) -> Self {
        Self {
            attribute,
            patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
            post,
            default: None,
        }
    }

    fn or_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    /// First match across the patterns, post-processed.
    pub fn extract(&self, text: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
            .map(|m| self.post.apply(m.as_str()))
            .or_else(|| self.default.map(str::to_string))
    }
}

/// Apply every rule to `text`, collecting the attributes that were found.
pub fn apply(rules: &[Rule], text: &str) -> BTreeMap<String, String> {
    rules
        .iter()
        .filter_map(|rule| rule.extract(text).map(|v| (rule.attribute.to_string(), v)))
        .collect()
}

/// `smartctl -a` output of NVMe devices.
pub static NVME_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(attr::TEMPERATURE, &[r"Temperature:\s+(\d+)\s+Celsius"], Post::Celsius),
        Rule::new(
            attr::WARNING_TEMPERATURE,
            &[r"Warning\s+Comp\.\s+Temp\.\s+Threshold:\s+(\d+)\s+Celsius"],
            Post::Raw,
        ),
        Rule::new(
            attr::CRITICAL_TEMPERATURE,
            &[r"Critical\s+Comp\.\s+Temp\.\s+Threshold:\s+(\d+)\s+Celsius"],
            Post::Raw,
        ),
        Rule::new(
            attr::POWER_ON_HOURS,
            &[
                r"Power On Hours:\s+(\d+[,\d]*)",
                r"Power_On_Hours.*?(\d+)",
                r"Accumulated power on time.*?(\d+)[:\s]",
                r"number of hours powered up\s*=\s*(\d+\.?\d*)",
            ],
            Post::Count,
        ),
        Rule::new(attr::AVAILABLE_SPARE, &[r"Available Spare:\s+(\d+)%"], Post::Raw),
        Rule::new(attr::PERCENTAGE_USED, &[r"Percentage Used:\s+(\d+)%"], Post::Raw),
        Rule::new(attr::POWER_CYCLES, &[r"Power Cycles:\s+(\d+[,\d]*)"], Post::Count),
        Rule::new(
            attr::DATA_READ,
            &[r"Data Units Read:\s+\d+[,\d]*\s+\[([^\]]+)\]"],
            Post::Size,
        ),
        Rule::new(
            attr::DATA_WRITTEN,
            &[r"Data Units Written:\s+\d+[,\d]*\s+\[([^\]]+)\]"],
            Post::Size,
        ),
        Rule::new(
            attr::UNCORRECTED_ERRORS,
            &[r"Media and Data Integrity Errors:\s+(\d+)"],
            Post::Raw,
        )
        .or_default("0"),
    ]
});

/// `smartctl -a` output of SAS/SATA SSDs and HDDs.
pub static SAS_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(
            attr::TEMPERATURE,
            &[
                r"Current Drive Temperature:\s+(\d+)\s+C",
                r"Temperature:\s+(\d+)\s+Celsius",
                r"Temperature_Celsius.*?(\d+)",
                r"Temperature.*?(\d+)",
            ],
            Post::Raw,
        ),
        Rule::new(
            attr::TRIP_TEMPERATURE,
            &[
                r"Drive Trip Temperature:\s+(\d+)\s+C",
                r"Warning\s+Comp\.\s+Temp\.\s+Threshold:\s+(\d+)",
            ],
            Post::Raw,
        ),
        Rule::new(
            attr::POWER_ON_HOURS,
            &[
                r"number of hours powered up\s*[=:]?\s*(\d+\.\d+)",
                r"Accumulated power on time, hours:minutes\s+(\d+):[\d]+",
                r"Power On Hours:\s+(\d+[,\d]*)",
                r"Power_On_Hours.*?(\d+)",
                r"Accumulated power on time.*?(\d+)[:\s]",
                r"power on time.*?(\d+)\s+hours",
                r"number of hours powered up\s*=\s*(\d+\.?\d*)",
            ],
            Post::Count,
        ),
        Rule::new(
            attr::POWER_CYCLES,
            &[
                r"Accumulated start-stop cycles:\s+(\d+)",
                r"Power Cycles:\s+(\d+[,\d]*)",
                r"Power_Cycle_Count.*?(\d+)",
                r"start-stop cycles:\s+(\d+)",
                r"Power Cycle Count:\s+(\d+)",
                r"Specified cycle count over device lifetime:\s+(\d+)",
            ],
            Post::Count,
        ),
        Rule::new(attr::NON_MEDIUM_ERRORS, &[r"Non-medium error count:\s+(\d+)"], Post::Raw),
        Rule::new(attr::UNCORRECTED_ERRORS, &[r"Total uncorrected errors:\s+(\d+)"], Post::Raw)
            .or_default("0"),
    ]
});

/// The read/write rows of the SAS "Error counter log" table.
static ERROR_COUNTER_LOG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Error counter log:.*?(read:.*?write:.*?)(?:\n\n|\z)").unwrap()
});

/// Gigabytes processed, from inside the error counter log.
pub static SAS_COUNTER_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(attr::DATA_READ, &[r"read:.*?(\d+\.\d+)\s+"], Post::Gigabytes),
        Rule::new(attr::DATA_WRITTEN, &[r"write:.*?(\d+\.\d+)\s+"], Post::Gigabytes),
    ]
});

/// SSD wear, printed by `smartctl -H` on SAS SSDs.
pub static SSD_ENDURANCE: LazyLock<Rule> = LazyLock::new(|| {
    Rule::new(
        attr::PERCENTAGE_USED,
        &[r"Percentage used endurance indicator:\s+(\d+)%"],
        Post::Raw,
    )
});

/// Just the error counter log section, if present.
pub fn error_counter_section(text: &str) -> Option<&str> {
    ERROR_COUNTER_LOG
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Normalised health verdict from `smartctl -H` output.
///
/// The literals are checked in this order, case-sensitively, so a
/// "PASSED" line wins over an incidental "OK".
pub fn health_verdict(text: &str) -> &'static str {
    ["PASSED", "OK", "WARNING", "FAILED"]
        .into_iter()
        .find(|v| text.contains(v))
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_matching_pattern_wins() {
        let text = "Current Drive Temperature:     34 C\nTemperature_Celsius  0x0022  099  45";
        assert_eq!(apply(&SAS_RULES, text)["Temperature"], "34");

        let text = "Temperature:                        41 Celsius";
        assert_eq!(apply(&SAS_RULES, text)["Temperature"], "41");
    }

    #[test]
    fn test_kelvin_temperature_converted() {
        assert_eq!(Post::Celsius.apply("310"), "36");
        assert_eq!(Post::Celsius.apply("45"), "45");
    }

    #[test]
    fn test_counts_drop_separators() {
        let out = apply(&NVME_RULES, "Power On Hours:                     12,345\nPower Cycles:   1,024");
        assert_eq!(out["Power_On_Hours"], "12345");
        assert_eq!(out["Power_Cycles"], "1024");
    }

    #[test]
    fn test_default_when_absent() {
        let out = apply(&NVME_RULES, "");
        assert_eq!(out.len(), 1);
        assert_eq!(out["Uncorrected_Errors"], "0");
    }

    #[test]
    fn test_error_counter_section() {
        let text = "Error counter log:\n  header\nread:   0  0  0  0  0   1024.000   0\nwrite:  0  0  0  0  0   2048.500   0\n\nNon-medium error count:  3";
        let section = error_counter_section(text).unwrap();
        assert!(section.starts_with("read:"));
        assert!(!section.contains("Non-medium"));
        let out = apply(&SAS_COUNTER_RULES, section);
        assert_eq!(out["Data_Read"], "1.00 TB");
        assert_eq!(out["Data_Written"], "2.00 TB");
    }

    #[test]
    fn test_health_verdict() {
        assert_eq!(
            health_verdict("SMART overall-health self-assessment test result: PASSED"),
            "PASSED"
        );
        assert_eq!(health_verdict("SMART Health Status: OK"), "OK");
        assert_eq!(health_verdict("result: FAILED!"), "FAILED");
        assert_eq!(health_verdict("WARNING: drive reports low spare"), "WARNING");
        assert_eq!(health_verdict("nothing useful"), "unknown");
    }
}
