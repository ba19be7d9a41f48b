// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Disk records produced by one collection run.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::history::DiskTotals;

/// Pool name given to disks no pool claims.
pub const UNASSIGNED_POOL: &str = "Unassigned";

/// Canonical attribute names in [`Disk::attributes`].
pub mod attr {
    pub const TEMPERATURE: &str = "Temperature";
    pub const WARNING_TEMPERATURE: &str = "Warning_Temperature";
    pub const CRITICAL_TEMPERATURE: &str = "Critical_Temperature";
    pub const TRIP_TEMPERATURE: &str = "Trip_Temperature";
    pub const POWER_ON_HOURS: &str = "Power_On_Hours";
    pub const POWER_CYCLES: &str = "Power_Cycles";
    pub const PERCENTAGE_USED: &str = "Percentage_Used";
    pub const AVAILABLE_SPARE: &str = "Available_Spare";
    pub const SMART_STATUS: &str = "Smart_Status";
    pub const DATA_READ: &str = "Data_Read";
    pub const DATA_WRITTEN: &str = "Data_Written";
    pub const NON_MEDIUM_ERRORS: &str = "Non_Medium_Errors";
    pub const UNCORRECTED_ERRORS: &str = "Uncorrected_Errors";
    pub const TYPE: &str = "Type";
}

/// Device class, decided once from name, raw type and model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiskKind {
    #[serde(rename = "SAS_HDD")]
    SasHdd,
    #[serde(rename = "SAS_SSD")]
    SasSsd,
    #[serde(rename = "NVME_SSD")]
    NvmeSsd,
    #[serde(rename = "VIRTUAL")]
    Virtual,
}

impl DiskKind {
    /// Classify a device.
    ///
    /// Virtual models win over everything, then an `nvme` name prefix, then
    /// the raw type `HDD`. Anything else is a SAS/SATA SSD.
    pub fn classify(name: &str, raw_type: &str, model: &str) -> Self {
        if model.contains("VMware") || model.contains("Virtual") {
            DiskKind::Virtual
        } else if name.starts_with("nvme") {
            DiskKind::NvmeSsd
        } else if raw_type.eq_ignore_ascii_case("HDD") {
            DiskKind::SasHdd
        } else {
            DiskKind::SasSsd
        }
    }

    pub fn is_ssd(&self) -> bool {
        matches!(self, DiskKind::SasSsd | DiskKind::NvmeSsd)
    }
}

impl std::fmt::Display for DiskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SasHdd => write!(f, "SAS_HDD"),
            Self::SasSsd => write!(f, "SAS_SSD"),
            Self::NvmeSsd => write!(f, "NVME_SSD"),
            Self::Virtual => write!(f, "VIRTUAL"),
        }
    }
}

/// Overall disk health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskStatus {
    Ok,
    Warning,
    Error,
    Unknown,
}

impl std::fmt::Display for DiskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "Warning"),
            Self::Error => write!(f, "Error"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One physical or virtual disk
#[derive(Debug, Clone, Serialize)]
pub struct Disk {
    /// Device name without `/dev/` (e.g., "sda", "nvme0n1")
    pub name: String,
    /// Type string as reported by the inventory tool
    pub raw_type: String,
    kind: DiskKind,
    pub model: String,
    pub size: String,
    /// Owning pool, or [`UNASSIGNED_POOL`]
    pub pool: String,
    /// Extracted SMART attributes, keyed by the names in [`attr`]
    pub attributes: BTreeMap<String, String>,
    status: DiskStatus,
    /// Bytes read since the previous run (only when history had this disk)
    pub read_increment: Option<String>,
    /// Bytes written since the previous run (only when history had this disk)
    pub write_increment: Option<String>,
}

impl Disk {
    pub fn new(
        name: impl Into<String>,
        raw_type: impl Into<String>,
        model: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let raw_type = raw_type.into();
        let model = model.into();
        let kind = DiskKind::classify(&name, &raw_type, &model);
        Self {
            name,
            raw_type,
            kind,
            model,
            size: size.into(),
            pool: UNASSIGNED_POOL.to_string(),
            attributes: BTreeMap::new(),
            status: DiskStatus::Unknown,
            read_increment: None,
            write_increment: None,
        }
    }

    pub fn kind(&self) -> DiskKind {
        self.kind
    }

    /// Explicit status if one was set, otherwise derived from the attributes.
    pub fn status(&self) -> DiskStatus {
        if self.status != DiskStatus::Unknown {
            return self.status;
        }
        self.derive_status()
    }

    /// Pin the current status so later attribute changes cannot move it.
    pub fn update_status(&mut self) {
        self.status = self.status();
    }

    pub fn set_status(&mut self, status: DiskStatus) {
        self.status = status;
    }

    fn derive_status(&self) -> DiskStatus {
        if let Some(verdict) = self.attributes.get(attr::SMART_STATUS) {
            match verdict.to_uppercase().as_str() {
                "PASSED" | "OK" => return DiskStatus::Ok,
                "WARNING" => return DiskStatus::Warning,
                "FAILED" => return DiskStatus::Error,
                _ => {}
            }
        }
        match self.attributes.get(attr::UNCORRECTED_ERRORS) {
            Some(errors) if !errors.is_empty() && errors != "0" => DiskStatus::Warning,
            _ => DiskStatus::Unknown,
        }
    }

    /// Copy extracted attributes in, overwriting same-named ones.
    pub fn merge_attributes(&mut self, attributes: BTreeMap<String, String>) {
        self.attributes.extend(attributes);
    }

    /// Attribute value, or `"N/A"` when absent or empty.
    pub fn attribute(&self, name: &str) -> &str {
        match self.attributes.get(name) {
            Some(v) if !v.is_empty() => v,
            _ => "N/A",
        }
    }

    pub fn display_temperature(&self) -> String {
        match self.attributes.get(attr::TEMPERATURE) {
            Some(t) if !t.is_empty() => format!("{}°C", t),
            _ => "N/A".to_string(),
        }
    }

    /// Read/write totals worth remembering for the next run.
    pub fn totals(&self) -> DiskTotals {
        DiskTotals {
            data_read: self.attributes.get(attr::DATA_READ).filter(|v| !v.is_empty()).cloned(),
            data_written: self
                .attributes
                .get(attr::DATA_WRITTEN)
                .filter(|v| !v.is_empty())
                .cloned(),
            ..DiskTotals::default()
        }
    }
}

/// Column description for a displayed attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskAttribute {
    pub name: &'static str,
    pub display_name: &'static str,
    pub unit: &'static str,
}

const fn column(name: &'static str, display_name: &'static str, unit: &'static str) -> DiskAttribute {
    DiskAttribute { name, display_name, unit }
}

const SAS_SSD_COLUMNS: &[DiskAttribute] = &[
    column(attr::TEMPERATURE, "Temperature", "°C"),
    column(attr::TRIP_TEMPERATURE, "Trip Temperature", "°C"),
    column(attr::POWER_ON_HOURS, "Power On Hours", "h"),
    column(attr::POWER_CYCLES, "Power Cycles", ""),
    column(attr::PERCENTAGE_USED, "Percentage Used", "%"),
    column(attr::SMART_STATUS, "SMART Status", ""),
    column(attr::DATA_READ, "Data Read", ""),
    column(attr::DATA_WRITTEN, "Data Written", ""),
    column(attr::NON_MEDIUM_ERRORS, "Non-Medium Errors", ""),
    column(attr::UNCORRECTED_ERRORS, "Uncorrected Errors", ""),
];

const SAS_HDD_COLUMNS: &[DiskAttribute] = &[
    column(attr::TEMPERATURE, "Temperature", "°C"),
    column(attr::TRIP_TEMPERATURE, "Trip Temperature", "°C"),
    column(attr::POWER_ON_HOURS, "Power On Hours", "h"),
    column(attr::POWER_CYCLES, "Power Cycles", ""),
    column(attr::SMART_STATUS, "SMART Status", ""),
    column(attr::DATA_READ, "Data Read", ""),
    column(attr::DATA_WRITTEN, "Data Written", ""),
    column(attr::NON_MEDIUM_ERRORS, "Non-Medium Errors", ""),
    column(attr::UNCORRECTED_ERRORS, "Uncorrected Errors", ""),
];

const NVME_COLUMNS: &[DiskAttribute] = &[
    column(attr::TEMPERATURE, "Temperature", "°C"),
    column(attr::WARNING_TEMPERATURE, "Warning Temperature", "°C"),
    column(attr::CRITICAL_TEMPERATURE, "Critical Temperature", "°C"),
    column(attr::POWER_ON_HOURS, "Power On Hours", "h"),
    column(attr::POWER_CYCLES, "Power Cycles", ""),
    column(attr::PERCENTAGE_USED, "Percentage Used", "%"),
    column(attr::AVAILABLE_SPARE, "Available Spare", "%"),
    column(attr::SMART_STATUS, "SMART Status", ""),
    column(attr::DATA_READ, "Data Read", ""),
    column(attr::DATA_WRITTEN, "Data Written", ""),
];

const VIRTUAL_COLUMNS: &[DiskAttribute] = &[column(attr::TYPE, "Device Type", "")];

/// All disks from one run, plus what the previous run left behind.
#[derive(Debug, Clone, Serialize)]
pub struct DiskSet {
    pub disks: Vec<Disk>,
    /// Totals loaded from history at the start of the run
    pub previous: BTreeMap<String, DiskTotals>,
    /// When the previous run saved its totals
    pub previous_timestamp: Option<String>,
    pub collected_at: DateTime<Local>,
}

impl Default for DiskSet {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskSet {
    pub fn new() -> Self {
        Self {
            disks: Vec::new(),
            previous: BTreeMap::new(),
            previous_timestamp: None,
            collected_at: Local::now(),
        }
    }

    pub fn add(&mut self, disk: Disk) {
        self.disks.push(disk);
    }

    pub fn sort(&mut self) {
        self.disks.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn len(&self) -> usize {
        self.disks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Disk> {
        self.disks.iter().find(|d| d.name == name)
    }

    /// Disks grouped by kind, each group in name order.
    pub fn grouped(&self) -> BTreeMap<DiskKind, Vec<&Disk>> {
        let mut groups: BTreeMap<DiskKind, Vec<&Disk>> = BTreeMap::new();
        for disk in &self.disks {
            groups.entry(disk.kind()).or_default().push(disk);
        }
        for group in groups.values_mut() {
            group.sort_by(|a, b| a.name.cmp(&b.name));
        }
        groups
    }

    pub fn count_by_kind(&self, kind: DiskKind) -> usize {
        self.disks.iter().filter(|d| d.kind() == kind).count()
    }

    pub fn ssd_count(&self) -> usize {
        self.disks.iter().filter(|d| d.kind().is_ssd()).count()
    }

    pub fn hdd_count(&self) -> usize {
        self.count_by_kind(DiskKind::SasHdd)
    }

    pub fn warning_count(&self) -> usize {
        self.disks.iter().filter(|d| d.status() == DiskStatus::Warning).count()
    }

    pub fn error_count(&self) -> usize {
        self.disks.iter().filter(|d| d.status() == DiskStatus::Error).count()
    }

    /// Attribute columns worth showing for one kind of disk.
    pub fn display_attributes(kind: DiskKind) -> &'static [DiskAttribute] {
        match kind {
            DiskKind::SasSsd => SAS_SSD_COLUMNS,
            DiskKind::SasHdd => SAS_HDD_COLUMNS,
            DiskKind::NvmeSsd => NVME_COLUMNS,
            DiskKind::Virtual => VIRTUAL_COLUMNS,
        }
    }

    pub fn set_previous(&mut self, previous: BTreeMap<String, DiskTotals>, timestamp: Option<String>) {
        self.previous = previous;
        self.previous_timestamp = timestamp.filter(|t| !t.is_empty());
    }

    pub fn has_previous(&self) -> bool {
        self.previous_timestamp.is_some() && !self.previous.is_empty()
    }

    pub fn collection_time(&self) -> String {
        self.collected_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk_with(attrs: &[(&str, &str)]) -> Disk {
        let mut disk = Disk::new("sda", "SSD", "Samsung PM1643", "3.84 TB");
        for (k, v) in attrs {
            disk.attributes.insert(k.to_string(), v.to_string());
        }
        disk
    }

    #[test]
    fn test_classify() {
        assert_eq!(DiskKind::classify("sda", "HDD", "ST4000NM"), DiskKind::SasHdd);
        assert_eq!(DiskKind::classify("sdb", "hdd", "ST4000NM"), DiskKind::SasHdd);
        assert_eq!(DiskKind::classify("sdc", "SSD", "PM1643"), DiskKind::SasSsd);
        assert_eq!(DiskKind::classify("sdd", "", "VMware Virtual disk"), DiskKind::Virtual);
    }

    #[test]
    fn test_nvme_prefix_wins_over_raw_type() {
        for raw in ["HDD", "SSD", "", "disk", "whatever"] {
            assert_eq!(DiskKind::classify("nvme0n1", raw, "Intel P4510"), DiskKind::NvmeSsd);
        }
    }

    #[test]
    fn test_kind_fixed_at_construction() {
        let mut disk = Disk::new("nvme1n1", "HDD", "Micron 7450", "1.92 TB");
        disk.raw_type = "SSD".into();
        disk.model = "VMware Virtual NVMe".into();
        assert_eq!(disk.kind(), DiskKind::NvmeSsd);
    }

    #[test]
    fn test_status_from_smart_verdict() {
        assert_eq!(disk_with(&[("Smart_Status", "PASSED")]).status(), DiskStatus::Ok);
        assert_eq!(disk_with(&[("Smart_Status", "OK")]).status(), DiskStatus::Ok);
        assert_eq!(disk_with(&[("Smart_Status", "WARNING")]).status(), DiskStatus::Warning);
        assert_eq!(disk_with(&[("Smart_Status", "FAILED")]).status(), DiskStatus::Error);
        assert_eq!(disk_with(&[("Smart_Status", "unknown")]).status(), DiskStatus::Unknown);
    }

    #[test]
    fn test_status_from_uncorrected_errors() {
        let disk = disk_with(&[("Smart_Status", "unknown"), ("Uncorrected_Errors", "3")]);
        assert_eq!(disk.status(), DiskStatus::Warning);
        let disk = disk_with(&[("Uncorrected_Errors", "0")]);
        assert_eq!(disk.status(), DiskStatus::Unknown);
    }

    #[test]
    fn test_status_idempotent_and_sticky() {
        let mut disk = disk_with(&[("Smart_Status", "FAILED")]);
        disk.update_status();
        disk.update_status();
        assert_eq!(disk.status(), DiskStatus::Error);

        disk.attributes.insert("Smart_Status".into(), "PASSED".into());
        assert_eq!(disk.status(), DiskStatus::Error);
    }

    #[test]
    fn test_display_helpers() {
        let disk = disk_with(&[("Temperature", "38"), ("Power_Cycles", "")]);
        assert_eq!(disk.display_temperature(), "38°C");
        assert_eq!(disk.attribute("Power_Cycles"), "N/A");
        assert_eq!(disk.attribute("Missing"), "N/A");
        assert_eq!(Disk::new("sdz", "", "", "").display_temperature(), "N/A");
    }

    #[test]
    fn test_totals_skip_empty_values() {
        let disk = disk_with(&[("Data_Read", "1.00 TB"), ("Data_Written", "")]);
        let totals = disk.totals();
        assert_eq!(totals.data_read.as_deref(), Some("1.00 TB"));
        assert!(totals.data_written.is_none());
    }

    #[test]
    fn test_disk_set_counts_and_groups() {
        let mut set = DiskSet::new();
        set.add(Disk::new("sdb", "HDD", "ST8000", "8 TB"));
        set.add(Disk::new("sda", "SSD", "PM1643", "3.84 TB"));
        set.add(Disk::new("nvme0n1", "SSD", "P4510", "2 TB"));
        let mut failing = Disk::new("sdc", "HDD", "ST8000", "8 TB");
        failing.attributes.insert("Smart_Status".into(), "FAILED".into());
        set.add(failing);
        set.sort();

        assert_eq!(set.len(), 4);
        assert_eq!(set.disks[0].name, "nvme0n1");
        assert_eq!(set.ssd_count(), 2);
        assert_eq!(set.hdd_count(), 2);
        assert_eq!(set.error_count(), 1);
        assert_eq!(set.warning_count(), 0);

        let groups = set.grouped();
        let hdds: Vec<_> = groups[&DiskKind::SasHdd].iter().map(|d| d.name.as_str()).collect();
        assert_eq!(hdds, vec!["sdb", "sdc"]);
    }

    #[test]
    fn test_display_attribute_columns() {
        let nvme = DiskSet::display_attributes(DiskKind::NvmeSsd);
        assert!(nvme.iter().any(|c| c.name == attr::AVAILABLE_SPARE));
        let hdd = DiskSet::display_attributes(DiskKind::SasHdd);
        assert!(!hdd.iter().any(|c| c.name == attr::PERCENTAGE_USED));
        assert_eq!(DiskSet::display_attributes(DiskKind::Virtual).len(), 1);
    }

    #[test]
    fn test_previous_data() {
        let mut set = DiskSet::new();
        assert!(!set.has_previous());
        let mut prev = BTreeMap::new();
        prev.insert("sda".to_string(), DiskTotals::default());
        set.set_previous(prev, Some(String::new()));
        assert!(!set.has_previous());
        let prev = set.previous.clone();
        set.set_previous(prev, Some("2026-01-01T00:00:00Z".into()));
        assert!(set.has_previous());
    }
}
