// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Disk inventory: `midclt call disk.query`, falling back to `lsblk`.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::first_found;
use crate::error::{MonitorError, Result};
use crate::exec::{CommandRunner, Deadline};
use crate::model::Disk;
use crate::units::{format_size, normalize_size};

const MIDCLT_DISK_QUERY: &str = "midclt call disk.query";
const LSBLK_DISKS: &str = "lsblk -d -o NAME,TYPE,MODEL,SIZE -n | grep 'disk'";

/// One entry of `disk.query`. Only the fields used here.
#[derive(Debug, Deserialize)]
struct DiskRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    disk_type: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    size: Value,
}

pub struct DiskDiscovery {
    runner: Arc<dyn CommandRunner>,
}

impl DiskDiscovery {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Every disk the host reports.
    ///
    /// Fails only when both sources error out or find nothing.
    pub fn discover(&self, deadline: &Deadline) -> Result<Vec<Disk>> {
        let midclt = || self.from_midclt(deadline);
        let lsblk = || self.from_lsblk(deadline);
        let disks = first_found::<Vec<Disk>>("disk list", &[("midclt", &midclt), ("lsblk", &lsblk)])?;
        log::info!("Found {} disks", disks.len());
        Ok(disks)
    }

    /// Structured inventory from the TrueNAS middleware.
    pub fn from_midclt(&self, deadline: &Deadline) -> Result<Vec<Disk>> {
        let output = self.runner.run_within(MIDCLT_DISK_QUERY, deadline)?;
        parse_disk_query(&output)
    }

    /// Block-device listing. NVMe devices are typed SSD, everything else HDD.
    pub fn from_lsblk(&self, deadline: &Deadline) -> Result<Vec<Disk>> {
        let output = self.runner.run_within(LSBLK_DISKS, deadline)?;
        Ok(parse_lsblk(&output))
    }
}

/// Parse the JSON array printed by `midclt call disk.query`.
pub fn parse_disk_query(json: &str) -> Result<Vec<Disk>> {
    let records: Vec<DiskRecord> = serde_json::from_str(json)
        .map_err(|e| MonitorError::from(e).context("parsing disk.query output"))?;

    Ok(records
        .into_iter()
        .filter_map(|r| {
            let name = r.name.filter(|n| !n.is_empty())?;
            Some(Disk::new(
                name,
                r.disk_type.unwrap_or_default(),
                r.model.unwrap_or_default(),
                size_string(&r.size),
            ))
        })
        .collect())
}

fn size_string(size: &Value) -> String {
    match size {
        Value::Number(n) => n.as_f64().map(format_size).unwrap_or_else(|| n.to_string()),
        Value::String(s) => normalize_size(s),
        _ => String::new(),
    }
}

/// Parse `lsblk -d -o NAME,TYPE,MODEL,SIZE -n` lines.
///
/// The model may contain spaces, so it is everything between the type
/// column and the last (size) column.
pub fn parse_lsblk(output: &str) -> Vec<Disk> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 || parts[1] != "disk" {
                return None;
            }
            let name = parts[0];
            let raw_type = if name.to_lowercase().contains("nvme") { "SSD" } else { "HDD" };
            let model = parts[2..parts.len() - 1].join(" ");
            let size = parts[parts.len() - 1];
            Some(Disk::new(name, raw_type, model, size))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::mock::MockRunner;
    use crate::model::DiskKind;

    const DISK_QUERY: &str = r#"[
        {"name": "sda", "type": "SSD", "model": "SAMSUNG MZILT3T8HBLS/007", "size": 3840755982336},
        {"name": "sdb", "type": "HDD", "model": "ST16000NM002G", "size": 1.6000900661248e13},
        {"name": "nvme0n1", "type": "SSD", "model": "INTEL SSDPE2KX040T8", "size": 4000787030016},
        {"name": "", "type": "HDD", "model": "ghost", "size": null},
        {"type": "HDD"}
    ]"#;

    const LSBLK: &str = "\
sda     disk SAMSUNG MZILT3T8HBLS/007   3.5T
sdb     disk ST16000NM002G             14.6T
nvme0n1 disk INTEL SSDPE2KX040T8        3.7T
sr0     rom  VMware Virtual SATA CDRW  1024M";

    #[test]
    fn test_parse_disk_query() {
        let disks = parse_disk_query(DISK_QUERY).unwrap();
        assert_eq!(disks.len(), 3);
        assert_eq!(disks[0].name, "sda");
        assert_eq!(disks[0].kind(), DiskKind::SasSsd);
        assert_eq!(disks[0].size, "3.49 TB");
        assert_eq!(disks[1].kind(), DiskKind::SasHdd);
        assert_eq!(disks[1].size, "14.55 TB");
        assert_eq!(disks[2].kind(), DiskKind::NvmeSsd);
    }

    #[test]
    fn test_parse_disk_query_rejects_garbage() {
        assert!(parse_disk_query("not json").is_err());
    }

    #[test]
    fn test_parse_lsblk() {
        let disks = parse_lsblk(LSBLK);
        assert_eq!(disks.len(), 3);
        assert_eq!(disks[0].model, "SAMSUNG MZILT3T8HBLS/007");
        assert_eq!(disks[0].raw_type, "HDD");
        assert_eq!(disks[1].size, "14.6T");
        assert_eq!(disks[2].raw_type, "SSD");
        assert_eq!(disks[2].kind(), DiskKind::NvmeSsd);
    }

    #[test]
    fn test_lsblk_without_model() {
        let disks = parse_lsblk("vda disk 20G");
        assert_eq!(disks[0].model, "");
        assert_eq!(disks[0].size, "20G");
    }

    #[test]
    fn test_falls_back_to_lsblk() {
        let runner = Arc::new(
            MockRunner::new()
                .with_error(MIDCLT_DISK_QUERY, "midclt: command not found")
                .with_output(LSBLK_DISKS, LSBLK),
        );
        let disks = DiskDiscovery::new(runner.clone()).discover(&Deadline::none()).unwrap();
        assert_eq!(disks.len(), 3);
        assert!(runner.was_called(LSBLK_DISKS));
    }

    #[test]
    fn test_midclt_preferred() {
        let runner = Arc::new(MockRunner::new().with_output(MIDCLT_DISK_QUERY, DISK_QUERY));
        let disks = DiskDiscovery::new(runner.clone()).discover(&Deadline::none()).unwrap();
        assert_eq!(disks.len(), 3);
        assert!(!runner.was_called(LSBLK_DISKS));
    }

    #[test]
    fn test_nothing_found_is_fatal() {
        let runner = Arc::new(MockRunner::new().with_output(MIDCLT_DISK_QUERY, "[]"));
        let err = DiskDiscovery::new(runner).discover(&Deadline::none()).unwrap_err();
        assert!(matches!(err, MonitorError::NoDevices(_)));
    }
}
