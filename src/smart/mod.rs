// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! S.M.A.R.T. attribute extraction from `smartctl` output.
//!
//! This does not talk to drives. It runs `smartctl` through the
//! [`CommandRunner`] and pulls a fixed set of attributes out of the text,
//! using the rule tables in [`rules`]. Output that matches nothing simply
//! leaves the attribute out.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use diskhealthlib::exec::{Deadline, ShellRunner};
//! use diskhealthlib::model::DiskKind;
//! use diskhealthlib::smart::SmartCollector;
//!
//! let smart = SmartCollector::new(Arc::new(ShellRunner::default()));
//! let result = smart.collect("nvme0n1", DiskKind::NvmeSsd, &Deadline::none());
//! for (name, value) in &result.data {
//!     println!("{}: {}", name, value);
//! }
//! ```

pub mod rules;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Collected;
use crate::exec::{CommandRunner, Deadline};
use crate::model::{attr, DiskKind};

/// Smart_Status and Type given to virtual devices.
pub const VIRTUAL_DEVICE: &str = "Virtual device";
/// Type given to NVMe devices backed by a hypervisor.
pub const VIRTUAL_NVME_DEVICE: &str = "Virtual NVMe device";

/// PCI vendor id of VMware's emulated NVMe controller.
const VMWARE_PCI_VENDOR: &str = "0x15ad";

/// Extracted attributes, keyed by the names in [`attr`].
pub type Attributes = BTreeMap<String, String>;

/// Runs `smartctl` for one device and extracts its attributes.
#[derive(Clone)]
pub struct SmartCollector {
    runner: Arc<dyn CommandRunner>,
}

impl SmartCollector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Collect attributes for `/dev/<name>`.
    ///
    /// The health verdict is gathered before the detailed report, so a
    /// failed `smartctl -a` still returns whatever was found alongside the
    /// error.
    pub fn collect(&self, name: &str, kind: DiskKind, deadline: &Deadline) -> Collected<Attributes> {
        match kind {
            DiskKind::Virtual => Collected::ok(virtual_attributes(VIRTUAL_DEVICE)),
            DiskKind::NvmeSsd => self.collect_nvme(name, deadline),
            DiskKind::SasSsd | DiskKind::SasHdd => self.collect_sas(name, kind.is_ssd(), deadline),
        }
    }

    fn collect_nvme(&self, name: &str, deadline: &Deadline) -> Collected<Attributes> {
        let vendor = self
            .runner
            .run_within_ignore_error(&format!("smartctl -i /dev/{} | grep 'PCI Vendor'", name), deadline);
        if vendor.contains(VMWARE_PCI_VENDOR) {
            log::debug!("{} is a VMware virtual NVMe device, skipping SMART details", name);
            return Collected::ok(virtual_attributes(VIRTUAL_NVME_DEVICE));
        }

        let mut attributes = Attributes::new();
        let health = self.health(name, deadline);
        if !health.is_empty() {
            attributes.insert(attr::SMART_STATUS.into(), rules::health_verdict(&health).into());
        }

        let report = match self.runner.run_within(&format!("smartctl -a /dev/{}", name), deadline) {
            Ok(report) => report,
            Err(e) => {
                return Collected::partial(
                    attributes,
                    Some(e.context(format!("NVMe SMART data for {}", name))),
                )
            }
        };

        attributes.extend(rules::apply(&rules::NVME_RULES, &report));
        Collected::ok(attributes)
    }

    fn collect_sas(&self, name: &str, is_ssd: bool, deadline: &Deadline) -> Collected<Attributes> {
        let mut attributes = Attributes::new();
        let health = self.health(name, deadline);
        if !health.is_empty() {
            attributes.insert(attr::SMART_STATUS.into(), rules::health_verdict(&health).into());
        }
        if is_ssd {
            if let Some(used) = rules::SSD_ENDURANCE.extract(&health) {
                attributes.insert(attr::PERCENTAGE_USED.into(), used);
            }
        }

        let report = match self.runner.run_within(&format!("smartctl -a /dev/{}", name), deadline) {
            Ok(report) => report,
            Err(e) => {
                return Collected::partial(
                    attributes,
                    Some(e.context(format!("SAS/SATA SMART data for {}", name))),
                )
            }
        };

        attributes.extend(rules::apply(&rules::SAS_RULES, &report));
        if let Some(section) = rules::error_counter_section(&report) {
            attributes.extend(rules::apply(&rules::SAS_COUNTER_RULES, section));
        }
        Collected::ok(attributes)
    }

    fn health(&self, name: &str, deadline: &Deadline) -> String {
        self.runner
            .run_within_ignore_error(&format!("smartctl -H /dev/{}", name), deadline)
    }
}

fn virtual_attributes(kind: &str) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(attr::TYPE.into(), kind.into());
    attributes.insert(attr::SMART_STATUS.into(), VIRTUAL_DEVICE.into());
    attributes
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::exec::mock::MockRunner;

    fn collector(runner: MockRunner) -> SmartCollector {
        SmartCollector::new(Arc::new(runner))
    }

    #[test]
    fn test_nvme_attributes() {
        let smart = collector(
            MockRunner::new()
                .with_output("smartctl -H /dev/nvme0n1", NVME_HEALTH)
                .with_output("smartctl -a /dev/nvme0n1", NVME_REPORT),
        );
        let result = smart.collect("nvme0n1", DiskKind::NvmeSsd, &Deadline::none());
        assert!(result.is_complete());
        let a = result.data;
        assert_eq!(a["Smart_Status"], "PASSED");
        assert_eq!(a["Temperature"], "36");
        assert_eq!(a["Warning_Temperature"], "70");
        assert_eq!(a["Critical_Temperature"], "80");
        assert_eq!(a["Available_Spare"], "100");
        assert_eq!(a["Percentage_Used"], "2");
        assert_eq!(a["Power_On_Hours"], "23615");
        assert_eq!(a["Power_Cycles"], "1187");
        assert_eq!(a["Data_Read"], "2.14 TB");
        assert_eq!(a["Data_Written"], "5.05 TB");
        assert_eq!(a["Uncorrected_Errors"], "0");
    }

    #[test]
    fn test_vmware_nvme_short_circuits() {
        let runner = Arc::new(MockRunner::new().with_output(
            "smartctl -i /dev/nvme0n1 | grep 'PCI Vendor'",
            "PCI Vendor/Subsystem ID:            0x15ad",
        ));
        let smart = SmartCollector::new(runner.clone());
        let a = smart.collect("nvme0n1", DiskKind::NvmeSsd, &Deadline::none()).data;
        assert_eq!(a["Type"], VIRTUAL_NVME_DEVICE);
        assert_eq!(a["Smart_Status"], VIRTUAL_DEVICE);
        assert!(!runner.was_called("smartctl -a /dev/nvme0n1"));
    }

    #[test]
    fn test_virtual_disk_runs_nothing() {
        let runner = Arc::new(MockRunner::new());
        let smart = SmartCollector::new(runner.clone());
        let a = smart.collect("sda", DiskKind::Virtual, &Deadline::none()).data;
        assert_eq!(a["Type"], VIRTUAL_DEVICE);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_sas_ssd_attributes() {
        let smart = collector(
            MockRunner::new()
                .with_output("smartctl -H /dev/sdb", SAS_SSD_HEALTH)
                .with_output("smartctl -a /dev/sdb", SAS_SSD_REPORT),
        );
        let a = smart.collect("sdb", DiskKind::SasSsd, &Deadline::none()).data;
        assert_eq!(a["Smart_Status"], "OK");
        assert_eq!(a["Percentage_Used"], "3");
        assert_eq!(a["Temperature"], "31");
        assert_eq!(a["Trip_Temperature"], "70");
        assert_eq!(a["Power_On_Hours"], "20391");
        assert_eq!(a["Power_Cycles"], "119");
        assert_eq!(a["Non_Medium_Errors"], "7");
        assert_eq!(a["Data_Read"], "402.68 TB");
        assert_eq!(a["Data_Written"], "194.11 TB");
        assert_eq!(a["Uncorrected_Errors"], "0");
    }

    #[test]
    fn test_sas_hdd_attributes() {
        let smart = collector(
            MockRunner::new()
                .with_output("smartctl -H /dev/sdc", SAS_HDD_HEALTH)
                .with_output("smartctl -a /dev/sdc", SAS_HDD_REPORT),
        );
        let a = smart.collect("sdc", DiskKind::SasHdd, &Deadline::none()).data;
        assert_eq!(a["Temperature"], "38");
        assert_eq!(a["Trip_Temperature"], "60");
        assert_eq!(a["Power_On_Hours"], "41234.55");
        assert_eq!(a["Power_Cycles"], "52");
        assert_eq!(a["Data_Read"], "89.10 TB");
        assert_eq!(a["Uncorrected_Errors"], "2");
        assert!(!a.contains_key("Percentage_Used"));
    }

    #[test]
    fn test_failed_report_keeps_verdict() {
        let smart = collector(
            MockRunner::new()
                .with_output("smartctl -H /dev/sdd", "SMART Health Status: FAILED")
                .with_error("smartctl -a /dev/sdd", "exit status 4"),
        );
        let (a, err) = smart.collect("sdd", DiskKind::SasHdd, &Deadline::none()).into_parts();
        assert_eq!(a["Smart_Status"], "FAILED");
        assert!(err.unwrap().to_string().contains("sdd"));
    }

    #[test]
    fn test_unrecognised_output_degrades() {
        let smart = collector(
            MockRunner::new()
                .with_output("smartctl -H /dev/sde", "smartctl 7.3 2022-02-28")
                .with_output("smartctl -a /dev/sde", "Device does not support SMART"),
        );
        let result = smart.collect("sde", DiskKind::SasSsd, &Deadline::none());
        assert!(result.is_complete());
        assert_eq!(result.data["Smart_Status"], "unknown");
        assert_eq!(result.data["Uncorrected_Errors"], "0");
        assert!(!result.data.contains_key("Temperature"));
    }

    #[test]
    fn test_expired_deadline_stops_collection() {
        let runner = Arc::new(MockRunner::new());
        let smart = SmartCollector::new(runner.clone());
        let deadline = Deadline::at(std::time::Instant::now() - std::time::Duration::from_secs(1));
        let (_, err) = smart.collect("sda", DiskKind::SasHdd, &deadline).into_parts();
        assert!(err.unwrap().to_string().contains("deadline"));
        assert!(runner.calls().is_empty());
    }
}
