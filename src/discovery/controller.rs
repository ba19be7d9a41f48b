// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Storage controller discovery.
//!
//! LSI SAS HBAs are read through `storcli` when it is installed and
//! otherwise picked out of `lspci`, which only yields the bus address and
//! a description. NVMe controllers always come from `lspci`, with the
//! temperature taken from the device's hwmon sensor when one exists.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::first_found;
use crate::error::{MonitorError, Result};
use crate::exec::{CommandRunner, Deadline};
use crate::model::{ControllerStatus, DiscoverySource, LsiController, NvmeController};

/// Locations probed after `which` fails, in order.
const STORCLI_PATHS: &[&str] = &[
    "storcli64",
    "storcli",
    "/opt/MegaRAID/storcli/storcli64",
    "/usr/local/sbin/storcli64",
    "/usr/sbin/storcli64",
    "/sbin/storcli64",
    "/usr/local/bin/storcli64",
    "/usr/bin/storcli64",
    "/bin/storcli64",
];

const LSPCI: &str = "lspci";
const LSI_KEYWORDS: &[&str] = &["lsi", "megaraid", "sas", "raid"];
const NVME_KEYWORDS: &[&str] = &["nvme", "non-volatile memory"];

static CONTROLLER_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Controller\s*=\s*(\d+)").unwrap());
static PRODUCT_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Product Name\s*=\s*(.+)").unwrap());
static SERIAL_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Serial Number\s*=\s*(.+)").unwrap());
static PCI_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PCI Address\s*=\s*([0-9a-fA-F:]+)").unwrap());
static FW_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"FW Version\s*=\s*(.+)").unwrap());
static DRIVER_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Driver Version\s*=\s*(.+)").unwrap());
static PHYSICAL_DRIVES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Physical Drives\s*=\s*(\d+)").unwrap());
static ROC_TEMPERATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ROC temperature\(Degree Celsius\)\s*(\d+)").unwrap());
static NVME_MODEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Non-Volatile memory controller:\s*(.+)").unwrap());

pub struct ControllerDiscovery {
    runner: Arc<dyn CommandRunner>,
}

impl ControllerDiscovery {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Path of the storcli binary, if any.
    pub fn find_storcli(&self, deadline: &Deadline) -> Option<String> {
        for name in ["storcli", "storcli64"] {
            let path = self
                .runner
                .run_within_ignore_error(&format!("which {} 2>/dev/null", name), deadline);
            let path = path.trim();
            if !path.is_empty() {
                log::debug!("Found storcli at {} (which)", path);
                return Some(path.to_string());
            }
        }

        let found = STORCLI_PATHS
            .iter()
            .find(|path| self.runner.has_command(path, deadline))
            .map(|path| path.to_string());
        match &found {
            Some(path) => log::debug!("Found storcli at {}", path),
            None => log::debug!("storcli not found"),
        }
        found
    }

    /// LSI controllers, from storcli or else lspci.
    pub fn lsi(&self, deadline: &Deadline) -> Result<Vec<LsiController>> {
        let storcli = || self.lsi_from_storcli(deadline);
        let lspci = || self.lsi_from_lspci(deadline);
        let controllers =
            first_found::<Vec<LsiController>>("LSI controller", &[("storcli", &storcli), ("lspci", &lspci)])?;
        log::info!("Found {} LSI controllers", controllers.len());
        Ok(controllers)
    }

    pub fn lsi_from_storcli(&self, deadline: &Deadline) -> Result<Vec<LsiController>> {
        let storcli = self
            .find_storcli(deadline)
            .ok_or_else(|| MonitorError::ToolNotFound("storcli".to_string()))?;

        let listing = self.runner.run_within(&format!("{} show", storcli), deadline)?;
        let mut controllers = Vec::new();
        for id in parse_controller_ids(&listing) {
            match self.storcli_controller(&storcli, &id, deadline) {
                Ok(controller) => controllers.push(controller),
                Err(e) => log::debug!("Skipping LSI controller {}: {}", id, e),
            }
        }
        Ok(controllers)
    }

    fn storcli_controller(&self, storcli: &str, id: &str, deadline: &Deadline) -> Result<LsiController> {
        let info = self
            .runner
            .run_within(&format!("{} /c{} show", storcli, id), deadline)?;
        if info.trim().is_empty() {
            return Err(MonitorError::Parse(format!("empty storcli output for /c{}", id)));
        }
        let mut controller = parse_storcli_show(id, &info);

        let temperature = self
            .runner
            .run_within_ignore_error(&format!("{} /c{} show temperature", storcli, id), deadline);
        controller.temperature = parse_roc_temperature(&temperature);
        if controller.temperature.is_none() {
            log::debug!("No ROC temperature for LSI controller {}", id);
        }
        Ok(controller)
    }

    pub fn lsi_from_lspci(&self, deadline: &Deadline) -> Result<Vec<LsiController>> {
        let output = self.runner.run_within(LSPCI, deadline)?;
        Ok(parse_lspci_lsi(&output))
    }

    /// NVMe controllers on the PCI bus. Having none is not an error,
    /// having no `lspci` is.
    pub fn nvme(&self, deadline: &Deadline) -> Result<Vec<NvmeController>> {
        if !self.runner.has_command(LSPCI, deadline) {
            return Err(MonitorError::ToolNotFound(LSPCI.to_string()));
        }

        let output = self.runner.run_within(LSPCI, deadline)?;
        let mut controllers = parse_lspci_nvme(&output);
        for controller in &mut controllers {
            controller.temperature = self.nvme_temperature(&controller.bus, deadline);
        }
        log::info!("Found {} NVMe controllers", controllers.len());
        Ok(controllers)
    }

    /// hwmon `temp1_input` of the device at `bus`, in whole degrees.
    fn nvme_temperature(&self, bus: &str, deadline: &Deadline) -> Option<String> {
        let find = format!(
            "find /sys/bus/pci/devices/0000:{}/ -path '*hwmon*/temp1_input' 2>/dev/null | head -1",
            bus
        );
        let sensor = self.runner.run_within_ignore_error(&find, deadline);
        let sensor = sensor.trim();
        if sensor.is_empty() {
            log::debug!("No temperature sensor for NVMe controller {}", bus);
            return None;
        }

        let raw = self
            .runner
            .run_within_ignore_error(&format!("cat {} 2>/dev/null", sensor), deadline);
        millidegrees_to_celsius(&raw)
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn contains_any(line: &str, keywords: &[&str]) -> bool {
    let line = line.to_lowercase();
    keywords.iter().any(|k| line.contains(k))
}

/// Controller IDs from `storcli show`. Defaults to controller 0.
pub fn parse_controller_ids(output: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for cap in CONTROLLER_ID.captures_iter(output) {
        let id = cap[1].to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    if ids.is_empty() {
        log::debug!("No controller IDs in storcli output, trying controller 0");
        ids.push("0".to_string());
    }
    ids
}

/// Build a controller record from `storcli /cN show`.
pub fn parse_storcli_show(id: &str, output: &str) -> LsiController {
    let mut controller = LsiController::new(format!("LSI_Controller_{}", id), DiscoverySource::Storcli);
    controller.status = ControllerStatus::Ok;
    controller.description = "LSI SAS HBA Controller (via storcli)".to_string();

    if let Some(model) = capture(&PRODUCT_NAME, output) {
        controller.model = model;
    }
    if let Some(serial) = capture(&SERIAL_NUMBER, output) {
        controller.description = format!("{} (SN: {})", controller.description, serial);
        controller.serial = Some(serial);
    }
    if let Some(bus) = capture(&PCI_ADDRESS, output) {
        controller.bus = bus;
    }
    controller.firmware_version = capture(&FW_VERSION, output);
    controller.driver_version = capture(&DRIVER_VERSION, output);
    controller.device_count = capture(&PHYSICAL_DRIVES, output).and_then(|n| n.parse().ok());

    let (ssd, hdd) = count_drive_media(output);
    controller.ssd_count = (ssd > 0).then_some(ssd);
    controller.hdd_count = (hdd > 0).then_some(hdd);
    controller
}

/// SSD and HDD rows of the PD LIST table.
///
/// The table runs from the heading to the first blank line after its
/// top border.
fn count_drive_media(output: &str) -> (u32, u32) {
    let Some(start) = output.find("PD LIST") else {
        return (0, 0);
    };

    let (mut ssd, mut hdd) = (0, 0);
    let mut in_table = false;
    for line in output[start..].lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            if in_table {
                break;
            }
            continue;
        }
        if line.starts_with('-') {
            in_table = true;
            continue;
        }
        if line.contains("SSD") {
            ssd += 1;
        } else if line.contains("HDD") {
            hdd += 1;
        }
    }
    (ssd, hdd)
}

pub fn parse_roc_temperature(output: &str) -> Option<String> {
    capture(&ROC_TEMPERATURE, output)
}

/// `(bus, description)` of each `lspci` line matching one of `keywords`.
fn lspci_matches<'a>(output: &'a str, keywords: &'a [&str]) -> impl Iterator<Item = (&'a str, &'a str)> {
    output.lines().filter_map(move |line| {
        let line = line.trim();
        if !contains_any(line, keywords) {
            return None;
        }
        let (bus, description) = line.split_once(' ')?;
        Some((bus.trim(), description.trim()))
    })
}

/// LSI controllers from the lspci listing.
pub fn parse_lspci_lsi(output: &str) -> Vec<LsiController> {
    lspci_matches(output, LSI_KEYWORDS)
        .map(|(bus, description)| {
            let mut controller = LsiController::new(format!("LSI_Controller_{}", bus), DiscoverySource::Lspci);
            controller.model = description.to_string();
            controller.bus = bus.to_string();
            controller.status = ControllerStatus::Ok;
            controller.description = "LSI SAS HBA Controller (via lspci)".to_string();
            log::debug!("Found LSI controller via lspci at {}", bus);
            controller
        })
        .collect()
}

/// NVMe controllers from the lspci listing, without temperatures.
pub fn parse_lspci_nvme(output: &str) -> Vec<NvmeController> {
    lspci_matches(output, NVME_KEYWORDS)
        .map(|(bus, description)| {
            let mut controller = NvmeController::new(format!("NVMe_Controller_{}", bus), bus);
            controller.model = capture(&NVME_MODEL, description).unwrap_or_else(|| description.to_string());
            controller.description = description.to_string();
            controller.status = ControllerStatus::Ok;
            controller
        })
        .collect()
}

fn millidegrees_to_celsius(raw: &str) -> Option<String> {
    raw.trim().parse::<i64>().ok().map(|m| (m / 1000).to_string())
}
