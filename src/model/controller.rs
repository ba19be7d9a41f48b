// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Storage controllers — LSI SAS HBAs and PCIe NVMe controllers.
//!
//! [`Controller`] is a sum type over the two families. Both share the
//! accessors on [`ControllerInfo`]; family-specific fields live on the
//! variant structs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Controller family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerKind {
    #[serde(rename = "LSI_SAS_HBA")]
    LsiSasHba,
    #[serde(rename = "PCIe_NVMe")]
    PcieNvme,
}

impl std::fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LsiSasHba => write!(f, "LSI_SAS_HBA"),
            Self::PcieNvme => write!(f, "PCIe_NVMe"),
        }
    }
}

/// Controller health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerStatus {
    Ok,
    Warning,
    Error,
    Unknown,
}

impl std::fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "Warning"),
            Self::Error => write!(f, "Error"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Which discovery strategy produced a record. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    /// Vendor CLI (`storcli`)
    Storcli,
    /// Generic PCI listing (`lspci`)
    Lspci,
}

impl std::fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storcli => write!(f, "storcli"),
            Self::Lspci => write!(f, "lspci"),
        }
    }
}

/// Accessors shared by every controller family.
pub trait ControllerInfo {
    fn id(&self) -> &str;
    fn kind(&self) -> ControllerKind;
    fn model(&self) -> &str;
    fn bus(&self) -> &str;
    /// Degrees Celsius as reported, if any reading was obtained
    fn temperature(&self) -> Option<&str>;
    fn status(&self) -> ControllerStatus;
    fn source(&self) -> DiscoverySource;

    fn display_temperature(&self) -> String {
        match self.temperature() {
            Some(t) if !t.is_empty() => format!("{}°C", t),
            _ => "N/A".to_string(),
        }
    }
}

/// LSI / Broadcom SAS host bus adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsiController {
    pub id: String,
    /// Product name, or the lspci description on the fallback path
    pub model: String,
    pub bus: String,
    pub serial: Option<String>,
    pub firmware_version: Option<String>,
    pub driver_version: Option<String>,
    /// Physical drives attached, as reported by the controller
    pub device_count: Option<u32>,
    pub ssd_count: Option<u32>,
    pub hdd_count: Option<u32>,
    /// ROC temperature
    pub temperature: Option<String>,
    pub status: ControllerStatus,
    pub description: String,
    pub source: DiscoverySource,
}

impl LsiController {
    pub fn new(id: impl Into<String>, source: DiscoverySource) -> Self {
        Self {
            id: id.into(),
            model: String::new(),
            bus: String::new(),
            serial: None,
            firmware_version: None,
            driver_version: None,
            device_count: None,
            ssd_count: None,
            hdd_count: None,
            temperature: None,
            status: ControllerStatus::Unknown,
            description: String::new(),
            source,
        }
    }
}

/// PCIe NVMe controller found on the PCI bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NvmeController {
    pub id: String,
    pub model: String,
    /// PCI address (e.g., "01:00.0")
    pub bus: String,
    /// Full lspci description
    pub description: String,
    pub temperature: Option<String>,
    pub status: ControllerStatus,
    pub source: DiscoverySource,
}

impl NvmeController {
    pub fn new(id: impl Into<String>, bus: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: String::new(),
            bus: bus.into(),
            description: String::new(),
            temperature: None,
            status: ControllerStatus::Unknown,
            source: DiscoverySource::Lspci,
        }
    }
}

macro_rules! impl_controller_info {
    ($ty:ty, $kind:expr) => {
        impl ControllerInfo for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn kind(&self) -> ControllerKind {
                $kind
            }
            fn model(&self) -> &str {
                &self.model
            }
            fn bus(&self) -> &str {
                &self.bus
            }
            fn temperature(&self) -> Option<&str> {
                self.temperature.as_deref()
            }
            fn status(&self) -> ControllerStatus {
                self.status
            }
            fn source(&self) -> DiscoverySource {
                self.source
            }
        }
    };
}

impl_controller_info!(LsiController, ControllerKind::LsiSasHba);
impl_controller_info!(NvmeController, ControllerKind::PcieNvme);

/// Any storage controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Controller {
    #[serde(rename = "LSI_SAS_HBA")]
    Lsi(LsiController),
    #[serde(rename = "PCIe_NVMe")]
    Nvme(NvmeController),
}

impl Controller {
    fn inner(&self) -> &dyn ControllerInfo {
        match self {
            Controller::Lsi(c) => c,
            Controller::Nvme(c) => c,
        }
    }
}

impl ControllerInfo for Controller {
    fn id(&self) -> &str {
        self.inner().id()
    }
    fn kind(&self) -> ControllerKind {
        self.inner().kind()
    }
    fn model(&self) -> &str {
        self.inner().model()
    }
    fn bus(&self) -> &str {
        self.inner().bus()
    }
    fn temperature(&self) -> Option<&str> {
        self.inner().temperature()
    }
    fn status(&self) -> ControllerStatus {
        self.inner().status()
    }
    fn source(&self) -> DiscoverySource {
        self.inner().source()
    }
}

impl From<LsiController> for Controller {
    fn from(c: LsiController) -> Self {
        Controller::Lsi(c)
    }
}

impl From<NvmeController> for Controller {
    fn from(c: NvmeController) -> Self {
        Controller::Nvme(c)
    }
}

/// Every controller found in one run, keyed by id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerSet {
    pub controllers: BTreeMap<String, Controller>,
}

impl ControllerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, controller: impl Into<Controller>) {
        let controller = controller.into();
        self.controllers.insert(controller.id().to_string(), controller);
    }

    pub fn get(&self, id: &str) -> Option<&Controller> {
        self.controllers.get(id)
    }

    pub fn lsi(&self) -> impl Iterator<Item = &LsiController> {
        self.controllers.values().filter_map(|c| match c {
            Controller::Lsi(l) => Some(l),
            _ => None,
        })
    }

    pub fn nvme(&self) -> impl Iterator<Item = &NvmeController> {
        self.controllers.values().filter_map(|c| match c {
            Controller::Nvme(n) => Some(n),
            _ => None,
        })
    }

    pub fn lsi_count(&self) -> usize {
        self.lsi().count()
    }

    pub fn nvme_count(&self) -> usize {
        self.nvme().count()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}
