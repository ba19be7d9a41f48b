// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Run configuration
//!
//! Defaults are usable as-is; a TOML file can override any subset of
//! fields, and command-line flags override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::history::DEFAULT_BACKUP_KEEP;

/// Devices collected at the same time unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 5;

const DATA_FILE_NAME: &str = "disk_health_monitor_data.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// History file holding the previous run's read/write totals
    pub data_file: PathBuf,
    /// Where the JSON report goes; stdout when unset
    pub output_file: Option<PathBuf>,
    pub command_timeout_secs: u64,
    /// Upper bound on devices collected in parallel
    pub concurrency: usize,
    /// History backups kept after each save
    pub backup_keep: usize,
    pub collect_controllers: bool,
    pub controller_only: bool,
    /// Exit non-zero when any disk reports a warning or error
    pub exit_on_warning: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            output_file: None,
            command_timeout_secs: 30,
            concurrency: DEFAULT_CONCURRENCY,
            backup_keep: DEFAULT_BACKUP_KEEP,
            collect_controllers: true,
            controller_only: false,
            exit_on_warning: false,
        }
    }
}

fn default_data_file() -> PathBuf {
    let dir = match std::env::var_os("HOME").filter(|h| !h.is_empty()) {
        Some(home) => Path::new(&home).join(".disk-health-monitor"),
        None => PathBuf::from("/var/log"),
    };
    dir.join(DATA_FILE_NAME)
}

impl MonitorConfig {
    /// Load from TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::Configuration(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MonitorError::Configuration(format!("TOML parse error: {}", e)))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Check the values and create the data directory.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(MonitorError::Configuration("concurrency must be at least 1".into()));
        }
        if self.command_timeout_secs == 0 {
            return Err(MonitorError::Configuration("command timeout must be at least 1 second".into()));
        }
        if self.data_file.as_os_str().is_empty() {
            return Err(MonitorError::Configuration("data file path is empty".into()));
        }
        if let Some(dir) = self.data_file.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                MonitorError::Configuration(format!("Cannot create data directory {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Generate sample config
    pub fn sample_toml() -> String {
        r#"# Disk Health Monitor configuration
data_file = "/var/log/disk_health_monitor_data.json"
# output_file = "/tmp/disk_health.json"
command_timeout_secs = 30
concurrency = 5
backup_keep = 5
collect_controllers = true
controller_only = false
exit_on_warning = false
"#
        .into()
    }
}
