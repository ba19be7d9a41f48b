// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! History store for per-disk read/write totals
//!
//! The previous run's `Data_Read`/`Data_Written` values are kept in a single
//! JSON file so that the next run can report how much was read and written
//! in between. The file is the only state that survives between runs, so it
//! is handled carefully:
//!
//! - every save first copies the existing file to a timestamped backup
//!   (`<path>.<YYYYMMDDHHMMSS.micros>.bak`), keeping the newest few;
//! - new content goes to `<path>.tmp` and is renamed over the real path;
//! - an unparseable file is replaced by the newest backup that parses;
//! - files written by older releases are migrated and rewritten in place.
//!
//! # File format
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "timestamp": "2026-03-01T02:00:00+00:00",
//!   "disks": { "sda": { "Data_Read": "1.50 TB", "Data_Written": "812.33 GB" } },
//!   "meta": { "generator": "disk-health-monitor" }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Collected, MonitorError, Result};
use crate::units::{format_size, parse_size};

/// Schema version written by this release.
pub const CURRENT_VERSION: &str = "1.0";

/// Value of `meta.generator` in files we write.
pub const GENERATOR: &str = "disk-health-monitor";

/// Increment reported when a counter went backwards.
pub const RESET_LABEL: &str = "Reset";

/// Increment reported when either side is missing or unreadable.
pub const NOT_AVAILABLE: &str = "N/A";

/// Backups kept after rotation.
pub const DEFAULT_BACKUP_KEEP: usize = 5;

/// `version` value recorded in `meta.migrated_from` for un-versioned files.
const LEGACY_VERSION: &str = "legacy";

/// Read/write totals remembered for one disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskTotals {
    #[serde(rename = "Data_Read", default, skip_serializing_if = "Option::is_none")]
    pub data_read: Option<String>,
    #[serde(rename = "Data_Written", default, skip_serializing_if = "Option::is_none")]
    pub data_written: Option<String>,
    /// Fields written by other releases, carried through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DiskTotals {
    pub fn new(data_read: impl Into<String>, data_written: impl Into<String>) -> Self {
        Self {
            data_read: Some(data_read.into()),
            data_written: Some(data_written.into()),
            extra: BTreeMap::new(),
        }
    }
}

/// On-disk document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryData {
    /// Empty for files written before versioning was introduced
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub disks: BTreeMap<String, DiskTotals>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl HistoryData {
    fn current(disks: BTreeMap<String, DiskTotals>) -> Self {
        let mut meta = Map::new();
        meta.insert("generator".into(), Value::from(GENERATOR));
        Self {
            version: CURRENT_VERSION.to_string(),
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            disks,
            meta,
        }
    }

    /// Bring a document of any known version up to [`CURRENT_VERSION`].
    ///
    /// Totals and the timestamp are never touched. Existing `meta` entries
    /// are kept and `meta.migrated_from` records where the data came from.
    pub fn migrate(mut self) -> Self {
        let from = match self.version.as_str() {
            CURRENT_VERSION => return self,
            "0.1" | "0.2" => self.version.clone(),
            "" => LEGACY_VERSION.to_string(),
            other => {
                log::warn!("Unknown history version {}, relabelling as {}", other, CURRENT_VERSION);
                other.to_string()
            }
        };
        self.version = CURRENT_VERSION.to_string();
        self.meta.insert("migrated_from".into(), Value::from(from));
        self
    }

    pub fn needs_migration(&self) -> bool {
        self.version != CURRENT_VERSION
    }
}

/// What a load produced: the previous totals and when they were saved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySnapshot {
    pub disks: BTreeMap<String, DiskTotals>,
    /// `None` on a first run
    pub timestamp: Option<String>,
}

impl From<HistoryData> for HistorySnapshot {
    fn from(data: HistoryData) -> Self {
        Self {
            disks: data.disks,
            timestamp: Some(data.timestamp).filter(|t| !t.is_empty()),
        }
    }
}

/// Read and written increments for one disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Increments {
    #[serde(rename = "Data_Read_Increment")]
    pub read: String,
    #[serde(rename = "Data_Written_Increment")]
    pub written: String,
}

/// Durable store for [`HistoryData`] at a single path.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    keep: usize,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: DEFAULT_BACKUP_KEEP,
        }
    }

    /// Number of backups to keep after each save.
    pub fn with_backup_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point the store at a new file, creating its directory.
    pub fn set_storage_path(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                MonitorError::from(e).context(format!("creating directory {}", dir.display()))
            })?;
        }
        self.path = path;
        Ok(())
    }

    /// Replace the stored totals.
    ///
    /// The existing file is backed up first; a failed backup is logged and
    /// does not stop the save.
    pub fn save(&self, disks: &BTreeMap<String, DiskTotals>) -> Result<()> {
        if let Err(e) = self.create_backup() {
            log::warn!("Could not back up {}: {}", self.path.display(), e);
        }

        let data = HistoryData::current(disks.clone());
        self.write_atomic(&data)?;
        log::info!("Saved history for {} disks to {}", disks.len(), self.path.display());
        Ok(())
    }

    /// Load the previous totals.
    ///
    /// A missing file is a first run. An unparseable file is recovered from
    /// the newest readable backup; if there are backups but none parse, the
    /// error is returned alongside empty data so the run can continue.
    pub fn load(&self) -> Collected<HistorySnapshot> {
        if !self.path.exists() {
            log::info!("No history at {}, starting fresh", self.path.display());
            return Collected::ok(HistorySnapshot::default());
        }

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = MonitorError::from(e).context(format!("reading {}", self.path.display()));
                return Collected::partial(HistorySnapshot::default(), Some(err));
            }
        };

        match serde_json::from_slice::<HistoryData>(&bytes) {
            Ok(data) => Collected::ok(self.finish_load(data)),
            Err(e) => {
                log::error!("History file {} is corrupt: {}", self.path.display(), e);
                self.recover(e)
            }
        }
    }

    fn finish_load(&self, data: HistoryData) -> HistorySnapshot {
        let data = if data.needs_migration() {
            let from = data.version.clone();
            let migrated = data.migrate();
            match self.write_atomic(&migrated) {
                Ok(()) => log::info!(
                    "Migrated {} from version {:?} to {}",
                    self.path.display(),
                    from,
                    CURRENT_VERSION
                ),
                Err(e) => log::error!("Could not persist migrated history: {}", e),
            }
            migrated
        } else {
            data
        };
        log::debug!(
            "Loaded history for {} disks, timestamp {}",
            data.disks.len(),
            data.timestamp
        );
        data.into()
    }

    fn recover(&self, cause: serde_json::Error) -> Collected<HistorySnapshot> {
        let mut backups = self.backups();
        if backups.is_empty() {
            log::warn!("No backups to recover {} from, starting fresh", self.path.display());
            return Collected::ok(HistorySnapshot::default());
        }

        // Names embed the creation time, so reverse name order is newest first.
        backups.sort();
        backups.reverse();

        for backup in &backups {
            let parsed = fs::read(backup)
                .map_err(MonitorError::from)
                .and_then(|b| serde_json::from_slice::<HistoryData>(&b).map_err(MonitorError::from));
            match parsed {
                Ok(data) => {
                    log::info!("Recovered history from {}", backup.display());
                    if let Err(e) = fs::copy(backup, &self.path) {
                        log::error!("Could not restore {} over primary: {}", backup.display(), e);
                    }
                    return Collected::ok(self.finish_load(data));
                }
                Err(e) => log::debug!("Backup {} unusable: {}", backup.display(), e),
            }
        }

        let err = MonitorError::HistoryUnrecoverable(format!(
            "{} is corrupt ({}) and none of {} backups could be read",
            self.path.display(),
            cause,
            backups.len()
        ));
        Collected::partial(HistorySnapshot::default(), Some(err))
    }

    /// Copy the current file to a new timestamped backup and rotate.
    ///
    /// Returns the backup path, or `None` when there was nothing to back up.
    pub fn create_backup(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            log::debug!("Nothing to back up at {}", self.path.display());
            return Ok(None);
        }

        let stamp = Local::now().format("%Y%m%d%H%M%S%.6f");
        let backup = PathBuf::from(format!("{}.{}.bak", self.path.display(), stamp));
        fs::copy(&self.path, &backup)
            .map_err(|e| MonitorError::from(e).context(format!("writing {}", backup.display())))?;
        log::info!("Created backup {}", backup.display());

        self.rotate_backups(self.keep);
        Ok(Some(backup))
    }

    /// Delete all but the `keep` most recently modified backups.
    ///
    /// Failures to delete are logged and skipped.
    pub fn rotate_backups(&self, keep: usize) {
        let backups = self.backups();
        if backups.len() <= keep {
            return;
        }

        let mut dated: Vec<(SystemTime, PathBuf)> = backups
            .into_iter()
            .map(|p| {
                let mtime = fs::metadata(&p)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (mtime, p)
            })
            .collect();
        // Newest first; names break ties between equal mtimes.
        dated.sort_by(|a, b| b.cmp(a));

        for (_, old) in dated.into_iter().skip(keep) {
            match fs::remove_file(&old) {
                Ok(()) => log::debug!("Removed old backup {}", old.display()),
                Err(e) => log::error!("Could not remove old backup {}: {}", old.display(), e),
            }
        }
    }

    /// Backup files belonging to this store, in no particular order.
    pub fn backups(&self) -> Vec<PathBuf> {
        let Some(file_name) = self.path.file_name().and_then(|n| n.to_str()) else {
            return Vec::new();
        };
        let prefix = format!("{}.", file_name);
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("Cannot list {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.file_name().to_str().is_some_and(|name| {
                    name.len() > prefix.len() + ".bak".len()
                        && name.starts_with(&prefix)
                        && name.ends_with(".bak")
                })
            })
            .map(|entry| entry.path())
            .collect()
    }

    /// `true` when the file is absent or parses; `false` when it is corrupt.
    pub fn verify_integrity(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(true);
        }
        let bytes = fs::read(&self.path)?;
        match serde_json::from_slice::<HistoryData>(&bytes) {
            Ok(_) => Ok(true),
            Err(e) => {
                log::warn!("History file {} is corrupt: {}", self.path.display(), e);
                Ok(false)
            }
        }
    }

    fn write_atomic(&self, data: &HistoryData) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        let tmp = PathBuf::from(format!("{}.tmp", self.path.display()));

        let mut file = File::create(&tmp)
            .map_err(|e| MonitorError::from(e).context(format!("creating {}", tmp.display())))?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| {
            MonitorError::from(e).context(format!("renaming {} into place", tmp.display()))
        })
    }
}

/// Increments between a disk's previous and current totals.
pub fn calculate_increments(previous: &DiskTotals, current: &DiskTotals) -> Increments {
    Increments {
        read: increment(previous.data_read.as_deref(), current.data_read.as_deref()),
        written: increment(previous.data_written.as_deref(), current.data_written.as_deref()),
    }
}

/// Difference between two size strings, formatted like the inputs.
///
/// Missing or unparseable input gives [`NOT_AVAILABLE`]; a smaller current
/// value means the counter was reset and gives [`RESET_LABEL`].
pub fn increment(previous: Option<&str>, current: Option<&str>) -> String {
    let (Some(previous), Some(current)) = (previous, current) else {
        return NOT_AVAILABLE.to_string();
    };
    match (parse_size(previous), parse_size(current)) {
        (Ok(before), Ok(after)) if after >= before => format_size(after - before),
        (Ok(_), Ok(_)) => RESET_LABEL.to_string(),
        _ => {
            log::debug!("Cannot compute increment from {:?} to {:?}", previous, current);
            NOT_AVAILABLE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> HistoryStore {
        HistoryStore::new(dir.path().join("history.json"))
    }

    fn sample() -> BTreeMap<String, DiskTotals> {
        let mut disks = BTreeMap::new();
        disks.insert("sda".to_string(), DiskTotals::new("1.00 TB", "512.00 GB"));
        disks.insert("nvme0n1".to_string(), DiskTotals::new("3.21 TB", "2.50 TB"));
        disks
    }

    #[test]
    fn test_increment_normal() {
        assert_eq!(increment(Some("1 TB"), Some("1.5 TB")), "512.00 GB");
        assert_eq!(increment(Some("1.00 TB"), Some("1.00 TB")), "0.00 B");
    }

    #[test]
    fn test_increment_reset() {
        assert_eq!(increment(Some("1 TB"), Some("500 GB")), RESET_LABEL);
    }

    #[test]
    fn test_increment_missing_or_unparseable() {
        assert_eq!(increment(None, Some("1 TB")), "N/A");
        assert_eq!(increment(Some("1 TB"), None), "N/A");
        assert_eq!(increment(Some("N/A"), Some("1 TB")), "N/A");
        assert_eq!(increment(Some("garbage"), Some("1 TB")), "N/A");
    }

    #[test]
    fn test_calculate_increments_per_field() {
        let prev = DiskTotals::new("1 TB", "2 TB");
        let curr = DiskTotals {
            data_read: Some("1.5 TB".into()),
            ..DiskTotals::default()
        };
        let inc = calculate_increments(&prev, &curr);
        assert_eq!(inc.read, "512.00 GB");
        assert_eq!(inc.written, "N/A");
    }

    #[test]
    fn test_first_run_loads_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = store_in(&dir).load();
        assert!(loaded.is_complete());
        assert!(loaded.data.disks.is_empty());
        assert!(loaded.data.timestamp.is_none());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();

        let (snapshot, err) = store.load().into_parts();
        assert!(err.is_none());
        assert_eq!(snapshot.disks, sample());
        assert!(!snapshot.timestamp.unwrap().is_empty());
        assert!(!dir.path().join("history.json.tmp").exists());
    }

    #[test]
    fn test_save_writes_current_schema() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], "1.0");
        assert_eq!(raw["meta"]["generator"], GENERATOR);
        assert_eq!(raw["disks"]["sda"]["Data_Read"], "1.00 TB");
    }

    #[test]
    fn test_save_backs_up_previous_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();
        assert!(store.backups().is_empty());
        store.save(&BTreeMap::new()).unwrap();
        assert_eq!(store.backups().len(), 1);
    }

    #[test]
    fn test_rotation_keeps_five_newest() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{}").unwrap();

        let mut created = Vec::new();
        for _ in 0..7 {
            created.push(store.create_backup().unwrap().unwrap());
            thread::sleep(Duration::from_millis(20));
        }

        let mut remaining = store.backups();
        remaining.sort();
        assert_eq!(remaining.len(), 5);
        assert_eq!(remaining, created[2..].to_vec());
    }

    #[test]
    fn test_backup_name_format() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{}").unwrap();
        let backup = store.create_backup().unwrap().unwrap();
        let name = backup.file_name().unwrap().to_str().unwrap().to_string();
        let stamp = name
            .strip_prefix("history.json.")
            .and_then(|s| s.strip_suffix(".bak"))
            .unwrap();
        let (secs, micros) = stamp.split_once('.').unwrap();
        assert_eq!(secs.len(), 14);
        assert_eq!(micros.len(), 6);
        assert!(stamp.chars().all(|c| c.is_ascii_digit() || c == '.'));
    }

    #[test]
    fn test_no_backup_when_file_missing() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).create_backup().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_without_backups_is_silent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{ not json").unwrap();

        let loaded = store.load();
        assert!(loaded.is_complete());
        assert!(loaded.data.disks.is_empty());
    }

    #[test]
    fn test_corrupt_recovers_from_newest_good_backup() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();
        store.create_backup().unwrap();
        thread::sleep(Duration::from_millis(20));

        // Newest backup is itself corrupt and must be skipped.
        fs::write(store.path(), "garbage").unwrap();
        store.create_backup().unwrap();

        let (snapshot, err) = store.load().into_parts();
        assert!(err.is_none());
        assert_eq!(snapshot.disks, sample());
        assert_eq!(store.verify_integrity().unwrap(), true);
    }

    #[test]
    fn test_unrecoverable_returns_empty_and_error() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "garbage").unwrap();
        store.create_backup().unwrap();

        let (snapshot, err) = store.load().into_parts();
        assert!(snapshot.disks.is_empty());
        assert!(matches!(err, Some(MonitorError::HistoryUnrecoverable(_))));
    }

    #[test]
    fn test_migration_preserves_totals_and_timestamp() {
        for version in ["0.1", "0.2", "9.9"] {
            let dir = TempDir::new().unwrap();
            let store = store_in(&dir);
            let doc = serde_json::json!({
                "version": version,
                "timestamp": "2025-01-02T03:04:05Z",
                "disks": { "sda": { "Data_Read": "1.00 TB", "Data_Written": "2.00 TB" } },
                "meta": { "host": "nas01" }
            });
            fs::write(store.path(), doc.to_string()).unwrap();

            let snapshot = store.load().data;
            assert_eq!(snapshot.timestamp.as_deref(), Some("2025-01-02T03:04:05Z"));
            assert_eq!(snapshot.disks["sda"], DiskTotals::new("1.00 TB", "2.00 TB"));

            let on_disk: HistoryData =
                serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
            assert_eq!(on_disk.version, CURRENT_VERSION);
            assert_eq!(on_disk.timestamp, "2025-01-02T03:04:05Z");
            assert_eq!(on_disk.meta["migrated_from"], version);
            assert_eq!(on_disk.meta["host"], "nas01");
        }
    }

    #[test]
    fn test_legacy_unversioned_file_migrates() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"{"timestamp": "2024-06-01 12:00:00", "disks": {"sdb": {"Data_Read": "10.00 GB", "Data_Written": "4.00 GB", "Temperature": "31"}}}"#,
        )
        .unwrap();

        let snapshot = store.load().data;
        assert_eq!(snapshot.timestamp.as_deref(), Some("2024-06-01 12:00:00"));
        let sdb = &snapshot.disks["sdb"];
        assert_eq!(sdb.data_read.as_deref(), Some("10.00 GB"));
        assert_eq!(sdb.extra["Temperature"], "31");

        let on_disk: HistoryData =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk.meta["migrated_from"], LEGACY_VERSION);
    }

    #[test]
    fn test_current_version_is_not_rewritten() {
        let data = HistoryData::current(sample());
        assert!(!data.needs_migration());
        assert_eq!(data.clone().migrate(), data);
    }

    #[test]
    fn test_verify_integrity() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.verify_integrity().unwrap());
        fs::write(store.path(), "[[[").unwrap();
        assert!(!store.verify_integrity().unwrap());
    }

    #[test]
    fn test_set_storage_path_creates_directory() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let nested = dir.path().join("a/b/history.json");
        store.set_storage_path(&nested).unwrap();
        assert!(nested.parent().unwrap().is_dir());
        store.save(&sample()).unwrap();
        assert!(nested.exists());
    }
}
