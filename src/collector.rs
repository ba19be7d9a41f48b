// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Collection pipeline
//!
//! [`DiskCollector`] runs one disk collection end to end: discovery, pool
//! assignment, SMART extraction across a bounded set of worker threads,
//! increments against the previous run, and saving the new totals.
//! [`ControllerCollector`] does the same for storage controllers, which
//! have no history.
//!
//! Both return what they found together with any partial failure, so a
//! broken pool query or one unreadable disk never hides the rest.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::DEFAULT_CONCURRENCY;
use crate::discovery::pool::{resolve_members, PoolMap};
use crate::discovery::{ControllerDiscovery, DiskDiscovery, PoolDiscovery};
use crate::error::{aggregate, Collected, MonitorError, Result};
use crate::exec::{CommandRunner, Deadline};
use crate::history::{calculate_increments, DiskTotals, HistoryStore};
use crate::model::{ControllerSet, Disk, DiskSet, UNASSIGNED_POOL};
use crate::smart::SmartCollector;

/// Tools a disk collection cannot do without.
pub const REQUIRED_TOOLS: &[&str] = &["smartctl"];

/// Fail with [`MonitorError::ToolNotFound`] for the first missing tool.
pub fn check_required_tools(runner: &dyn CommandRunner, deadline: &Deadline) -> Result<()> {
    if deadline.is_expired() {
        return Err(MonitorError::DeadlineExceeded);
    }
    for tool in REQUIRED_TOOLS {
        if !runner.has_command(tool, deadline) {
            log::error!("Required tool {} not found in PATH", tool);
            return Err(MonitorError::ToolNotFound(tool.to_string()));
        }
        log::debug!("Found required tool {}", tool);
    }
    Ok(())
}

/// Runs SMART extraction for many disks on a fixed number of threads.
pub struct Orchestrator {
    smart: SmartCollector,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn CommandRunner>, concurrency: usize) -> Self {
        Self {
            smart: SmartCollector::new(runner),
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Assign pools and collect SMART attributes for every disk.
    ///
    /// Every input disk comes back, sorted by name. A disk whose collection
    /// failed keeps its pool and whatever attributes were gathered, and its
    /// failure is folded into the returned error.
    pub fn collect(&self, disks: Vec<Disk>, pools: &PoolMap, deadline: &Deadline) -> Collected<Vec<Disk>> {
        let workers = self.concurrency.min(disks.len());
        let queue = Mutex::new(disks.into_iter());
        let done = Mutex::new(Vec::new());
        let errors = Mutex::new(Vec::new());

        log::info!("Collecting SMART data with {} workers", workers);
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let next = queue.lock().unwrap_or_else(|e| e.into_inner()).next();
                    let Some(disk) = next else { break };

                    let (disk, error) = self.collect_one(disk, pools, deadline);
                    done.lock().unwrap_or_else(|e| e.into_inner()).push(disk);
                    if let Some(e) = error {
                        errors.lock().unwrap_or_else(|e| e.into_inner()).push(e);
                    }
                });
            }
        });

        let mut disks = done.into_inner().unwrap_or_else(|e| e.into_inner());
        disks.sort_by(|a, b| a.name.cmp(&b.name));
        let errors = errors.into_inner().unwrap_or_else(|e| e.into_inner());
        Collected::partial(disks, aggregate(errors))
    }

    fn collect_one(&self, mut disk: Disk, pools: &PoolMap, deadline: &Deadline) -> (Disk, Option<MonitorError>) {
        disk.pool = pools
            .get(&disk.name)
            .cloned()
            .unwrap_or_else(|| UNASSIGNED_POOL.to_string());
        log::info!(
            "Processing disk {} (type: {}, model: {}, pool: {})",
            disk.name,
            disk.raw_type,
            disk.model,
            disk.pool
        );

        let (attributes, error) = self.smart.collect(&disk.name, disk.kind(), deadline).into_parts();
        disk.merge_attributes(attributes);
        disk.update_status();
        if let Some(e) = &error {
            log::warn!("SMART collection for {} incomplete: {}", disk.name, e);
        }
        (disk, error)
    }
}

/// Disk collection with history.
pub struct DiskCollector {
    runner: Arc<dyn CommandRunner>,
    history: HistoryStore,
    concurrency: usize,
}

impl DiskCollector {
    pub fn new(runner: Arc<dyn CommandRunner>, history: HistoryStore) -> Self {
        Self {
            runner,
            history,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Collect every disk.
    ///
    /// Fails outright only when `smartctl` is missing or no disk list could
    /// be obtained. Pool, history, SMART and save failures come back in the
    /// [`Collected`] error next to the disks.
    pub fn collect(&self, deadline: &Deadline) -> Result<Collected<DiskSet>> {
        check_required_tools(self.runner.as_ref(), deadline)?;

        let disks = DiskDiscovery::new(self.runner.clone())
            .discover(deadline)
            .map_err(|e| e.context("disk list collection"))?;

        let mut errors = Vec::new();
        let pools = match PoolDiscovery::new(self.runner.clone()).discover(deadline) {
            Ok(members) => {
                let names: Vec<&str> = disks.iter().map(|d| d.name.as_str()).collect();
                resolve_members(&members, &names)
            }
            Err(MonitorError::NoDevices(_)) => {
                log::info!("No pools found, all disks are unassigned");
                PoolMap::new()
            }
            Err(e) => {
                log::error!("Pool collection failed: {}", e);
                errors.push(e.context("pool collection"));
                PoolMap::new()
            }
        };

        log::info!("Loading previous disk data to compute increments");
        let (previous, history_error) = self.history.load().into_parts();
        if let Some(e) = history_error {
            log::error!("Loading history failed: {}", e);
            errors.push(e.context("loading history"));
        }

        let orchestrator = Orchestrator::new(self.runner.clone(), self.concurrency);
        let (mut disks, smart_error) = orchestrator.collect(disks, &pools, deadline).into_parts();
        if let Some(e) = smart_error {
            errors.push(e.context("SMART data collection"));
        }

        apply_increments(&mut disks, &previous.disks);

        let totals = totals_to_save(&disks, &previous.disks);
        if let Err(e) = self.history.save(&totals) {
            log::error!("Saving disk data failed: {}", e);
            errors.push(e.context("saving history"));
        }

        let mut set = DiskSet::new();
        set.set_previous(previous.disks, previous.timestamp);
        for disk in disks {
            set.add(disk);
        }
        set.sort();

        log::info!(
            "Collected {} disks ({} SSD, {} HDD), {} warnings, {} errors",
            set.len(),
            set.ssd_count(),
            set.hdd_count(),
            set.warning_count(),
            set.error_count()
        );
        Ok(Collected::partial(set, aggregate(errors)))
    }
}

/// Fill in increments for every disk the previous run knew about.
pub fn apply_increments(disks: &mut [Disk], previous: &BTreeMap<String, DiskTotals>) {
    for disk in disks.iter_mut() {
        let Some(before) = previous.get(&disk.name) else { continue };
        let increments = calculate_increments(before, &disk.totals());
        log::debug!(
            "{}: read +{}, written +{}",
            disk.name,
            increments.read,
            increments.written
        );
        disk.read_increment = Some(increments.read);
        disk.write_increment = Some(increments.written);
    }
}

/// Totals for the next run. A disk that produced no counters this time
/// keeps the ones it had before.
fn totals_to_save(disks: &[Disk], previous: &BTreeMap<String, DiskTotals>) -> BTreeMap<String, DiskTotals> {
    disks
        .iter()
        .map(|disk| {
            let current = disk.totals();
            let totals = match previous.get(&disk.name) {
                Some(before) if current.data_read.is_none() && current.data_written.is_none() => before.clone(),
                _ => current,
            };
            (disk.name.clone(), totals)
        })
        .collect()
}

/// LSI and NVMe controller collection.
pub struct ControllerCollector {
    discovery: ControllerDiscovery,
}

impl ControllerCollector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            discovery: ControllerDiscovery::new(runner),
        }
    }

    /// Both controller families, collected independently.
    ///
    /// The error names each family that failed.
    pub fn collect(&self, deadline: &Deadline) -> Collected<ControllerSet> {
        let mut set = ControllerSet::new();
        let mut errors = Vec::new();

        match self.discovery.lsi(deadline) {
            Ok(controllers) => controllers.into_iter().for_each(|c| set.insert(c)),
            Err(e) => {
                log::error!("Failed to collect LSI controller information: {}", e);
                errors.push(e.context("LSI controller collection failed"));
            }
        }

        match self.discovery.nvme(deadline) {
            Ok(controllers) => controllers.into_iter().for_each(|c| set.insert(c)),
            Err(e) => {
                log::error!("Failed to collect NVMe controller information: {}", e);
                errors.push(e.context("NVMe controller collection failed"));
            }
        }

        log::info!(
            "Collected {} LSI and {} NVMe controllers",
            set.lsi_count(),
            set.nvme_count()
        );
        Collected::partial(set, aggregate(errors))
    }
}
