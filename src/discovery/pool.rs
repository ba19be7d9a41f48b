// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Disk to pool assignment: `midclt call pool.query`, falling back to
//! parsing `zpool status`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;

use super::first_found;
use crate::error::{MonitorError, Result};
use crate::exec::{CommandRunner, Deadline};

const MIDCLT_POOL_QUERY: &str = "midclt call pool.query";
const ZPOOL_STATUS: &str = "zpool status";

/// Device name to pool name.
///
/// Straight from discovery the keys are pool members as the tool names them,
/// which may be partitions (`sdd3`). [`resolve_members`] rekeys the map by
/// disk name.
pub type PoolMap = BTreeMap<String, String>;

/// `zpool status` config lines that name vdev groups rather than disks.
const VDEV_KEYWORDS: &[&str] = &["mirror", "cache", "log", "logs", "spare", "spares", "special", "dedup"];

pub struct PoolDiscovery {
    runner: Arc<dyn CommandRunner>,
}

impl PoolDiscovery {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Map every pooled disk to its pool. Disks in no pool are absent.
    pub fn discover(&self, deadline: &Deadline) -> Result<PoolMap> {
        let midclt = || self.from_midclt(deadline);
        let zpool = || self.from_zpool(deadline);
        let pools = first_found::<PoolMap>("pool", &[("midclt", &midclt), ("zpool", &zpool)])?;

        let names: BTreeSet<&str> = pools.values().map(String::as_str).collect();
        log::info!("Found pools {:?} covering {} disks", names, pools.len());
        Ok(pools)
    }

    pub fn from_midclt(&self, deadline: &Deadline) -> Result<PoolMap> {
        let output = self.runner.run_within(MIDCLT_POOL_QUERY, deadline)?;
        parse_pool_query(&output)
    }

    pub fn from_zpool(&self, deadline: &Deadline) -> Result<PoolMap> {
        let output = self.runner.run_within(ZPOOL_STATUS, deadline)?;
        Ok(parse_zpool_status(&output))
    }
}

/// Walk the `topology` tree of every pool in `pool.query` output.
pub fn parse_pool_query(json: &str) -> Result<PoolMap> {
    let pools: Vec<Value> = serde_json::from_str(json)
        .map_err(|e| MonitorError::from(e).context("parsing pool.query output"))?;

    let mut map = PoolMap::new();
    for pool in &pools {
        let Some(name) = pool.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) else {
            continue;
        };
        let Some(topology) = pool.get("topology").and_then(Value::as_object) else {
            continue;
        };
        for (vdev_type, vdevs) in topology {
            log::debug!("pool {}: walking {} vdevs", name, vdev_type);
            for vdev in vdevs.as_array().into_iter().flatten() {
                assign_vdev(vdev, name, &mut map);
            }
        }
    }
    Ok(map)
}

/// Assign the disks under one vdev node to `pool`.
///
/// A node names its disk directly (`disk`) or by device path (`path` or
/// `device`), in which case the member is the path's basename. Group vdevs
/// (mirror, raidz) carry their members in `children`.
fn assign_vdev(node: &Value, pool: &str, map: &mut PoolMap) {
    if let Some(children) = node.get("children").and_then(Value::as_array) {
        for child in children {
            assign_vdev(child, pool, map);
        }
    }

    let field = |key: &str| node.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());

    let disk = match field("disk") {
        Some(disk) => disk.to_string(),
        None => match field("path").or_else(|| field("device")) {
            Some(path) => basename(path).to_string(),
            None => return,
        },
    };
    log::debug!("disk {} is in pool {}", disk, pool);
    map.insert(disk, pool.to_string());
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Rekey pool members by the disk they live on.
///
/// A member that is itself a known disk keeps its name. Otherwise it is taken
/// as a partition of the longest known disk it extends (`sdd3` -> `sdd`,
/// `nvme0n1p3` -> `nvme0n1`). Members matching no disk are dropped.
pub fn resolve_members<S: AsRef<str>>(members: &PoolMap, disks: &[S]) -> PoolMap {
    let known: BTreeSet<&str> = disks.iter().map(AsRef::as_ref).collect();
    let mut map = PoolMap::new();

    for (member, pool) in members {
        let disk = if known.contains(member.as_str()) {
            Some(member.as_str())
        } else {
            known
                .iter()
                .copied()
                .filter(|disk| is_partition_of(member, disk))
                .max_by_key(|disk| disk.len())
        };
        match disk {
            Some(disk) => {
                if let Some(previous) = map.insert(disk.to_string(), pool.clone()).filter(|p| p != pool) {
                    log::warn!("disk {} has members in pools {} and {}", disk, previous, pool);
                }
            }
            None => log::debug!("pool {} member {} matches no disk", pool, member),
        }
    }
    map
}

/// Partitions are `<disk><n>` when the disk name ends in a letter, and
/// `<disk>p<n>` always. `da1` + `0` is the whole disk `da10`, not a partition.
fn is_partition_of(member: &str, disk: &str) -> bool {
    let Some(suffix) = member.strip_prefix(disk).filter(|s| !s.is_empty()) else {
        return false;
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let disk_ends_in_letter = disk.bytes().last().is_some_and(|b| b.is_ascii_alphabetic());

    suffix.strip_prefix('p').is_some_and(digits) || (disk_ends_in_letter && digits(suffix))
}

/// Parse the `config:` tables of `zpool status`.
pub fn parse_zpool_status(output: &str) -> PoolMap {
    let mut map = PoolMap::new();
    let mut pool: Option<String> = None;
    let mut in_config = false;

    for line in output.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("pool:") {
            pool = Some(name.trim().to_string());
            in_config = false;
            continue;
        }
        if line.starts_with("config:") {
            in_config = true;
            continue;
        }
        if line.starts_with("errors:") {
            in_config = false;
            continue;
        }

        let Some(current) = pool.as_deref() else { continue };
        if !in_config || line.is_empty() || line.starts_with("NAME") {
            continue;
        }

        let Some(first) = line.split_whitespace().next() else { continue };
        if first == current || is_vdev_group(first) {
            continue;
        }
        let disk = basename(first);
        log::debug!("disk {} is in pool {} (zpool)", disk, current);
        map.insert(disk.to_string(), current.to_string());
    }
    map
}

fn is_vdev_group(token: &str) -> bool {
    VDEV_KEYWORDS.contains(&token)
        || token.starts_with("mirror-")
        || token.starts_with("raidz")
        || token.starts_with("draid")
}
