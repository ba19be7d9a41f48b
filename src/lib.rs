// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! # Disk Health Monitor
//!
//! SMART and storage-controller telemetry for storage servers, collected by
//! driving the usual command-line tools (`midclt`, `lsblk`, `zpool`,
//! `smartctl`, `storcli`, `lspci`) and normalising their output.
//!
//! Every external command goes through the [`exec::CommandRunner`] trait, so
//! the whole pipeline runs against canned output in tests via
//! [`exec::mock::MockRunner`].
//!
//! The read/written totals of each run are kept in a versioned JSON history
//! file ([`history::HistoryStore`]) so the next run can report how much was
//! read and written in between.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use diskhealthlib::{DiskCollector, HistoryStore, ShellRunner, Deadline};
//!
//! let runner = Arc::new(ShellRunner::default());
//! let collector = DiskCollector::new(runner, HistoryStore::new("/tmp/dhm.json"));
//! let result = collector.collect(&Deadline::none())?;
//! for disk in &result.data.disks {
//!     println!("{} {} {}", disk.name, disk.status(), disk.display_temperature());
//! }
//! if let Some(e) = result.error {
//!     eprintln!("incomplete: {}", e);
//! }
//! # Ok::<(), diskhealthlib::MonitorError>(())
//! ```

pub mod collector;
pub mod config;
pub mod discovery;
pub mod error;
pub mod exec;
pub mod history;
pub mod model;
pub mod smart;
pub mod units;

pub use collector::{check_required_tools, ControllerCollector, DiskCollector, Orchestrator};
pub use config::MonitorConfig;
pub use error::{Collected, MonitorError, Result};
pub use exec::{CommandRunner, Deadline, ShellRunner};
pub use history::{HistoryStore, HistorySnapshot};
pub use model::{Controller, ControllerInfo, ControllerSet, Disk, DiskKind, DiskSet, DiskStatus};
