// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Data model for one collection run.

pub mod controller;
pub mod disk;

pub use controller::{
    Controller, ControllerInfo, ControllerKind, ControllerSet, ControllerStatus, DiscoverySource,
    LsiController, NvmeController,
};
pub use disk::{attr, Disk, DiskAttribute, DiskKind, DiskSet, DiskStatus, UNASSIGNED_POOL};
