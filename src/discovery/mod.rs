// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Hardware discovery with primary/fallback strategy chains.
//!
//! Each category (disks, pools, controllers) has a preferred data source and
//! one or more fallbacks, because which tools are installed varies between
//! bare-metal and virtualised deployments. [`first_found`] runs the
//! strategies in order and keeps the first non-empty result.

pub mod controller;
pub mod disk;
pub mod pool;

use std::collections::BTreeMap;

use crate::error::{MonitorError, Result};

pub use controller::ControllerDiscovery;
pub use disk::DiskDiscovery;
pub use pool::PoolDiscovery;

/// Results that can be "nothing found".
pub trait Found {
    fn is_found(&self) -> bool;
}

impl<T> Found for Vec<T> {
    fn is_found(&self) -> bool {
        !self.is_empty()
    }
}

impl<K, V> Found for BTreeMap<K, V> {
    fn is_found(&self) -> bool {
        !self.is_empty()
    }
}

/// A named discovery strategy.
pub type Strategy<'a, T> = (&'static str, &'a dyn Fn() -> Result<T>);

/// Run `strategies` in order and return the first non-empty success.
///
/// When every strategy fails or comes back empty, the last error is
/// returned (wrapped with `category`), or [`MonitorError::NoDevices`] if
/// none of them actually errored.
pub fn first_found<T: Found>(category: &str, strategies: &[Strategy<'_, T>]) -> Result<T> {
    let mut last_error = None;

    for (source, strategy) in strategies {
        match strategy() {
            Ok(found) if found.is_found() => {
                log::info!("{} discovered via {}", category, source);
                return Ok(found);
            }
            Ok(_) => log::info!("{}: {} found nothing, trying next source", category, source),
            Err(e) => {
                log::info!("{}: {} failed ({}), trying next source", category, source, e);
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => e.context(format!("{} discovery", category)),
        None => MonitorError::NoDevices(category.to_string()),
    })
}
