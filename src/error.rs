// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Error types for Disk Health Monitor

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Main error type for Disk Health Monitor
#[derive(Error, Debug)]
pub enum MonitorError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// External command exited with an error
    #[error("Command failed [{command}]: {message}")]
    CommandFailed { command: String, message: String },

    /// External command did not finish within its timeout
    #[error("Command timed out after {timeout:?} [{command}]")]
    CommandTimeout { command: String, timeout: Duration },

    /// Caller-supplied deadline for the whole collection has passed
    #[error("Collection deadline exceeded")]
    DeadlineExceeded,

    /// A required external tool is not installed
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Every discovery strategy came back empty
    #[error("No devices found: {0}")]
    NoDevices(String),

    /// Error wrapped with the operation it happened in
    #[error("{context}: {source}")]
    Collection {
        context: String,
        #[source]
        source: Box<MonitorError>,
    },

    /// Several independent failures from one collection step
    #[error("{} errors: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<MonitorError>),

    /// History file is corrupt and no backup could be parsed
    #[error("History unrecoverable: {0}")]
    HistoryUnrecoverable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MonitorError {
    /// Wrap this error with the operation it happened in.
    pub fn context(self, context: impl Into<String>) -> Self {
        MonitorError::Collection {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Number of leaf failures represented by this error.
    pub fn failure_count(&self) -> usize {
        match self {
            MonitorError::Multiple(errors) => errors.iter().map(|e| e.failure_count()).sum(),
            MonitorError::Collection { source, .. } => source.failure_count(),
            _ => 1,
        }
    }
}

fn join_errors(errors: &[MonitorError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collapse a list of failures: none, the sole error, or a combined error.
pub fn aggregate(mut errors: Vec<MonitorError>) -> Option<MonitorError> {
    match errors.len() {
        0 => None,
        1 => errors.pop(),
        _ => Some(MonitorError::Multiple(errors)),
    }
}

/// Best-effort data paired with the error that prevented it from being complete.
///
/// An error being present never means `data` is unusable; callers should
/// always look at both.
#[derive(Debug)]
pub struct Collected<T> {
    pub data: T,
    pub error: Option<MonitorError>,
}

impl<T> Collected<T> {
    pub fn ok(data: T) -> Self {
        Self { data, error: None }
    }

    pub fn partial(data: T, error: Option<MonitorError>) -> Self {
        Self { data, error }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Split into data and error.
    pub fn into_parts(self) -> (T, Option<MonitorError>) {
        (self.data, self.error)
    }
}
