// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Canned-output [`CommandRunner`] for tests and dry runs.
//!
//! Commands are matched by exact string. Unknown commands succeed with empty
//! output, which collectors read as "tool absent / nothing found".

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use super::CommandRunner;
use crate::error::{MonitorError, Result};

#[derive(Debug, Default)]
pub struct MockRunner {
    outputs: HashMap<String, String>,
    errors: HashMap<String, String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `output`.
    pub fn with_output(mut self, command: impl Into<String>, output: impl Into<String>) -> Self {
        self.outputs.insert(command.into(), output.into());
        self
    }

    /// Fail `command` with `message`.
    pub fn with_error(mut self, command: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors.insert(command.into(), message.into());
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every command run so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn was_called(&self, command: &str) -> bool {
        self.calls().iter().any(|c| c == command)
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, command: &str, _timeout: Duration) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(message) = self.errors.get(command) {
            return Err(MonitorError::CommandFailed {
                command: command.to_string(),
                message: message.clone(),
            });
        }
        Ok(self.outputs.get(command).cloned().unwrap_or_default())
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::Deadline;

    #[test]
    fn test_mock_outputs_and_errors() {
        let runner = MockRunner::new()
            .with_output("echo hi", "hi")
            .with_error("false", "exit status 1");

        assert_eq!(runner.run("echo hi", Duration::from_secs(1)).unwrap(), "hi");
        assert!(runner.run("false", Duration::from_secs(1)).is_err());
        assert_eq!(runner.run_ignore_error("false"), "");
        assert_eq!(runner.run_ignore_error("unknown"), "");
        assert_eq!(runner.calls().len(), 4);
        assert!(runner.was_called("echo hi"));
    }

    #[test]
    fn test_mock_has_command() {
        let runner = MockRunner::new()
            .with_output("command -v lspci >/dev/null 2>&1 && echo 'exists'", "exists");
        assert!(runner.has_command("lspci", &Deadline::none()));
        assert!(!runner.has_command("storcli", &Deadline::none()));
    }
}
