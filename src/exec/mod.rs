// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Command execution port.
//!
//! Every collector reaches the operating system through [`CommandRunner`];
//! nothing else in the crate spawns processes. The production implementation
//! is [`ShellRunner`], which runs a command line through `bash -c` with a
//! timeout. Tests use [`mock::MockRunner`].
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//! use diskhealthlib::exec::{CommandRunner, ShellRunner};
//!
//! let runner = ShellRunner::new(Duration::from_secs(30));
//! let out = runner.run("lsblk -d -n -o NAME", Duration::from_secs(5)).unwrap();
//! println!("{}", out);
//! ```

pub mod mock;

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{MonitorError, Result};

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs shell command lines and returns their trimmed standard output.
pub trait CommandRunner: Send + Sync {
    /// Run `command`, failing if it exits non-zero or outlives `timeout`.
    fn run(&self, command: &str, timeout: Duration) -> Result<String>;

    /// Per-command timeout used when the caller does not pass one.
    fn default_timeout(&self) -> Duration;

    /// Same as [`run`](Self::run) with the default timeout, but any failure
    /// yields an empty string.
    fn run_ignore_error(&self, command: &str) -> String {
        self.run(command, self.default_timeout()).unwrap_or_default()
    }

    /// Run with the default timeout clipped to what is left of `deadline`.
    fn run_within(&self, command: &str, deadline: &Deadline) -> Result<String> {
        let timeout = deadline.budget(self.default_timeout())?;
        self.run(command, timeout)
    }

    /// [`run_within`](Self::run_within), swallowing the error.
    fn run_within_ignore_error(&self, command: &str, deadline: &Deadline) -> String {
        self.run_within(command, deadline).unwrap_or_default()
    }

    /// Whether `name` resolves to an executable in the shell's `PATH`.
    fn has_command(&self, name: &str, deadline: &Deadline) -> bool {
        let probe = format!("command -v {} >/dev/null 2>&1 && echo 'exists'", name);
        self.run_within_ignore_error(&probe, deadline).trim() == "exists"
    }
}

/// Optional wall-clock limit for a whole collection call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No limit beyond the per-command timeout.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(duration: Duration) -> Self {
        Self(Some(Instant::now() + duration))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Time left, or `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }

    /// Timeout for the next command: `per_command`, shortened to the time left.
    pub fn budget(&self, per_command: Duration) -> Result<Duration> {
        match self.remaining() {
            None => Ok(per_command),
            Some(left) if left.is_zero() => Err(MonitorError::DeadlineExceeded),
            Some(left) => Ok(per_command.min(left)),
        }
    }
}

/// Runs commands through `bash -c`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    default_timeout: Duration,
}

impl ShellRunner {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, timeout: Duration) -> Result<String> {
        log::debug!("exec: {}", command);

        let mut child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MonitorError::CommandFailed {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= timeout {
                // Readers are left detached: grandchildren of bash may still hold the pipes.
                let _ = child.kill();
                let _ = child.wait();
                return Err(MonitorError::CommandTimeout {
                    command: command.to_string(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let out = collect(stdout);
        if !status.success() {
            let err = collect(stderr);
            return Err(MonitorError::CommandFailed {
                command: command.to_string(),
                message: format!("{}, output: {}", status, format!("{}{}", out, err).trim()),
            });
        }

        Ok(out.trim().to_string())
    }

    fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
